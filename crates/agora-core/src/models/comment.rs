use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AuthorInfo;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub content: String,
    #[serde(default)]
    pub author: Option<i64>,
    #[serde(default)]
    pub author_info: Option<AuthorInfo>,
    #[serde(default)]
    pub parent: Option<i64>,
    #[serde(default)]
    pub replies_count: u32,
    #[serde(default)]
    pub is_reply: bool,
    #[serde(default)]
    pub likes_count: u32,
    #[serde(default)]
    pub is_liked: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub replies: Vec<Comment>,
}

/// Minimal reference to the post a comment thread belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRef {
    pub id: i64,
    pub title: String,
    pub slug: String,
}

/// Top-level comments of a post, with replies nested one level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostComments {
    pub post: PostRef,
    pub comments: Vec<Comment>,
    pub total_comments: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentReplies {
    pub parent_comment: Comment,
    pub replies: Vec<Comment>,
    pub total_replies: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewComment {
    pub post: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<i64>,
    pub content: String,
}

/// Contact form submission
#[derive(Debug, Clone, Serialize)]
pub struct Feedback {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

/// Kind of object a like applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Post,
    Comment,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Post => "post",
            ContentType::Comment => "comment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LikeToggle {
    pub liked: bool,
    pub likes_count: u32,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LikeCount {
    pub likes_count: u32,
    #[serde(default)]
    pub is_liked: bool,
}
