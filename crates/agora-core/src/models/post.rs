//! Posts, categories and their media.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author block embedded in posts and comments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorInfo {
    pub id: i64,
    pub username: String,
    #[serde(default, alias = "fullname")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub posts_count: u32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: i64,
    #[serde(alias = "image", alias = "video")]
    pub url: String,
    #[serde(default)]
    pub order: i32,
}

/// Reply to an image or video upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaUpload {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    #[default]
    Published,
}

/// A post as returned by list and detail endpoints.
///
/// List responses carry `excerpt` and the flat `author_username` /
/// `category_name`; detail responses carry `content` and the nested info
/// blocks. Fields absent from one shape default to empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub category: Option<i64>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub category_info: Option<CategoryInfo>,
    #[serde(default)]
    pub author: Option<i64>,
    #[serde(default)]
    pub author_username: Option<String>,
    #[serde(default)]
    pub author_info: Option<AuthorInfo>,
    #[serde(default)]
    pub status: PostStatus,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub views_count: u32,
    #[serde(default)]
    pub comments_count: u32,
    #[serde(default)]
    pub likes_count: u32,
    #[serde(default)]
    pub is_liked: bool,
    #[serde(default)]
    pub images: Vec<MediaItem>,
    #[serde(default)]
    pub videos: Vec<MediaItem>,
}

impl Post {
    pub fn author_name(&self) -> &str {
        self.author_username
            .as_deref()
            .or(self.author_info.as_ref().map(|a| a.username.as_str()))
            .unwrap_or("unknown")
    }

    pub fn category_label(&self) -> Option<&str> {
        self.category_name
            .as_deref()
            .or(self.category_info.as_ref().map(|c| c.name.as_str()))
    }
}

/// Body for creating or updating a post
#[derive(Debug, Clone, Default, Serialize)]
pub struct PostDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PostStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}
