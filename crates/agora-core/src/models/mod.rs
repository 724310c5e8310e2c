//! Data models for forum entities.
//!
//! - `User` and the auth request bodies
//! - `Post`, `Category`: content and its classification
//! - `Comment`, likes and feedback
//! - `KarmaSummary`, `KarmaEvent`: reputation
//! - `Page<T>`: the backend's paginated list envelope

pub mod comment;
pub mod karma;
pub mod post;
pub mod user;

use serde::{Deserialize, Serialize};

pub use comment::{
    Comment, CommentReplies, ContentType, Feedback, LikeCount, LikeToggle, NewComment, PostComments,
    PostRef,
};
pub use karma::{KarmaEvent, KarmaSummary};
pub use post::{
    AuthorInfo, Category, CategoryInfo, MediaItem, MediaUpload, Post, PostDraft, PostStatus,
};
pub use user::{AuthResponse, LoginRequest, PasswordChange, ProfileUpdate, Registration, User};

/// Paginated list envelope used by every list endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }
}

/// Query parameters for list endpoints
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub category: Option<String>,
}

impl ListParams {
    pub fn page(page: u32) -> Self {
        Self {
            page: Some(page),
            ..Default::default()
        }
    }

    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(size) = self.page_size {
            pairs.push(("page_size", size.to_string()));
        }
        if let Some(ref search) = self.search {
            pairs.push(("search", search.clone()));
        }
        if let Some(ref ordering) = self.ordering {
            pairs.push(("ordering", ordering.clone()));
        }
        if let Some(ref category) = self.category {
            pairs.push(("category", category.clone()));
        }
        pairs
    }
}
