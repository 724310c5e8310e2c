//! Typed client for the forum REST API.
//!
//! `ForumClient` owns the `SessionController`, so every call below is
//! authenticated and recovers from token expiry the same way. Methods are
//! thin: build the request, dispatch, decode.

use serde::Serialize;

use crate::auth::tokens::TokenStore;
use crate::models::{
    AuthResponse, Category, Comment, CommentReplies, ContentType, Feedback, KarmaSummary,
    LikeCount, LikeToggle, ListParams, LoginRequest, MediaUpload, NewComment, Page,
    PasswordChange, Post, PostComments, PostDraft, ProfileUpdate, Registration, User,
};

use super::request::{FormPart, Upload};
use super::{ApiError, ApiRequest, SessionController, Transport};

/// Default API root when neither config nor environment override it
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

/// Number of leaderboard entries and history items fetched by default
pub const DEFAULT_KARMA_LIMIT: u32 = 10;

#[derive(Serialize)]
struct LogoutRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct IdList<'a> {
    ids: &'a [i64],
}

#[derive(Serialize)]
struct LikeTarget {
    content_type: &'static str,
    object_id: i64,
}

#[derive(Serialize)]
struct ContentPatch<'a> {
    content: &'a str,
}

pub struct ForumClient<T, S> {
    session: SessionController<T, S>,
}

impl<T: Transport, S: TokenStore> ForumClient<T, S> {
    pub fn new(session: SessionController<T, S>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionController<T, S> {
        &self.session
    }

    // ===== Auth =====

    pub async fn register(&self, registration: &Registration) -> Result<AuthResponse, ApiError> {
        let request = ApiRequest::post("/auth/register/").json(registration)?;
        self.session.send_json(&request).await
    }

    pub async fn login(&self, credentials: &LoginRequest) -> Result<AuthResponse, ApiError> {
        let request = ApiRequest::post("/auth/login/").json(credentials)?;
        self.session.send_json(&request).await
    }

    /// Blacklist a refresh token on the server
    pub async fn logout(&self, refresh_token: &str) -> Result<(), ApiError> {
        let request = ApiRequest::post("/auth/logout/").json(&LogoutRequest { refresh_token })?;
        self.session.send_empty(&request).await
    }

    pub async fn profile(&self) -> Result<User, ApiError> {
        self.session.send_json(&ApiRequest::get("/auth/profile/")).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        let request = ApiRequest::patch("/auth/profile/");
        let request = if update.avatar.is_some() {
            request.multipart(update.form_parts())
        } else {
            request.json(update)?
        };
        self.session.send_json(&request).await
    }

    pub async fn change_password(&self, change: &PasswordChange) -> Result<(), ApiError> {
        let request = ApiRequest::post("/auth/change-password/").json(change)?;
        self.session.send_empty(&request).await
    }

    // ===== Posts =====

    pub async fn posts(&self, params: &ListParams) -> Result<Page<Post>, ApiError> {
        let request = ApiRequest::get("/posts/").query_pairs(params.to_pairs());
        self.session.send_json(&request).await
    }

    pub async fn post(&self, slug: &str) -> Result<Post, ApiError> {
        self.session
            .send_json(&ApiRequest::get(format!("/posts/{}/", slug)))
            .await
    }

    pub async fn create_post(&self, draft: &PostDraft) -> Result<Post, ApiError> {
        let request = ApiRequest::post("/posts/").json(draft)?;
        self.session.send_json(&request).await
    }

    pub async fn update_post(&self, slug: &str, draft: &PostDraft) -> Result<Post, ApiError> {
        let request = ApiRequest::patch(format!("/posts/{}/", slug)).json(draft)?;
        self.session.send_json(&request).await
    }

    pub async fn delete_post(&self, slug: &str) -> Result<(), ApiError> {
        self.session
            .send_empty(&ApiRequest::delete(format!("/posts/{}/", slug)))
            .await
    }

    pub async fn my_posts(&self, params: &ListParams) -> Result<Page<Post>, ApiError> {
        let request = ApiRequest::get("/posts/my/").query_pairs(params.to_pairs());
        self.session.send_json(&request).await
    }

    pub async fn posts_by_tag(&self, tag: &str, params: &ListParams) -> Result<Page<Post>, ApiError> {
        let request = ApiRequest::get("/posts/by_tag/")
            .query("tag", tag)
            .query_pairs(params.to_pairs());
        self.session.send_json(&request).await
    }

    pub async fn popular_posts(&self, params: &ListParams) -> Result<Page<Post>, ApiError> {
        let request = ApiRequest::get("/posts/popular/").query_pairs(params.to_pairs());
        self.session.send_json(&request).await
    }

    /// Most viewed recent posts. Not paginated.
    pub async fn trending_posts(&self, limit: u32, days: u32) -> Result<Vec<Post>, ApiError> {
        let request = ApiRequest::get("/posts/trending/")
            .query("limit", limit)
            .query("days", days);
        self.session.send_json(&request).await
    }

    /// Upload images to a post; the server caps a post at 10
    pub async fn add_post_images(&self, slug: &str, images: &[Upload]) -> Result<MediaUpload, ApiError> {
        self.upload_media(format!("/posts/{}/images/", slug), "image", images)
            .await
    }

    /// Upload videos to a post; the server caps a post at 5, 100 MB each
    pub async fn add_post_videos(&self, slug: &str, videos: &[Upload]) -> Result<MediaUpload, ApiError> {
        self.upload_media(format!("/posts/{}/videos/", slug), "video", videos)
            .await
    }

    async fn upload_media(
        &self,
        path: String,
        field: &str,
        files: &[Upload],
    ) -> Result<MediaUpload, ApiError> {
        let parts = files
            .iter()
            .map(|upload| FormPart::file(field, upload.clone()))
            .collect();
        self.session
            .send_json(&ApiRequest::post(path).multipart(parts))
            .await
    }

    pub async fn delete_post_images(&self, slug: &str, ids: &[i64]) -> Result<(), ApiError> {
        let request =
            ApiRequest::delete(format!("/posts/{}/images/bulk_delete/", slug)).json(&IdList { ids })?;
        self.session.send_empty(&request).await
    }

    pub async fn delete_post_videos(&self, slug: &str, ids: &[i64]) -> Result<(), ApiError> {
        let request =
            ApiRequest::delete(format!("/posts/{}/videos/bulk_delete/", slug)).json(&IdList { ids })?;
        self.session.send_empty(&request).await
    }

    // ===== Categories =====

    pub async fn categories(&self, params: &ListParams) -> Result<Page<Category>, ApiError> {
        let request = ApiRequest::get("/categories/").query_pairs(params.to_pairs());
        self.session.send_json(&request).await
    }

    pub async fn category(&self, slug: &str) -> Result<Category, ApiError> {
        self.session
            .send_json(&ApiRequest::get(format!("/categories/{}/", slug)))
            .await
    }

    // ===== Comments =====

    pub async fn comments(&self, params: &ListParams) -> Result<Page<Comment>, ApiError> {
        let request = ApiRequest::get("/comments/").query_pairs(params.to_pairs());
        self.session.send_json(&request).await
    }

    pub async fn post_comments(
        &self,
        post_id: i64,
        params: &ListParams,
    ) -> Result<Page<PostComments>, ApiError> {
        // The envelope wraps a single object rather than a list
        let request = ApiRequest::get(format!("/comments/post/{}/", post_id))
            .query_pairs(params.to_pairs());
        let page: SinglePage<PostComments> = self.session.send_json(&request).await?;
        Ok(page.into_page())
    }

    pub async fn comment_replies(
        &self,
        comment_id: i64,
        params: &ListParams,
    ) -> Result<Page<CommentReplies>, ApiError> {
        let request = ApiRequest::get(format!("/comments/post/{}/replies/", comment_id))
            .query_pairs(params.to_pairs());
        let page: SinglePage<CommentReplies> = self.session.send_json(&request).await?;
        Ok(page.into_page())
    }

    pub async fn create_comment(&self, comment: &NewComment) -> Result<Comment, ApiError> {
        let request = ApiRequest::post("/comments/").json(comment)?;
        self.session.send_json(&request).await
    }

    pub async fn update_comment(&self, id: i64, content: &str) -> Result<Comment, ApiError> {
        let request = ApiRequest::patch(format!("/comments/{}/", id)).json(&ContentPatch { content })?;
        self.session.send_json(&request).await
    }

    pub async fn delete_comment(&self, id: i64) -> Result<(), ApiError> {
        self.session
            .send_empty(&ApiRequest::delete(format!("/comments/{}/", id)))
            .await
    }

    pub async fn my_comments(&self, params: &ListParams) -> Result<Page<Comment>, ApiError> {
        let request = ApiRequest::get("/comments/my-comments/").query_pairs(params.to_pairs());
        self.session.send_json(&request).await
    }

    // ===== Feedback & likes =====

    pub async fn send_feedback(&self, feedback: &Feedback) -> Result<(), ApiError> {
        let request = ApiRequest::post("/feedback/send/").json(feedback)?;
        self.session.send_empty(&request).await
    }

    pub async fn toggle_like(&self, kind: ContentType, object_id: i64) -> Result<LikeToggle, ApiError> {
        let request = ApiRequest::post("/likes/toggle/").json(&LikeTarget {
            content_type: kind.as_str(),
            object_id,
        })?;
        self.session.send_json(&request).await
    }

    pub async fn like_count(&self, kind: ContentType, object_id: i64) -> Result<LikeCount, ApiError> {
        let request = ApiRequest::get("/likes/count/")
            .query("content_type", kind.as_str())
            .query("object_id", object_id);
        self.session.send_json(&request).await
    }

    // ===== Karma =====

    pub async fn my_karma(&self, limit: u32, page: u32) -> Result<KarmaSummary, ApiError> {
        let request = ApiRequest::get("/karma/my_karma/")
            .query("limit", limit)
            .query("page", page);
        self.session.send_json(&request).await
    }

    pub async fn user_karma(&self, username: &str, limit: u32, page: u32) -> Result<KarmaSummary, ApiError> {
        let request = ApiRequest::get(format!("/karma/user/{}/", username))
            .query("limit", limit)
            .query("page", page);
        self.session.send_json(&request).await
    }

    pub async fn leaderboard(&self, limit: u32) -> Result<Vec<KarmaSummary>, ApiError> {
        let request = ApiRequest::get("/karma/leaderboard/").query("page_size", limit);
        self.session.send_json(&request).await
    }
}

/// Pagination envelope whose `results` is one object
#[derive(serde::Deserialize)]
struct SinglePage<R> {
    count: u64,
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    previous: Option<String>,
    results: R,
}

impl<R> SinglePage<R> {
    fn into_page(self) -> Page<R> {
        Page {
            count: self.count,
            next: self.next,
            previous: self.previous,
            results: vec![self.results],
        }
    }
}
