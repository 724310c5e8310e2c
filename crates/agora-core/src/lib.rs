//! Core library for agora, a client for a forum REST API.
//!
//! The interesting part is the authenticated session: `api::SessionController`
//! attaches the stored access token to every request and, when the server
//! answers 401, trades the refresh token for a new access token and replays
//! the request once. Everything else is typed glue over the forum's
//! resources plus a little client-side state.

pub mod api;
pub mod auth;
pub mod comments;
pub mod config;
pub mod events;
pub mod karma;
pub mod models;
pub mod utils;

pub use api::{ApiError, ForumClient, RefreshPolicy, SessionController, SessionEvent};
pub use auth::{Account, CredentialPair, TokenStore};
pub use config::Config;
