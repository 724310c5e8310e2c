//! REST API client module for the forum backend.
//!
//! This module provides the `SessionController`, which authenticates every
//! request with a JWT bearer token and transparently refreshes it, and the
//! `ForumClient` with typed methods for each resource.

pub mod client;
pub mod error;
pub mod request;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ForumClient, DEFAULT_API_URL};
pub use error::ApiError;
pub use request::{ApiRequest, ApiResponse, FormPart, PartValue, RequestBody, Upload};
pub use session::{
    Attempt, LogoutReason, RefreshPolicy, SessionController, SessionEvent, LOGIN_ROUTE,
    REFRESH_PATH,
};
pub use transport::{HttpTransport, Transport, REQUEST_TIMEOUT_SECS};
