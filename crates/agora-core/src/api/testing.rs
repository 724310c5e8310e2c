//! In-process stand-in for the forum backend used by unit tests.
//!
//! Understands the auth endpoints well enough to mint, validate and rotate
//! tokens; every other path is answered from a route table and requires a
//! valid bearer token unless marked public. Each call yields once before
//! answering so concurrently dispatched requests interleave.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use reqwest::{Method, StatusCode};
use serde_json::json;

use super::{ApiError, ApiRequest, ApiResponse, Transport};

pub(crate) const TEST_EMAIL: &str = "scout@example.com";
pub(crate) const TEST_PASSWORD: &str = "correct horse";

#[derive(Default)]
struct MockState {
    valid_access: HashSet<String>,
    valid_refresh: HashSet<String>,
    minted: u32,
    last_issued: Option<String>,
    refresh_calls: usize,
    fail_refresh: bool,
    rotate_refresh: bool,
    requests: Vec<ApiRequest>,
    routes: HashMap<(Method, String), (StatusCode, String)>,
    public: HashSet<String>,
}

#[derive(Default)]
pub(crate) struct MockForum {
    state: Mutex<MockState>,
}

impl MockForum {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Accept these tokens as currently valid
    pub fn with_session(self, access: &str, refresh: &str) -> Self {
        {
            let mut state = self.state();
            state.valid_access.insert(access.to_string());
            state.valid_refresh.insert(refresh.to_string());
        }
        self
    }

    /// Accept this refresh token without any valid access token
    pub fn with_refresh_token(self, refresh: &str) -> Self {
        self.state().valid_refresh.insert(refresh.to_string());
        self
    }

    pub fn failing_refresh(self) -> Self {
        self.state().fail_refresh = true;
        self
    }

    /// Hand out a new refresh token with every refreshed access token
    pub fn rotating_refresh(self) -> Self {
        self.state().rotate_refresh = true;
        self
    }

    pub fn route(self, method: Method, path: &str, body: serde_json::Value) -> Self {
        self.route_status(method, path, StatusCode::OK, body)
    }

    pub fn route_status(
        self,
        method: Method,
        path: &str,
        status: StatusCode,
        body: serde_json::Value,
    ) -> Self {
        self.state()
            .routes
            .insert((method, path.to_string()), (status, body.to_string()));
        self
    }

    pub fn public(self, path: &str) -> Self {
        self.state().public.insert(path.to_string());
        self
    }

    pub fn expire_access(&self, access: &str) {
        self.state().valid_access.remove(access);
    }

    pub fn refresh_calls(&self) -> usize {
        self.state().refresh_calls
    }

    pub fn last_issued(&self) -> Option<String> {
        self.state().last_issued.clone()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.state().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.state()
            .requests
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    /// Authorization headers seen on requests to `path`, in order
    pub fn auth_headers_to(&self, path: &str) -> Vec<Option<String>> {
        self.requests_to(path)
            .iter()
            .map(|r| r.authorization().map(str::to_string))
            .collect()
    }

    fn answer(&self, request: &ApiRequest) -> ApiResponse {
        let mut state = self.state();
        state.requests.push(request.clone());

        let body_str = |key: &str| {
            request
                .json_body()
                .and_then(|b| b.get(key))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        match (request.method.clone(), request.path.as_str()) {
            (Method::POST, "/auth/token/refresh/") => {
                state.refresh_calls += 1;
                let presented = body_str("refresh").unwrap_or_default();
                if state.fail_refresh || !state.valid_refresh.contains(&presented) {
                    return reply(
                        StatusCode::UNAUTHORIZED,
                        json!({"detail": "Token is invalid or expired", "code": "token_not_valid"}),
                    );
                }
                state.minted += 1;
                let access = format!("A{}", state.minted + 1);
                state.valid_access.insert(access.clone());
                state.last_issued = Some(access.clone());
                if state.rotate_refresh {
                    let refresh = format!("R{}", state.minted + 1);
                    state.valid_refresh.remove(&presented);
                    state.valid_refresh.insert(refresh.clone());
                    reply(StatusCode::OK, json!({"access": access, "refresh": refresh}))
                } else {
                    reply(StatusCode::OK, json!({"access": access}))
                }
            }
            (Method::POST, "/auth/login/") | (Method::POST, "/auth/register/") => {
                let email = body_str("email");
                let password = body_str("password");
                if email.as_deref() != Some(TEST_EMAIL) || password.as_deref() != Some(TEST_PASSWORD)
                {
                    return reply(
                        StatusCode::BAD_REQUEST,
                        json!({"non_field_errors": ["User not found"]}),
                    );
                }
                state.valid_access.insert("A1".into());
                state.valid_refresh.insert("R1".into());
                let status = if request.path == "/auth/register/" {
                    StatusCode::CREATED
                } else {
                    StatusCode::OK
                };
                reply(
                    status,
                    json!({"user": test_user_json(), "access": "A1", "refresh": "R1"}),
                )
            }
            (Method::POST, "/auth/logout/") => {
                let authorized = request
                    .authorization()
                    .and_then(|h| h.strip_prefix("Bearer "))
                    .is_some_and(|token| state.valid_access.contains(token));
                if !authorized {
                    return reply(
                        StatusCode::UNAUTHORIZED,
                        json!({"detail": "Given token not valid for any token type"}),
                    );
                }
                if let Some(token) = body_str("refresh_token") {
                    state.valid_refresh.remove(&token);
                }
                reply(StatusCode::RESET_CONTENT, json!({"detail": "Logged out"}))
            }
            (method, path) => {
                let bearer = request
                    .authorization()
                    .and_then(|h| h.strip_prefix("Bearer "))
                    .map(str::to_string);
                let authorized = match bearer {
                    Some(ref token) => state.valid_access.contains(token),
                    None => state.public.contains(path),
                };
                if !authorized {
                    return reply(
                        StatusCode::UNAUTHORIZED,
                        json!({"detail": "Given token not valid for any token type"}),
                    );
                }
                match state.routes.get(&(method, path.to_string())) {
                    Some((status, body)) => ApiResponse::new(*status, body.clone()),
                    None => reply(StatusCode::NOT_FOUND, json!({"detail": "Not found."})),
                }
            }
        }
    }
}

impl Transport for MockForum {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        tokio::task::yield_now().await;
        Ok(self.answer(request))
    }
}

fn reply(status: StatusCode, body: serde_json::Value) -> ApiResponse {
    ApiResponse::new(status, body.to_string())
}

pub(crate) fn test_user_json() -> serde_json::Value {
    json!({
        "id": 7,
        "username": "scout",
        "email": TEST_EMAIL,
        "first_name": "Sam",
        "last_name": "Scout",
        "full_name": "Sam Scout",
        "avatar": null,
        "bio": "",
        "is_staff": false,
        "created_at": "2025-01-05T10:00:00Z",
        "updated_at": "2025-01-05T10:00:00Z",
        "posts_count": 3,
        "comments_count": 12,
        "karma_points": 240,
        "karma_level": 3
    })
}

/// Transport whose every call fails at the network layer
pub(crate) struct Unreachable;

impl Transport for Unreachable {
    async fn send(&self, _request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        Err(ApiError::Network("connection refused".into()))
    }
}
