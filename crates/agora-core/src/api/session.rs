//! Authenticated session over the forum API.
//!
//! `SessionController` attaches the stored access token to every request and
//! recovers from an expired access token without the caller noticing: on a
//! 401 it exchanges the refresh token for a new access token and replays the
//! request exactly once. If the refresh itself is rejected the session is
//! ended, subscribers are told to send the user back to the login view, and
//! the caller sees the original 401.

use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::tokens::{CredentialPair, TokenStore};
use crate::events::{Listeners, SubscriptionId};

use super::{ApiError, ApiRequest, ApiResponse, Transport};

/// Endpoint that trades a refresh token for a new access token
pub const REFRESH_PATH: &str = "/auth/token/refresh/";

/// Where the user is sent once the session cannot be recovered
pub const LOGIN_ROUTE: &str = "/login";

/// How concurrent 401s share token refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// One refresh at a time; requests that failed with the token a finished
    /// refresh replaced reuse its result instead of refreshing again.
    #[default]
    SingleFlight,
    /// Every failed request refreshes on its own. Concurrent failures each hit
    /// the refresh endpoint and the last response wins.
    PerRequest,
}

/// Whether a request is on its first send or already being replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Retried,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The refresh token was rejected while recovering from a 401
    RefreshFailed,
    /// The user signed out
    UserRequested,
    /// Stored tokens no longer resolve to a profile
    ProfileUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn,
    TokenRefreshed,
    LoggedOut {
        reason: LogoutReason,
        /// Route the front end should navigate to, if any
        redirect_to: Option<&'static str>,
    },
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// Body of a successful refresh. The backend rotates refresh tokens, so a new
/// one may come back alongside the access token.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshedTokens {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

pub struct SessionController<T, S> {
    transport: T,
    store: S,
    policy: RefreshPolicy,
    refresh_gate: Mutex<()>,
    listeners: Listeners<SessionEvent>,
}

impl<T: Transport, S: TokenStore> SessionController<T, S> {
    pub fn new(transport: T, store: S) -> Self {
        Self {
            transport,
            store,
            policy: RefreshPolicy::default(),
            refresh_gate: Mutex::new(()),
            listeners: Listeners::new(),
        }
    }

    pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_signed_in(&self) -> bool {
        self.store.access().is_some() || self.store.refresh().is_some()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Store a freshly issued credential pair (login or registration)
    pub fn establish(&self, pair: &CredentialPair) {
        if let Err(e) = self.store.set_pair(pair) {
            warn!(error = %e, "Failed to persist credentials");
        }
        info!("Session established");
        self.listeners.emit(&SessionEvent::SignedIn);
    }

    /// Drop stored credentials and tell subscribers the session is over.
    pub fn end_session(&self, reason: LogoutReason) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored credentials");
        }
        let redirect_to = match reason {
            LogoutReason::RefreshFailed => Some(LOGIN_ROUTE),
            LogoutReason::UserRequested | LogoutReason::ProfileUnavailable => None,
        };
        info!(?reason, "Session ended");
        self.listeners.emit(&SessionEvent::LoggedOut {
            reason,
            redirect_to,
        });
    }

    /// Copy of `request` carrying the current access token, if there is one.
    /// The token is read at call time, so a refresh that landed after the
    /// request was built is picked up.
    pub fn attach_auth(&self, request: &ApiRequest) -> Result<ApiRequest, ApiError> {
        match self.store.access() {
            Some(access) => request.with_bearer(&access),
            None => Ok(request.clone()),
        }
    }

    /// Send a request, transparently refreshing an expired access token once.
    pub async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        self.dispatch_attempt(request, Attempt::First).await
    }

    pub async fn dispatch_attempt(
        &self,
        request: &ApiRequest,
        attempt: Attempt,
    ) -> Result<ApiResponse, ApiError> {
        let sent = self.attach_auth(request)?;
        let response = self.transport.send(&sent).await?;

        if response.status != StatusCode::UNAUTHORIZED {
            return response.error_for_status();
        }

        let original = ApiError::from_status(response.status, &response.body);
        if attempt == Attempt::Retried {
            debug!(path = %request.path, "Unauthorized on replayed request");
            return Err(original);
        }
        if self.store.refresh().is_none() {
            debug!(path = %request.path, "Unauthorized with no refresh token");
            return Err(original);
        }

        let sent_with = sent
            .authorization()
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::to_string);
        let access = match self.recover(sent_with.as_deref()).await {
            Ok(access) => access,
            Err(_) => return Err(original),
        };

        // Use the token in hand; the store may have failed to persist it
        debug!(path = %request.path, "Replaying request with refreshed token");
        let retry = request.with_bearer(&access)?;
        let response = self.transport.send(&retry).await?;
        response.error_for_status()
    }

    /// Obtain an access token newer than `sent_with`.
    async fn recover(&self, sent_with: Option<&str>) -> Result<String, ApiError> {
        match self.policy {
            RefreshPolicy::PerRequest => self.refresh_and_store().await,
            RefreshPolicy::SingleFlight => {
                let _gate = self.refresh_gate.lock().await;
                if let Some(current) = self.store.access() {
                    if Some(current.as_str()) != sent_with {
                        debug!("Access token replaced while waiting, skipping refresh");
                        return Ok(current);
                    }
                }
                self.refresh_and_store().await
            }
        }
    }

    async fn refresh_and_store(&self) -> Result<String, ApiError> {
        // Another request may have already ended the session
        let refresh_token = self
            .store
            .refresh()
            .ok_or_else(|| ApiError::Unauthorized("No refresh token".into()))?;

        match self.refresh(&refresh_token).await {
            Ok(tokens) => {
                if let Err(e) = self.store.set_access(&tokens.access) {
                    warn!(error = %e, "Failed to persist refreshed access token");
                }
                if let Some(ref rotated) = tokens.refresh {
                    if let Err(e) = self.store.set_refresh(rotated) {
                        warn!(error = %e, "Failed to persist rotated refresh token");
                    }
                }
                info!(rotated = tokens.refresh.is_some(), "Access token refreshed");
                self.listeners.emit(&SessionEvent::TokenRefreshed);
                Ok(tokens.access)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, ending session");
                self.end_session(LogoutReason::RefreshFailed);
                Err(e)
            }
        }
    }

    /// Trade a refresh token for a new access token. Sent without an
    /// Authorization header.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, ApiError> {
        let request = ApiRequest::post(REFRESH_PATH).json(&RefreshRequest {
            refresh: refresh_token,
        })?;
        let response = self.transport.send(&request).await?.error_for_status()?;
        response.json()
    }

    /// Dispatch and decode a JSON body
    pub async fn send_json<R: DeserializeOwned>(&self, request: &ApiRequest) -> Result<R, ApiError> {
        self.dispatch(request).await?.json()
    }

    /// Dispatch, ignoring any response body
    pub async fn send_empty(&self, request: &ApiRequest) -> Result<(), ApiError> {
        self.dispatch(request).await.map(|_| ())
    }
}
