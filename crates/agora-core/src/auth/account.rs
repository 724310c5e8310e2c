//! Signed-in account state.
//!
//! `Account` tracks the profile of the current user. It is derived state: the
//! token store stays the source of truth for whether requests are
//! authenticated, and a forced logout from the session controller clears the
//! profile here too once `watch` has been called.

use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{info, warn};

use crate::api::{ApiError, ForumClient, LogoutReason, SessionEvent, Transport};
use crate::auth::tokens::{TokenKind, TokenStore};
use crate::events::SubscriptionId;
use crate::models::{LoginRequest, PasswordChange, ProfileUpdate, Registration, User};

/// An account operation failed. `message` is suitable for showing to the user.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct AccountError {
    pub message: String,
    #[source]
    pub source: ApiError,
}

impl AccountError {
    fn new(source: ApiError, fallback: &str) -> Self {
        Self {
            message: source.detail().unwrap_or_else(|| fallback.to_string()),
            source,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Account {
    user: Arc<Mutex<Option<User>>>,
}

impl Account {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<User>> {
        self.user.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_user(&self, user: Option<User>) {
        *self.slot() = user;
    }

    pub fn user(&self) -> Option<User> {
        self.slot().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.slot().is_some()
    }

    pub fn is_staff(&self) -> bool {
        self.slot().as_ref().map(|u| u.is_staff).unwrap_or(false)
    }

    /// Clear the profile whenever the session controller ends the session
    pub fn watch<T: Transport, S: TokenStore>(&self, client: &ForumClient<T, S>) -> SubscriptionId {
        let user = Arc::clone(&self.user);
        client.session().subscribe(move |event| {
            if let SessionEvent::LoggedOut { .. } = event {
                *user.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
            }
        })
    }

    pub async fn login<T: Transport, S: TokenStore>(
        &self,
        client: &ForumClient<T, S>,
        credentials: &LoginRequest,
    ) -> Result<User, AccountError> {
        let auth = client
            .login(credentials)
            .await
            .map_err(|e| AccountError::new(e, "Login failed"))?;

        client.session().establish(&auth.tokens);
        info!(username = %auth.user.username, "Logged in");
        self.set_user(Some(auth.user.clone()));
        Ok(auth.user)
    }

    pub async fn register<T: Transport, S: TokenStore>(
        &self,
        client: &ForumClient<T, S>,
        registration: &Registration,
    ) -> Result<User, AccountError> {
        let auth = client
            .register(registration)
            .await
            .map_err(|e| AccountError::new(e, "Registration failed"))?;

        client.session().establish(&auth.tokens);
        info!(username = %auth.user.username, "Registered");
        self.set_user(Some(auth.user.clone()));
        Ok(auth.user)
    }

    /// Sign out locally, telling the server first when a refresh token is
    /// held. Server errors are logged and otherwise ignored.
    pub async fn logout<T: Transport, S: TokenStore>(&self, client: &ForumClient<T, S>) {
        if let Some(refresh_token) = client.session().store().refresh() {
            if let Err(e) = client.logout(&refresh_token).await {
                warn!(error = %e, "Server logout failed");
            }
        }
        self.set_user(None);

        // A refresh rejected during the server call has already ended the session
        let store = client.session().store();
        if store.entry(TokenKind::Access).is_some() || store.entry(TokenKind::Refresh).is_some() {
            client.session().end_session(LogoutReason::UserRequested);
        }
    }

    /// Load the profile for the stored tokens. Failure drops the tokens.
    pub async fn fetch_profile<T: Transport, S: TokenStore>(
        &self,
        client: &ForumClient<T, S>,
    ) -> Result<User, AccountError> {
        match client.profile().await {
            Ok(user) => {
                self.set_user(Some(user.clone()));
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch profile");
                self.set_user(None);
                client.session().end_session(LogoutReason::ProfileUnavailable);
                Err(AccountError::new(e, "Could not load profile"))
            }
        }
    }

    pub async fn update_profile<T: Transport, S: TokenStore>(
        &self,
        client: &ForumClient<T, S>,
        update: &ProfileUpdate,
    ) -> Result<User, AccountError> {
        let user = client
            .update_profile(update)
            .await
            .map_err(|e| AccountError::new(e, "Profile update failed"))?;
        self.set_user(Some(user.clone()));
        Ok(user)
    }

    pub async fn change_password<T: Transport, S: TokenStore>(
        &self,
        client: &ForumClient<T, S>,
        change: &PasswordChange,
    ) -> Result<(), AccountError> {
        client
            .change_password(change)
            .await
            .map_err(|e| AccountError::new(e, "Password change failed"))
    }

    /// Restore the profile on startup if tokens from a previous run exist.
    /// An expired access token is fine as long as the refresh token is live.
    pub async fn init<T: Transport, S: TokenStore>(&self, client: &ForumClient<T, S>) {
        if client.session().is_signed_in() {
            let _ = self.fetch_profile(client).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use reqwest::{Method, StatusCode};
    use serde_json::json;

    use super::*;
    use crate::api::testing::{test_user_json, MockForum, Unreachable, TEST_EMAIL, TEST_PASSWORD};
    use crate::api::SessionController;
    use crate::auth::tokens::{CredentialPair, MemoryTokenStore};

    fn anonymous<T: Transport>(transport: T) -> ForumClient<T, MemoryTokenStore> {
        ForumClient::new(SessionController::new(transport, MemoryTokenStore::new()))
    }

    fn credentials(password: &str) -> LoginRequest {
        LoginRequest {
            email: TEST_EMAIL.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn test_login_stores_pair_and_next_request_uses_it() {
        let forum = MockForum::new().route(Method::GET, "/posts/my/", json!({
            "count": 0, "next": null, "previous": null, "results": []
        }));
        let client = anonymous(forum);
        let account = Account::new();

        let user = account.login(&client, &credentials(TEST_PASSWORD)).await.unwrap();
        assert_eq!(user.username, "scout");
        assert!(account.is_authenticated());
        assert_eq!(
            client.session().store().credentials(),
            Some(CredentialPair::new("A1", "R1"))
        );

        client.my_posts(&Default::default()).await.unwrap();
        assert_eq!(
            client.session().transport().auth_headers_to("/posts/my/"),
            vec![Some("Bearer A1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_login_failure_reports_server_message() {
        let client = anonymous(MockForum::new());
        let account = Account::new();

        let err = account.login(&client, &credentials("wrong")).await.unwrap_err();
        assert_eq!(err.message, "User not found");
        assert!(matches!(err.source, ApiError::BadRequest(_)));
        assert!(!account.is_authenticated());
        assert!(client.session().store().credentials().is_none());
    }

    #[tokio::test]
    async fn test_register_signs_in() {
        let client = anonymous(MockForum::new());
        let account = Account::new();
        let registration = Registration {
            username: "scout".into(),
            email: TEST_EMAIL.into(),
            password: TEST_PASSWORD.into(),
            password_confirm: TEST_PASSWORD.into(),
            ..Default::default()
        };

        account.register(&client, &registration).await.unwrap();
        assert!(account.is_authenticated());
        assert_eq!(client.session().store().access().as_deref(), Some("A1"));
    }

    #[tokio::test]
    async fn test_logout_blacklists_refresh_token_and_clears() {
        let forum = MockForum::new().with_session("A1", "R1");
        let client = ForumClient::new(SessionController::new(
            forum,
            MemoryTokenStore::with_pair(&CredentialPair::new("A1", "R1")),
        ));
        let account = Account::new();

        account.logout(&client).await;

        let sent = &client.session().transport().requests_to("/auth/logout/")[0];
        assert_eq!(sent.json_body(), Some(&json!({"refresh_token": "R1"})));
        assert!(client.session().store().credentials().is_none());
        assert!(!account.is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_with_dead_session_notifies_once() {
        let forum = MockForum::new().with_session("A1", "R1").failing_refresh();
        forum.expire_access("A1");
        let client = ForumClient::new(SessionController::new(
            forum,
            MemoryTokenStore::with_pair(&CredentialPair::new("A1", "R1")),
        ));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        client
            .session()
            .subscribe(move |e| sink.lock().unwrap().push(e.clone()));

        Account::new().logout(&client).await;

        assert_eq!(client.session().transport().refresh_calls(), 1);
        assert!(client.session().store().credentials().is_none());
        assert_eq!(
            *events.lock().unwrap(),
            vec![SessionEvent::LoggedOut {
                reason: LogoutReason::RefreshFailed,
                redirect_to: Some(crate::api::LOGIN_ROUTE),
            }]
        );
    }

    #[tokio::test]
    async fn test_user_logout_emits_user_requested() {
        let forum = MockForum::new().with_session("A1", "R1");
        let client = ForumClient::new(SessionController::new(
            forum,
            MemoryTokenStore::with_pair(&CredentialPair::new("A1", "R1")),
        ));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        client
            .session()
            .subscribe(move |e| sink.lock().unwrap().push(e.clone()));

        Account::new().logout(&client).await;

        assert_eq!(
            *events.lock().unwrap(),
            vec![SessionEvent::LoggedOut {
                reason: LogoutReason::UserRequested,
                redirect_to: None,
            }]
        );
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_server_unreachable() {
        let client = ForumClient::new(SessionController::new(
            Unreachable,
            MemoryTokenStore::with_pair(&CredentialPair::new("A1", "R1")),
        ));
        let account = Account::new();

        account.logout(&client).await;
        assert!(client.session().store().access().is_none());
        assert!(client.session().store().refresh().is_none());
    }

    #[tokio::test]
    async fn test_init_restores_profile_through_refresh() {
        // Access token from the previous run is gone, refresh token is live
        let forum = MockForum::new()
            .with_refresh_token("R1")
            .route(Method::GET, "/auth/profile/", test_user_json());
        let store = MemoryTokenStore::new();
        store.set_refresh("R1").unwrap();
        let client = ForumClient::new(SessionController::new(forum, store));
        let account = Account::new();

        account.init(&client).await;
        assert_eq!(account.user().map(|u| u.username), Some("scout".to_string()));
        assert_eq!(client.session().store().access().as_deref(), Some("A2"));
    }

    #[tokio::test]
    async fn test_init_without_tokens_does_nothing() {
        let client = anonymous(MockForum::new());
        let account = Account::new();

        account.init(&client).await;
        assert!(!account.is_authenticated());
        assert!(client.session().transport().requests().is_empty());
    }

    #[tokio::test]
    async fn test_profile_failure_drops_tokens() {
        let forum = MockForum::new().with_session("A1", "R1").route_status(
            Method::GET,
            "/auth/profile/",
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({}),
        );
        let client = ForumClient::new(SessionController::new(
            forum,
            MemoryTokenStore::with_pair(&CredentialPair::new("A1", "R1")),
        ));
        let account = Account::new();

        let err = account.fetch_profile(&client).await.unwrap_err();
        assert_eq!(err.message, "Could not load profile");
        assert!(client.session().store().credentials().is_none());
    }

    #[tokio::test]
    async fn test_forced_logout_clears_watched_profile() {
        let forum = MockForum::new()
            .failing_refresh()
            .route(Method::GET, "/auth/profile/", test_user_json());
        let client = ForumClient::new(SessionController::new(
            forum,
            MemoryTokenStore::with_pair(&CredentialPair::new("A1", "R1")),
        ));
        let account = Account::new();
        account.watch(&client);
        account.set_user(Some(serde_json::from_value(test_user_json()).unwrap()));
        assert!(account.is_authenticated());

        assert!(client.profile().await.is_err());
        assert!(!account.is_authenticated());
        assert!(!account.is_staff());
    }
}
