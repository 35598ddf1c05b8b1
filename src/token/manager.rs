//! Token Manager
//!
//! Owns the password/refresh-token lifecycle and hands out a currently valid
//! bearer token on demand.

use async_trait::async_trait;
use chrono::Utc;
use secrecy::ExposeSecret;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, RwLock};

use crate::core::transport::lock;
use crate::core::{HttpMethod, HttpRequest, HttpTransport, ReqwestHttpTransport};
use crate::error::{map_token_error, AuthError};
use crate::types::{GrantType, TokenManagerConfig, TokenResponse, TokenState};

/// Token manager interface.
#[async_trait]
pub trait TokenManager: Send + Sync {
    /// Exchange email and password for a new token state (password grant).
    async fn authenticate(&self, email: &str, password: &str) -> Result<TokenState, AuthError>;

    /// Exchange the stored refresh token for a new token state.
    ///
    /// A rejected refresh clears the state; the caller has to authenticate again.
    async fn refresh(&self) -> Result<TokenState, AuthError>;

    /// Current access token, refreshed first if it is within the refresh buffer.
    async fn get_valid_token(&self) -> Result<String, AuthError>;

    /// Refresh after the server rejected `rejected_token`, unless another caller
    /// already replaced it. Returns the access token to use next.
    async fn refresh_rejected(&self, rejected_token: &str) -> Result<String, AuthError>;

    /// True iff a token state is present, regardless of expiry.
    async fn is_authenticated(&self) -> bool;

    /// Snapshot of the live token state, for external persistence.
    async fn current_state(&self) -> Option<TokenState>;

    /// Install a previously saved token state.
    async fn restore(&self, state: TokenState);

    /// Drop the token state.
    async fn sign_out(&self);
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    grant_type: &'static str,
    username: &'a str,
    password: &'a str,
    client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<&'a str>,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
    client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<&'a str>,
}

/// Default token manager implementation.
///
/// Refreshes are single-flight: every path that refreshes holds `refresh_lock`
/// and re-checks the state after acquiring it, so concurrent callers that see
/// the same expiring token trigger one refresh between them.
pub struct DefaultTokenManager<T: HttpTransport = ReqwestHttpTransport> {
    config: TokenManagerConfig,
    transport: Arc<T>,
    state: RwLock<Option<TokenState>>,
    refresh_lock: AsyncMutex<()>,
}

impl<T: HttpTransport> DefaultTokenManager<T> {
    /// Create new token manager.
    pub fn new(config: TokenManagerConfig, transport: Arc<T>) -> Self {
        Self {
            config,
            transport,
            state: RwLock::new(None),
            refresh_lock: AsyncMutex::new(()),
        }
    }

    /// Get the token manager configuration.
    pub fn config(&self) -> &TokenManagerConfig {
        &self.config
    }

    fn client_secret(&self) -> Option<&str> {
        self.config
            .client_secret
            .as_ref()
            .map(|s| s.expose_secret().as_str())
    }

    fn build_request(&self, body: String) -> HttpRequest {
        let mut headers = HashMap::new();
        headers.insert(
            "content-type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        headers.insert("accept".to_string(), "application/json".to_string());

        HttpRequest {
            method: HttpMethod::Post,
            url: self.config.token_url.clone(),
            headers,
            body: Some(body),
            timeout: Some(self.config.timeout),
        }
    }

    /// POST a form body to the token endpoint and parse the token response.
    async fn request_token(&self, body: String) -> Result<TokenResponse, AuthError> {
        let response = self.transport.send(self.build_request(body)).await?;

        if !response.is_success() {
            return Err(map_token_error(response.status, &response.body));
        }

        serde_json::from_str(&response.body).map_err(|e| AuthError::MalformedResponse {
            message: e.to_string(),
        })
    }

    fn encode<S: Serialize>(form: &S) -> Result<String, AuthError> {
        serde_urlencoded::to_string(form).map_err(|e| AuthError::MalformedResponse {
            message: format!("failed to encode grant: {}", e),
        })
    }

    /// Refresh while holding `refresh_lock`.
    async fn refresh_locked(&self) -> Result<TokenState, AuthError> {
        let previous = self
            .state
            .read()
            .await
            .as_ref()
            .and_then(TokenState::refresh_secret)
            .ok_or(AuthError::NoRefreshToken)?;

        let body = Self::encode(&RefreshGrant {
            grant_type: GrantType::RefreshToken.as_str(),
            refresh_token: previous.expose_secret(),
            client_id: &self.config.client_id,
            client_secret: self.client_secret(),
        })?;

        let issued_at = Utc::now();
        let result = match self.request_token(body).await {
            Ok(response) => Ok(TokenState::from_response(response, issued_at, Some(previous))),
            // The server never saw the refresh token; keep the state for a later attempt.
            Err(AuthError::Network(e)) => {
                tracing::warn!(error = %e, "Token refresh failed to reach the token endpoint");
                return Err(AuthError::Network(e));
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(state) => {
                *self.state.write().await = Some(state.clone());
                tracing::info!(
                    client_id = %self.config.client_id,
                    expires_at = %state.expires_at,
                    "Access token refreshed"
                );
                Ok(state)
            }
            Err(e) => {
                *self.state.write().await = None;
                tracing::warn!(error = %e, "Token refresh rejected, token state cleared");
                Err(AuthError::RefreshFailed {
                    message: e.to_string(),
                })
            }
        }
    }

    async fn current_token_if_fresh(&self) -> Result<Option<String>, AuthError> {
        let state = self.state.read().await;
        let state = state.as_ref().ok_or(AuthError::NotAuthenticated)?;
        if state.needs_refresh(self.config.refresh_buffer) {
            Ok(None)
        } else {
            Ok(Some(state.access_token().to_string()))
        }
    }
}

#[async_trait]
impl<T: HttpTransport> TokenManager for DefaultTokenManager<T> {
    async fn authenticate(&self, email: &str, password: &str) -> Result<TokenState, AuthError> {
        let body = Self::encode(&PasswordGrant {
            grant_type: GrantType::Password.as_str(),
            username: email,
            password,
            client_id: &self.config.client_id,
            client_secret: self.client_secret(),
        })?;

        // Serialize with refreshes so an in-flight refresh cannot overwrite the new state.
        let _guard = self.refresh_lock.lock().await;

        let issued_at = Utc::now();
        let response = self.request_token(body).await.map_err(|e| {
            tracing::warn!(client_id = %self.config.client_id, error = %e, "Authentication failed");
            e
        })?;

        let state = TokenState::from_response(response, issued_at, None);
        *self.state.write().await = Some(state.clone());

        tracing::info!(
            client_id = %self.config.client_id,
            expires_at = %state.expires_at,
            "Authenticated"
        );
        Ok(state)
    }

    async fn refresh(&self) -> Result<TokenState, AuthError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    async fn get_valid_token(&self) -> Result<String, AuthError> {
        if let Some(token) = self.current_token_if_fresh().await? {
            tracing::debug!("Reusing cached access token");
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = self.current_token_if_fresh().await? {
            return Ok(token);
        }

        tracing::debug!("Access token within refresh buffer, refreshing");
        let state = self.refresh_locked().await?;
        Ok(state.access_token().to_string())
    }

    async fn refresh_rejected(&self, rejected_token: &str) -> Result<String, AuthError> {
        let _guard = self.refresh_lock.lock().await;

        {
            let state = self.state.read().await;
            let state = state.as_ref().ok_or(AuthError::NotAuthenticated)?;
            if state.access_token() != rejected_token {
                return Ok(state.access_token().to_string());
            }
        }

        let state = self.refresh_locked().await?;
        Ok(state.access_token().to_string())
    }

    async fn is_authenticated(&self) -> bool {
        self.state.read().await.is_some()
    }

    async fn current_state(&self) -> Option<TokenState> {
        self.state.read().await.clone()
    }

    async fn restore(&self, state: TokenState) {
        let _guard = self.refresh_lock.lock().await;
        *self.state.write().await = Some(state);
    }

    async fn sign_out(&self) {
        let _guard = self.refresh_lock.lock().await;
        *self.state.write().await = None;
        tracing::info!(client_id = %self.config.client_id, "Signed out");
    }
}

/// Mock token manager for testing.
///
/// Hands out `token-<n>` where `n` counts refreshes, so tests can observe
/// which token a request carried.
#[derive(Default)]
pub struct MockTokenManager {
    generation: AtomicU32,
    authenticated: Mutex<bool>,
    get_token_calls: AtomicU32,
    refresh_calls: AtomicU32,
    next_error: Mutex<Option<AuthError>>,
}

impl MockTokenManager {
    /// Create a mock that is already authenticated.
    pub fn new() -> Self {
        let manager = Self::default();
        *lock(&manager.authenticated) = true;
        manager
    }

    /// Create a mock with no token state.
    pub fn unauthenticated() -> Self {
        Self::default()
    }

    /// Fail the next token or refresh call with `error`.
    pub fn set_next_error(&self, error: AuthError) -> &Self {
        *lock(&self.next_error) = Some(error);
        self
    }

    /// Number of `get_valid_token` calls.
    pub fn get_token_count(&self) -> u32 {
        self.get_token_calls.load(Ordering::SeqCst)
    }

    /// Number of refreshes performed.
    pub fn refresh_count(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Token currently handed out.
    pub fn current_token(&self) -> String {
        format!("token-{}", self.generation.load(Ordering::SeqCst))
    }

    fn check(&self) -> Result<(), AuthError> {
        if let Some(error) = lock(&self.next_error).take() {
            return Err(error);
        }
        if !*lock(&self.authenticated) {
            return Err(AuthError::NotAuthenticated);
        }
        Ok(())
    }

    fn state(&self) -> TokenState {
        TokenState::new(
            self.current_token(),
            Some("mock-refresh".to_string()),
            Utc::now() + chrono::Duration::hours(1),
        )
    }

    fn bump(&self) -> TokenState {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state()
    }
}

#[async_trait]
impl TokenManager for MockTokenManager {
    async fn authenticate(&self, _email: &str, _password: &str) -> Result<TokenState, AuthError> {
        if let Some(error) = lock(&self.next_error).take() {
            return Err(error);
        }
        *lock(&self.authenticated) = true;
        Ok(self.state())
    }

    async fn refresh(&self) -> Result<TokenState, AuthError> {
        self.check()?;
        Ok(self.bump())
    }

    async fn get_valid_token(&self) -> Result<String, AuthError> {
        self.get_token_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.current_token())
    }

    async fn refresh_rejected(&self, rejected_token: &str) -> Result<String, AuthError> {
        self.check()?;
        if rejected_token != self.current_token() {
            return Ok(self.current_token());
        }
        Ok(self.bump().access_token().to_string())
    }

    async fn is_authenticated(&self) -> bool {
        *lock(&self.authenticated)
    }

    async fn current_state(&self) -> Option<TokenState> {
        if *lock(&self.authenticated) {
            Some(self.state())
        } else {
            None
        }
    }

    async fn restore(&self, _state: TokenState) {
        *lock(&self.authenticated) = true;
    }

    async fn sign_out(&self) {
        *lock(&self.authenticated) = false;
    }
}

/// Create mock token manager for testing.
pub fn create_mock_token_manager() -> MockTokenManager {
    MockTokenManager::new()
}
