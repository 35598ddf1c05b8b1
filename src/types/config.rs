//! Configuration Types
//!
//! Client, token manager and grant configuration.

use secrecy::SecretString;
use std::time::Duration;

use crate::resilience::RetryConfig;

/// Default configuration values.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_REFRESH_BUFFER_SECS: u64 = 300;
pub const DEFAULT_CACHE_TTL_MS: u64 = 300_000;
pub const DEFAULT_CACHE_CAPACITY: usize = 256;
pub const DEFAULT_USER_AGENT: &str = concat!("racing-data-integration/", env!("CARGO_PKG_VERSION"));

/// Full client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL of the data API, without trailing slash.
    pub base_url: String,
    /// Token endpoint URL.
    pub token_url: String,
    /// OAuth2 client identifier.
    pub client_id: String,
    /// Optional client secret, sent in the grant body.
    pub client_secret: Option<SecretString>,
    /// HTTP timeout for every request.
    pub timeout: Duration,
    /// User agent sent with data requests.
    pub user_agent: String,
    /// Retry policy for data requests.
    pub retry: RetryConfig,
    /// Default TTL for cached responses.
    pub cache_ttl: Duration,
    /// Maximum number of cached endpoints.
    pub cache_capacity: usize,
    /// Refresh tokens this long before they expire.
    pub refresh_buffer: Duration,
}

impl ClientConfig {
    /// The token manager's view of this configuration.
    pub fn token_manager_config(&self) -> TokenManagerConfig {
        TokenManagerConfig {
            token_url: self.token_url.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            refresh_buffer: self.refresh_buffer,
            timeout: self.timeout,
        }
    }

    /// Full URL for an endpoint.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, normalize_endpoint(endpoint))
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("cache_ttl", &self.cache_ttl)
            .field("cache_capacity", &self.cache_capacity)
            .field("refresh_buffer", &self.refresh_buffer)
            .finish()
    }
}

/// Token manager configuration.
#[derive(Clone)]
pub struct TokenManagerConfig {
    /// Token endpoint URL.
    pub token_url: String,
    /// OAuth2 client identifier.
    pub client_id: String,
    /// Optional client secret.
    pub client_secret: Option<SecretString>,
    /// Buffer time before expiration to trigger refresh (default: 5 minutes).
    pub refresh_buffer: Duration,
    /// HTTP timeout for token requests.
    pub timeout: Duration,
}

impl TokenManagerConfig {
    /// Create a config with default buffer and timeout.
    pub fn new(token_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: None,
            refresh_buffer: Duration::from_secs(DEFAULT_REFRESH_BUFFER_SECS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl std::fmt::Debug for TokenManagerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManagerConfig")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("refresh_buffer", &self.refresh_buffer)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Grant type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantType {
    Password,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::RefreshToken => "refresh_token",
        }
    }
}

/// Cache key and URL suffix for an endpoint: trimmed, without leading slashes.
pub fn normalize_endpoint(endpoint: &str) -> &str {
    endpoint.trim().trim_start_matches('/')
}
