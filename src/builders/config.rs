//! Configuration Builder
//!
//! Fluent builder for client configuration.

use secrecy::SecretString;
use std::time::Duration;
use url::Url;

use crate::error::{ClientError, ConfigurationError};
use crate::resilience::RetryConfig;
use crate::types::{
    ClientConfig, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL_MS, DEFAULT_REFRESH_BUFFER_SECS,
    DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT,
};

/// Client configuration builder.
#[derive(Default)]
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    token_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<SecretString>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    retry: Option<RetryConfig>,
    max_attempts: Option<u32>,
    cache_ttl: Option<Duration>,
    cache_capacity: Option<usize>,
    refresh_buffer: Option<Duration>,
}

impl ClientConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the data API base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the token endpoint URL.
    pub fn token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = Some(token_url.into());
        self
    }

    /// Set client ID.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set client secret.
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(SecretString::new(client_secret.into()));
        self
    }

    /// Set request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Replace the whole retry policy.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Set the transient-failure attempt budget.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Set the default cache TTL.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Set the maximum number of cached endpoints.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    /// Set how long before expiry a token is refreshed.
    pub fn refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = Some(buffer);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<ClientConfig, ClientError> {
        let base_url = validate_url("base_url", self.base_url)?;
        let token_url = validate_url("token_url", self.token_url)?;

        let client_id = self
            .client_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| missing("client_id"))?;

        let mut retry = self.retry.unwrap_or_default();
        if let Some(max_attempts) = self.max_attempts {
            retry.max_attempts = max_attempts;
        }
        if retry.max_attempts == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "max_attempts".to_string(),
                message: "must be at least 1".to_string(),
            }
            .into());
        }

        let cache_capacity = self.cache_capacity.unwrap_or(DEFAULT_CACHE_CAPACITY);
        if cache_capacity == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "cache_capacity".to_string(),
                message: "must be at least 1".to_string(),
            }
            .into());
        }

        Ok(ClientConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            token_url,
            client_id,
            client_secret: self.client_secret,
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            user_agent: self
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            retry,
            cache_ttl: self
                .cache_ttl
                .unwrap_or(Duration::from_millis(DEFAULT_CACHE_TTL_MS)),
            cache_capacity,
            refresh_buffer: self
                .refresh_buffer
                .unwrap_or(Duration::from_secs(DEFAULT_REFRESH_BUFFER_SECS)),
        })
    }
}

fn missing(field: &str) -> ClientError {
    ConfigurationError::MissingField {
        field: field.to_string(),
    }
    .into()
}

fn validate_url(field: &str, value: Option<String>) -> Result<String, ClientError> {
    let value = value.ok_or_else(|| missing(field))?;
    match Url::parse(&value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(value),
        _ => Err(ConfigurationError::InvalidUrl {
            field: field.to_string(),
            url: value,
        }
        .into()),
    }
}

impl ClientConfig {
    /// Creates a configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Creates a configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `RACING_API_BASE_URL` (required): Data API base URL
    /// - `RACING_API_TOKEN_URL` (required): OAuth2 token endpoint
    /// - `RACING_API_CLIENT_ID` (required): OAuth2 client identifier
    /// - `RACING_API_CLIENT_SECRET` (optional): OAuth2 client secret
    /// - `RACING_API_TIMEOUT_SECS` (optional): Request timeout in seconds
    /// - `RACING_API_MAX_RETRIES` (optional): Attempts for transient failures
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = ClientConfigBuilder::new();

        if let Some(base_url) = lookup("RACING_API_BASE_URL") {
            builder = builder.base_url(base_url);
        }
        if let Some(token_url) = lookup("RACING_API_TOKEN_URL") {
            builder = builder.token_url(token_url);
        }
        if let Some(client_id) = lookup("RACING_API_CLIENT_ID") {
            builder = builder.client_id(client_id);
        }
        if let Some(secret) = lookup("RACING_API_CLIENT_SECRET") {
            builder = builder.client_secret(secret);
        }
        if let Some(timeout) = lookup("RACING_API_TIMEOUT_SECS") {
            let secs = parse_number::<u64>("RACING_API_TIMEOUT_SECS", &timeout)?;
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(retries) = lookup("RACING_API_MAX_RETRIES") {
            builder = builder.max_attempts(parse_number("RACING_API_MAX_RETRIES", &retries)?);
        }

        builder.build()
    }
}

fn parse_number<N: std::str::FromStr>(field: &str, value: &str) -> Result<N, ClientError> {
    value.trim().parse::<N>().map_err(|_| {
        ConfigurationError::InvalidValue {
            field: field.to_string(),
            message: format!("expected a number, got {:?}", value),
        }
        .into()
    })
}

/// Create a new client configuration builder.
pub fn client_config() -> ClientConfigBuilder {
    ClientConfigBuilder::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid_builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
            .base_url("https://data.example.com/data/")
            .token_url("https://auth.example.com/oauth2/token")
            .client_id("overlay-client")
    }

    #[test]
    fn test_builder_success() {
        let config = valid_builder().build().unwrap();

        assert_eq!(config.base_url, "https://data.example.com/data");
        assert_eq!(config.client_id, "overlay-client");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.cache_ttl, Duration::from_millis(300_000));
        assert_eq!(config.cache_capacity, 256);
        assert_eq!(config.refresh_buffer, Duration::from_secs(300));
        assert_eq!(
            config.endpoint_url("/member/info"),
            "https://data.example.com/data/member/info"
        );
    }

    #[test]
    fn test_builder_missing_client_id() {
        let result = ClientConfigBuilder::new()
            .base_url("https://data.example.com")
            .token_url("https://auth.example.com/token")
            .build();

        assert!(matches!(
            result,
            Err(ClientError::Configuration(ConfigurationError::MissingField { .. }))
        ));
    }

    #[test]
    fn test_builder_invalid_url() {
        let result = valid_builder().base_url("not a url").build();
        assert!(matches!(
            result,
            Err(ClientError::Configuration(ConfigurationError::InvalidUrl { .. }))
        ));

        let result = valid_builder().token_url("ftp://auth.example.com").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_zero_attempts_and_capacity() {
        assert!(valid_builder().max_attempts(0).build().is_err());
        assert!(valid_builder().cache_capacity(0).build().is_err());
    }

    #[test]
    fn test_max_attempts_overrides_retry_config() {
        let config = valid_builder()
            .retry(RetryConfig::default().with_max_attempts(7))
            .max_attempts(5)
            .build()
            .unwrap();
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("RACING_API_BASE_URL", "https://data.example.com"),
            ("RACING_API_TOKEN_URL", "https://auth.example.com/token"),
            ("RACING_API_CLIENT_ID", "env-client"),
            ("RACING_API_CLIENT_SECRET", "env-secret"),
            ("RACING_API_TIMEOUT_SECS", "10"),
            ("RACING_API_MAX_RETRIES", "5"),
        ]
        .into_iter()
        .collect();

        let config = ClientConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.client_id, "env-client");
        assert!(config.client_secret.is_some());
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_from_lookup_bad_number() {
        let result = ClientConfig::from_lookup(|k| match k {
            "RACING_API_BASE_URL" => Some("https://data.example.com".to_string()),
            "RACING_API_TOKEN_URL" => Some("https://auth.example.com/token".to_string()),
            "RACING_API_CLIENT_ID" => Some("c".to_string()),
            "RACING_API_TIMEOUT_SECS" => Some("soon".to_string()),
            _ => None,
        });
        assert!(matches!(
            result,
            Err(ClientError::Configuration(ConfigurationError::InvalidValue { .. }))
        ));
    }
}
