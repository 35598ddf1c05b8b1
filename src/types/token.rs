//! Token Types
//!
//! Wire format of the token endpoint and the live token state derived from it.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;

/// Successful response from the token endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Token type (usually "Bearer").
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime of the access token in seconds.
    pub expires_in: u64,
    /// Refresh token. Some servers omit it on refresh.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Additional fields.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// The single live token set held by a token manager.
///
/// Replaced as a unit on every successful authenticate or refresh.
#[derive(Clone, Debug)]
pub struct TokenState {
    access_token: SecretString,
    refresh_token: Option<SecretString>,
    /// Token type reported by the server.
    pub token_type: String,
    /// When the token was issued, by local clock.
    pub issued_at: DateTime<Utc>,
    /// `issued_at + expires_in`, without any safety buffer applied.
    pub expires_at: DateTime<Utc>,
}

impl TokenState {
    /// Create a token state directly, e.g. when restoring a persisted session.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: SecretString::new(access_token.into()),
            refresh_token: refresh_token.map(SecretString::new),
            token_type: default_token_type(),
            issued_at: Utc::now(),
            expires_at,
        }
    }

    /// Build state from a token response issued at `issued_at`.
    ///
    /// `previous_refresh_token` is kept when the response carries none.
    pub fn from_response(
        response: TokenResponse,
        issued_at: DateTime<Utc>,
        previous_refresh_token: Option<SecretString>,
    ) -> Self {
        let lifetime = Duration::seconds(response.expires_in.min(u64::from(u32::MAX)) as i64);
        Self {
            access_token: SecretString::new(response.access_token),
            refresh_token: response
                .refresh_token
                .map(SecretString::new)
                .or(previous_refresh_token),
            token_type: response.token_type,
            issued_at,
            expires_at: issued_at + lifetime,
        }
    }

    /// Access token value (for the Authorization header).
    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }

    /// Refresh token value, if the server issued one.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_ref().map(|t| t.expose_secret().as_str())
    }

    pub(crate) fn refresh_secret(&self) -> Option<SecretString> {
        self.refresh_token.clone()
    }

    /// True once `now + buffer` reaches the server-reported expiry.
    pub fn needs_refresh(&self, buffer: std::time::Duration) -> bool {
        self.needs_refresh_at(Utc::now(), buffer)
    }

    pub(crate) fn needs_refresh_at(&self, now: DateTime<Utc>, buffer: std::time::Duration) -> bool {
        let buffer = Duration::from_std(buffer).unwrap_or_else(|_| Duration::zero());
        now + buffer >= self.expires_at
    }

    /// Check if the server would already reject the token.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Remaining lifetime, zero once expired.
    pub fn remaining_lifetime(&self) -> std::time::Duration {
        (self.expires_at - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }

    /// Format as Authorization header value.
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token.expose_secret())
    }
}
