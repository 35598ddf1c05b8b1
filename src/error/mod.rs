//! Error Types
//!
//! Error hierarchy for token management and data API requests.

use thiserror::Error;

/// Root error type for the integration.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

impl ClientError {
    /// Get error code for telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "RACING_CONFIG",
            Self::Auth(_) => "RACING_AUTH",
            Self::Api(ApiError::HttpError { .. }) => "RACING_HTTP",
            Self::Api(ApiError::MalformedResponse { .. }) => "RACING_MALFORMED",
            Self::Api(ApiError::Network { .. }) => "RACING_NETWORK",
        }
    }

    /// Check if the caller has to authenticate again before retrying.
    pub fn needs_reauth(&self) -> bool {
        match self {
            Self::Auth(e) => e.needs_reauth(),
            _ => false,
        }
    }

    /// HTTP status code carried by the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api(e) => e.status_code(),
            Self::Auth(AuthError::Provider { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid URL for {field}: {url}")]
    InvalidUrl { field: String, url: String },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Token lifecycle error.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Invalid credentials: {error}")]
    InvalidCredentials {
        error: String,
        error_description: Option<String>,
    },

    #[error("Token refresh failed: {message}")]
    RefreshFailed { message: String },

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Malformed token response: {message}")]
    MalformedResponse { message: String },

    #[error("Token endpoint returned HTTP {status}: {message}")]
    Provider { status: u16, message: String },
}

impl AuthError {
    /// Only transport failures are worth retrying; everything else is terminal for the call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Check if error requires re-authentication.
    pub fn needs_reauth(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated
                | Self::NoRefreshToken
                | Self::InvalidCredentials { .. }
                | Self::RefreshFailed { .. }
        )
    }
}

/// Data API error.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP {status_code}: {message}")]
    HttpError { status_code: u16, message: String },

    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    #[error("Network error: {message}")]
    Network { message: String },
}

impl ApiError {
    /// Status code of an HTTP failure.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpError { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// True when the failure was the server asking us to slow down.
    pub fn is_rate_limited(&self) -> bool {
        self.status_code() == Some(429)
    }
}

/// Network/transport error.
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: std::time::Duration },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },
}

impl From<NetworkError> for ApiError {
    fn from(error: NetworkError) -> Self {
        ApiError::Network {
            message: error.to_string(),
        }
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// OAuth2 error response from the token endpoint.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct OAuth2ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Parse error response from HTTP body.
pub fn parse_error_response(body: &str) -> Option<OAuth2ErrorResponse> {
    serde_json::from_str(body).ok()
}

/// Map a failed token endpoint response to an [`AuthError`].
pub fn map_token_error(status: u16, body: &str) -> AuthError {
    match parse_error_response(body) {
        Some(response) => match response.error.as_str() {
            "invalid_grant" | "invalid_client" => AuthError::InvalidCredentials {
                error: response.error,
                error_description: response.error_description,
            },
            _ => AuthError::Provider {
                status,
                message: response.error_description.unwrap_or(response.error),
            },
        },
        None if status == 400 || status == 401 => AuthError::InvalidCredentials {
            error: format!("HTTP {}", status),
            error_description: None,
        },
        None => AuthError::Provider {
            status,
            message: truncate_body(body),
        },
    }
}

/// Shorten a response body for inclusion in an error message.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 512;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Get user-friendly error message.
pub fn get_user_message(error: &ClientError) -> String {
    match error {
        ClientError::Auth(AuthError::NotAuthenticated) => {
            "You are not signed in. Please sign in to continue.".to_string()
        }
        ClientError::Auth(AuthError::InvalidCredentials { .. }) => {
            "The email or password is incorrect.".to_string()
        }
        ClientError::Auth(AuthError::NoRefreshToken)
        | ClientError::Auth(AuthError::RefreshFailed { .. }) => {
            "Your session has expired. Please sign in again.".to_string()
        }
        ClientError::Auth(AuthError::Network(_)) | ClientError::Api(ApiError::Network { .. }) => {
            "Could not reach the service. Please check your connection.".to_string()
        }
        ClientError::Api(ApiError::HttpError {
            status_code: 429, ..
        }) => "Too many requests. Please wait a moment and try again.".to_string(),
        ClientError::Api(ApiError::HttpError { status_code, .. }) if *status_code >= 500 => {
            "The data service is temporarily unavailable. Please try again later.".to_string()
        }
        _ => "An unexpected error occurred. Please try again.".to_string(),
    }
}
