//! Racing Data API Integration
//!
//! OAuth2-authenticated access to a racing data API, with automatic token
//! refresh, retry on transient failures and response caching.
//!
//! # Features
//!
//! - Password grant and refresh-token grant (RFC 6749 Sections 4.3 and 6)
//! - Proactive refresh before expiry, shared by concurrent callers
//! - Retry with exponential backoff on 429 and 5xx, honouring Retry-After
//! - One token refresh and replay on 401
//! - Bounded LRU response cache with per-entry TTL
//!
//! # Example
//!
//! ```rust,ignore
//! use racing_data_integration::{client_config, racing_client, TokenManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = client_config()
//!         .base_url("https://members-ng.example.com/data")
//!         .token_url("https://oauth.example.com/oauth2/token")
//!         .client_id("my-overlay")
//!         .build()?;
//!
//!     let client = racing_client(config)?;
//!     client
//!         .token_manager()
//!         .authenticate("driver@example.com", "password")
//!         .await?;
//!
//!     let member = client.cached_request("member/info").await?;
//!     println!("{}", member);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: token and configuration data structures
//! - `error`: error hierarchy and token endpoint error mapping
//! - `core`: HTTP transport
//! - `token`: token lifecycle management
//! - `resilience`: retry policy
//! - `cache`: response cache
//! - `builders`: fluent configuration builder
//! - `client`: the resilient data API client

pub mod builders;
pub mod cache;
pub mod client;
pub mod core;
pub mod error;
pub mod resilience;
pub mod token;
pub mod types;

// Re-export main client
pub use client::{racing_client, ResilientApiClient};

// Re-export builders
pub use builders::{client_config, ClientConfigBuilder};

// Re-export errors
pub use error::{
    get_user_message, map_token_error, parse_error_response, ApiError, AuthError, ClientError,
    ClientResult, ConfigurationError, NetworkError, OAuth2ErrorResponse,
};

// Re-export types
pub use types::{
    normalize_endpoint, ClientConfig, GrantType, TokenManagerConfig, TokenResponse, TokenState,
};

// Re-export core components
pub use core::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, MockHttpTransport, ReqwestHttpTransport,
};

// Re-export token management
pub use token::{create_mock_token_manager, DefaultTokenManager, MockTokenManager, TokenManager};

// Re-export resilience and cache
pub use cache::{CacheStats, ResponseCache};
pub use resilience::{RetryConfig, RetryStats};
