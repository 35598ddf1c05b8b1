//! Token Management
//!
//! Password-grant authentication and refresh-token lifecycle.

pub mod manager;

pub use manager::{create_mock_token_manager, DefaultTokenManager, MockTokenManager, TokenManager};
