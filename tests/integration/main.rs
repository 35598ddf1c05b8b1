//! Integration tests using WireMock
//!
//! These tests run the token manager and data client over the real reqwest
//! transport against a mock HTTP server.

mod data_client;
mod token_flow;

use racing_data_integration::{client_config, ClientConfig, ClientConfigBuilder};
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN_PATH: &str = "/oauth2/token";

/// Helper to create a mock server
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Builder pointed at the mock server.
pub fn config_builder(server: &MockServer) -> ClientConfigBuilder {
    client_config()
        .base_url(format!("{}/data", server.uri()))
        .token_url(format!("{}{}", server.uri(), TOKEN_PATH))
        .client_id("integration-client")
}

pub fn test_config(server: &MockServer) -> ClientConfig {
    config_builder(server).build().expect("valid config")
}

/// Token endpoint body.
pub fn token_body(access: &str, refresh: &str, expires_in: u64) -> Value {
    json!({
        "access_token": access,
        "token_type": "Bearer",
        "expires_in": expires_in,
        "refresh_token": refresh,
    })
}

/// Mock answering password grants.
pub fn password_grant(body: Value) -> Mock {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
}

/// Mock answering refresh grants for `refresh_token`.
pub fn refresh_grant(refresh_token: &str, response: ResponseTemplate) -> Mock {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains(format!("refresh_token={}", refresh_token)))
        .respond_with(response)
}
