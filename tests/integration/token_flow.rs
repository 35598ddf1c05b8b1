//! Integration tests for the token lifecycle

use super::*;
use futures::future::join_all;
use racing_data_integration::{
    AuthError, DefaultTokenManager, ReqwestHttpTransport, TokenManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::header;

fn manager(server: &MockServer) -> DefaultTokenManager {
    let config = test_config(server);
    let transport = Arc::new(ReqwestHttpTransport::new().expect("transport"));
    DefaultTokenManager::new(config.token_manager_config(), transport)
}

#[tokio::test]
async fn test_password_grant_integration_success() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("username=driver%40example.com"))
        .and(body_string_contains("client_id=integration-client"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_body("access-1", "refresh-1", 3600)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let manager = manager(&mock_server);
    let state = assert_ok!(manager.authenticate("driver@example.com", "hunter2").await);

    assert_eq!(state.access_token(), "access-1");
    assert_eq!(state.refresh_token(), Some("refresh-1"));
    assert!(manager.is_authenticated().await);
    assert_eq!(assert_ok!(manager.get_valid_token().await), "access-1");
}

#[tokio::test]
async fn test_password_grant_integration_invalid_credentials() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "Client authentication failed"
        })))
        .mount(&mock_server)
        .await;

    let manager = manager(&mock_server);
    let error = assert_err!(manager.authenticate("driver@example.com", "wrong").await);

    match error {
        AuthError::InvalidCredentials {
            error,
            error_description,
        } => {
            assert_eq!(error, "invalid_client");
            assert_eq!(
                error_description.as_deref(),
                Some("Client authentication failed")
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!manager.is_authenticated().await);
}

#[tokio::test]
async fn test_token_within_buffer_is_refreshed() {
    let mock_server = setup_mock_server().await;

    // Expires inside the default 300s refresh buffer.
    password_grant(token_body("access-1", "refresh-1", 60))
        .mount(&mock_server)
        .await;
    refresh_grant(
        "refresh-1",
        ResponseTemplate::new(200).set_body_json(token_body("access-2", "refresh-2", 3600)),
    )
    .expect(1)
    .mount(&mock_server)
    .await;

    let manager = manager(&mock_server);
    let first = assert_ok!(manager.authenticate("driver@example.com", "pw").await);

    assert_eq!(assert_ok!(manager.get_valid_token().await), "access-2");
    assert_eq!(assert_ok!(manager.get_valid_token().await), "access-2");

    let state = manager.current_state().await.expect("state");
    assert!(state.expires_at > first.expires_at);
    assert_eq!(state.refresh_token(), Some("refresh-2"));
}

#[tokio::test]
async fn test_rejected_refresh_clears_state() {
    let mock_server = setup_mock_server().await;

    password_grant(token_body("access-1", "refresh-1", 3600))
        .mount(&mock_server)
        .await;
    refresh_grant(
        "refresh-1",
        ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})),
    )
    .mount(&mock_server)
    .await;

    let manager = manager(&mock_server);
    assert_ok!(manager.authenticate("driver@example.com", "pw").await);

    let error = assert_err!(manager.refresh().await);
    assert!(matches!(error, AuthError::RefreshFailed { .. }));
    assert!(error.needs_reauth());
    assert!(!manager.is_authenticated().await);
}

#[tokio::test]
async fn test_concurrent_refresh_integration() {
    let mock_server = setup_mock_server().await;

    password_grant(token_body("access-1", "refresh-1", 10))
        .mount(&mock_server)
        .await;
    refresh_grant(
        "refresh-1",
        ResponseTemplate::new(200)
            .set_body_json(token_body("access-2", "refresh-2", 3600))
            .set_delay(Duration::from_millis(100)),
    )
    .expect(1)
    .mount(&mock_server)
    .await;

    let manager = manager(&mock_server);
    assert_ok!(manager.authenticate("driver@example.com", "pw").await);

    let tokens = join_all((0..5).map(|_| manager.get_valid_token())).await;
    for token in tokens {
        assert_eq!(assert_ok!(token), "access-2");
    }
}

#[tokio::test]
async fn test_token_endpoint_redirect_not_followed() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(307)
                .insert_header("Location", format!("{}/elsewhere", mock_server.uri()).as_str()),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/elsewhere"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_body("stolen", "stolen", 3600)),
        )
        .expect(0)
        .mount(&mock_server)
        .await;

    let manager = manager(&mock_server);
    let error = assert_err!(manager.authenticate("driver@example.com", "pw").await);

    assert!(matches!(error, AuthError::Provider { status: 307, .. }));
    assert!(!manager.is_authenticated().await);
}
