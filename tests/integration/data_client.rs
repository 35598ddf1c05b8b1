//! Integration tests for the resilient data client

use super::*;
use racing_data_integration::{
    racing_client, ApiError, ClientError, ResilientApiClient, RetryConfig, TokenManager,
};
use std::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::header;

async fn signed_in_client(server: &MockServer, config: ClientConfig) -> ResilientApiClient {
    password_grant(token_body("access-1", "refresh-1", 3600))
        .mount(server)
        .await;

    let client = racing_client(config).expect("client");
    client
        .token_manager()
        .authenticate("driver@example.com", "pw")
        .await
        .expect("authenticated");
    client
}

fn fast_retry() -> RetryConfig {
    RetryConfig {
        rate_limit_base: Duration::from_millis(10),
        server_error_base: Duration::from_millis(10),
        ..RetryConfig::default()
    }
}

#[tokio::test]
async fn test_data_request_integration_success() {
    let mock_server = setup_mock_server().await;
    let client = signed_in_client(&mock_server, test_config(&mock_server)).await;

    Mock::given(method("GET"))
        .and(path("/data/member/info"))
        .and(header("authorization", "Bearer access-1"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cust_id": 123456,
            "display_name": "Test Driver"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let member = assert_ok!(client.request("/member/info").await);
    assert_eq!(member["cust_id"], 123456);
    assert_eq!(member["display_name"], "Test Driver");
}

#[tokio::test]
async fn test_unauthorized_triggers_refresh_and_replay() {
    let mock_server = setup_mock_server().await;
    let client = signed_in_client(&mock_server, test_config(&mock_server)).await;

    refresh_grant(
        "refresh-1",
        ResponseTemplate::new(200).set_body_json(token_body("access-2", "refresh-2", 3600)),
    )
    .expect(1)
    .mount(&mock_server)
    .await;

    Mock::given(method("GET"))
        .and(path("/data/series/get"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/data/series/get"))
        .and(header("authorization", "Bearer access-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"series_id": 1}])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let series = assert_ok!(client.request("series/get").await);
    assert_eq!(series[0]["series_id"], 1);
    assert_eq!(client.retry_stats().auth_refreshes, 1);
}

#[tokio::test]
async fn test_rate_limit_integration_honours_retry_after() {
    let mock_server = setup_mock_server().await;
    let client = signed_in_client(&mock_server, test_config(&mock_server)).await;

    Mock::given(method("GET"))
        .and(path("/data/results/lap_data"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/data/results/lap_data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"laps": []})))
        .mount(&mock_server)
        .await;

    let start = Instant::now();
    assert_ok!(client.request("results/lap_data").await);
    assert!(start.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn test_server_errors_integration_exhaust_attempts() {
    let mock_server = setup_mock_server().await;
    let config = config_builder(&mock_server)
        .retry(fast_retry())
        .build()
        .expect("config");
    let client = signed_in_client(&mock_server, config).await;

    Mock::given(method("GET"))
        .and(path("/data/track/get"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let error = assert_err!(client.request("track/get").await);
    match error {
        ClientError::Api(ApiError::HttpError {
            status_code,
            message,
        }) => {
            assert_eq!(status_code, 503);
            assert_eq!(message, "maintenance");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_not_found_integration_not_retried() {
    let mock_server = setup_mock_server().await;
    let client = signed_in_client(&mock_server, test_config(&mock_server)).await;

    Mock::given(method("GET"))
        .and(path("/data/car/unknown"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let error = assert_err!(client.request("car/unknown").await);
    assert_eq!(error.status_code(), Some(404));
}

#[tokio::test]
async fn test_cached_request_integration() {
    let mock_server = setup_mock_server().await;
    let client = signed_in_client(&mock_server, test_config(&mock_server)).await;

    Mock::given(method("GET"))
        .and(path("/data/track/assets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"1": {"name": "Spa"}})))
        .expect(2)
        .mount(&mock_server)
        .await;

    let first = assert_ok!(client.cached_request("track/assets").await);
    let second = assert_ok!(client.cached_request("track/assets").await);
    assert_eq!(first, second);

    client.clear_cache().await;
    assert_ok!(client.cached_request("track/assets").await);

    let stats = client.cache_stats().await;
    assert_eq!(stats.entries, 1);
    assert!(stats.hits >= 1);
}

#[tokio::test]
async fn test_signed_out_client_fails_without_request() {
    let mock_server = setup_mock_server().await;
    let client = signed_in_client(&mock_server, test_config(&mock_server)).await;
    client.token_manager().sign_out().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let error = assert_err!(client.request("member/info").await);
    assert!(error.needs_reauth());
}
