//! Resilient API Client
//!
//! Authenticated reads against the data API with retry on recoverable
//! failures and a bounded response cache.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

use crate::cache::{CacheStats, ResponseCache};
use crate::core::transport::lock;
use crate::core::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestHttpTransport};
use crate::error::{truncate_body, ApiError, ClientError, ClientResult};
use crate::resilience::{parse_retry_after, ResponseClass, RetryStats};
use crate::token::{DefaultTokenManager, TokenManager};
use crate::types::{normalize_endpoint, ClientConfig};

/// Client for the data API.
///
/// Holds a shared handle to a [`TokenManager`] for credentials and owns its
/// response cache.
pub struct ResilientApiClient<
    T: HttpTransport = ReqwestHttpTransport,
    M: TokenManager = DefaultTokenManager<ReqwestHttpTransport>,
> {
    config: ClientConfig,
    transport: Arc<T>,
    token_manager: Arc<M>,
    cache: AsyncMutex<ResponseCache>,
    in_flight: AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    stats: Mutex<RetryStats>,
}

impl ResilientApiClient {
    /// Create a client over reqwest with its own token manager.
    pub fn from_config(config: ClientConfig) -> ClientResult<Self> {
        let transport = Arc::new(
            ReqwestHttpTransport::with_options(
                config.timeout,
                crate::core::DEFAULT_MAX_RESPONSE_SIZE,
            )
            .map_err(ApiError::from)?,
        );
        let token_manager = Arc::new(DefaultTokenManager::new(
            config.token_manager_config(),
            transport.clone(),
        ));
        Ok(Self::new(config, transport, token_manager))
    }
}

impl<T: HttpTransport, M: TokenManager> ResilientApiClient<T, M> {
    /// Create a client with custom components.
    pub fn new(config: ClientConfig, transport: Arc<T>, token_manager: Arc<M>) -> Self {
        let cache = ResponseCache::new(config.cache_capacity);
        Self {
            config,
            transport,
            token_manager,
            cache: AsyncMutex::new(cache),
            in_flight: AsyncMutex::new(HashMap::new()),
            stats: Mutex::new(RetryStats::default()),
        }
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The token manager supplying credentials.
    pub fn token_manager(&self) -> &Arc<M> {
        &self.token_manager
    }

    /// GET `endpoint` with the configured attempt budget.
    pub async fn request(&self, endpoint: &str) -> ClientResult<Value> {
        self.request_with_retries(endpoint, self.config.retry.max_attempts)
            .await
    }

    /// GET `endpoint`, allowing up to `max_attempts` attempts for 429/5xx.
    ///
    /// A 401 triggers a token refresh and a new attempt that does not count
    /// against `max_attempts`; at most `max_auth_refreshes` such refreshes
    /// happen per call. Credential errors are never retried.
    pub async fn request_with_retries(&self, endpoint: &str, max_attempts: u32) -> ClientResult<Value> {
        let result = self.execute(normalize_endpoint(endpoint), max_attempts.max(1)).await;
        if let Err(e) = &result {
            lock(&self.stats).failed_requests += 1;
            tracing::debug!(endpoint, error = %e, "Request failed");
        }
        result
    }

    /// GET `endpoint` and deserialize the payload.
    pub async fn request_as<R: DeserializeOwned>(&self, endpoint: &str) -> ClientResult<R> {
        decode(self.request(endpoint).await?)
    }

    /// Cached GET with the configured default TTL.
    pub async fn cached_request(&self, endpoint: &str) -> ClientResult<Value> {
        self.cached_request_with_ttl(endpoint, self.config.cache_ttl)
            .await
    }

    /// Cached GET deserialized into `R`.
    pub async fn cached_request_as<R: DeserializeOwned>(&self, endpoint: &str) -> ClientResult<R> {
        decode(self.cached_request(endpoint).await?)
    }

    /// Serve `endpoint` from cache while fresh, otherwise fetch it and cache
    /// the payload for `ttl`.
    ///
    /// Failed fetches leave the cache untouched. Concurrent misses for the same
    /// endpoint are coalesced: one caller fetches, the others wait and read the
    /// entry it stored.
    pub async fn cached_request_with_ttl(&self, endpoint: &str, ttl: Duration) -> ClientResult<Value> {
        let key = normalize_endpoint(endpoint).to_string();

        let cached = self.cache.lock().await.get(&key);
        if let Some(payload) = cached {
            tracing::debug!(endpoint = %key, "Cache hit");
            return Ok(payload);
        }

        let key_lock = self
            .in_flight
            .lock()
            .await
            .entry(key.clone())
            .or_default()
            .clone();

        let result = {
            let _guard = key_lock.lock().await;

            // Counted as a miss above; a follower is served what the leader stored.
            let cached = self.cache.lock().await.peek_fresh(&key);
            match cached {
                Some(payload) => Ok(payload),
                None => {
                    tracing::debug!(endpoint = %key, "Cache miss");
                    let fetched = self.request(&key).await;
                    if let Ok(payload) = &fetched {
                        self.cache
                            .lock()
                            .await
                            .insert(key.clone(), payload.clone(), ttl);
                    }
                    fetched
                }
            }
        };

        let mut in_flight = self.in_flight.lock().await;
        let idle = in_flight
            .get(&key)
            .is_some_and(|l| Arc::ptr_eq(l, &key_lock) && Arc::strong_count(&key_lock) == 2);
        if idle {
            in_flight.remove(&key);
        }

        result
    }

    /// Empty the response cache.
    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
        tracing::debug!("Response cache cleared");
    }

    /// Drop the cached entry for one endpoint. Returns whether it existed.
    pub async fn invalidate(&self, endpoint: &str) -> bool {
        self.cache.lock().await.remove(normalize_endpoint(endpoint))
    }

    /// Drop expired cache entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        self.cache.lock().await.purge_expired()
    }

    /// Cache counters.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.lock().await.stats()
    }

    /// Retry counters.
    pub fn retry_stats(&self) -> RetryStats {
        lock(&self.stats).clone()
    }

    fn build_request(&self, url: &str, token: &str) -> HttpRequest {
        let mut headers = HashMap::new();
        headers.insert("authorization".to_string(), format!("Bearer {}", token));
        headers.insert("accept".to_string(), "application/json".to_string());
        headers.insert("user-agent".to_string(), self.config.user_agent.clone());

        HttpRequest {
            method: HttpMethod::Get,
            url: url.to_string(),
            headers,
            body: None,
            timeout: Some(self.config.timeout),
        }
    }

    async fn execute(&self, endpoint: &str, max_attempts: u32) -> ClientResult<Value> {
        let url = self.config.endpoint_url(endpoint);
        let retry = &self.config.retry;
        let mut attempt = 0u32;
        let mut auth_refreshes = 0u32;

        loop {
            let token = self.token_manager.get_valid_token().await?;

            lock(&self.stats).total_attempts += 1;
            tracing::debug!(endpoint, attempt, "Issuing request");

            let response = self
                .transport
                .send(self.build_request(&url, &token))
                .await
                .map_err(ApiError::from)?;

            match ResponseClass::from_status(response.status) {
                ResponseClass::Success => return parse_payload(&response),
                ResponseClass::Unauthorized if auth_refreshes < retry.max_auth_refreshes => {
                    auth_refreshes += 1;
                    lock(&self.stats).auth_refreshes += 1;
                    tracing::warn!(endpoint, "Access token rejected, refreshing");
                    self.token_manager.refresh_rejected(&token).await?;
                }
                ResponseClass::RateLimited if attempt + 1 < max_attempts => {
                    let retry_after = response
                        .header("retry-after")
                        .and_then(|value| parse_retry_after(value, Utc::now()));
                    let delay = retry.rate_limit_delay(attempt, retry_after);
                    tracing::warn!(endpoint, attempt, delay_ms = delay.as_millis() as u64, "Rate limited, backing off");
                    self.backoff(delay).await;
                    attempt += 1;
                }
                ResponseClass::ServerError if attempt + 1 < max_attempts => {
                    let delay = retry.server_error_delay(attempt);
                    tracing::warn!(
                        endpoint,
                        attempt,
                        status = response.status,
                        delay_ms = delay.as_millis() as u64,
                        "Server error, backing off"
                    );
                    self.backoff(delay).await;
                    attempt += 1;
                }
                _ => return Err(http_error(&response).into()),
            }
        }
    }

    async fn backoff(&self, delay: Duration) {
        lock(&self.stats).retries += 1;
        tokio::time::sleep(delay).await;
    }
}

fn parse_payload(response: &HttpResponse) -> ClientResult<Value> {
    serde_json::from_str(&response.body).map_err(|e| {
        ApiError::MalformedResponse {
            message: e.to_string(),
        }
        .into()
    })
}

fn decode<R: DeserializeOwned>(payload: Value) -> ClientResult<R> {
    serde_json::from_value(payload).map_err(|e| {
        ApiError::MalformedResponse {
            message: e.to_string(),
        }
        .into()
    })
}

fn http_error(response: &HttpResponse) -> ApiError {
    let message = if response.body.trim().is_empty() {
        format!("HTTP {}", response.status)
    } else {
        truncate_body(&response.body)
    };
    ApiError::HttpError {
        status_code: response.status,
        message,
    }
}

/// Create a client with default components from `config`.
pub fn racing_client(config: ClientConfig) -> Result<ResilientApiClient, ClientError> {
    ResilientApiClient::from_config(config)
}
