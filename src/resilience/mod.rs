//! Resilience
//!
//! Retry policy for data API requests: response classification, exponential
//! backoff and Retry-After handling.

pub mod retry;

pub use retry::{parse_retry_after, ResponseClass, RetryConfig, RetryStats, DEFAULT_RETRY_CONFIG};
