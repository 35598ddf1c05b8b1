//! Retry Policy
//!
//! Response classification and exponential backoff for data API requests.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Retry configuration.
///
/// Transient retries (429, 5xx) and 401-triggered token refreshes are budgeted
/// independently.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts for transient failures, including the first one.
    pub max_attempts: u32,
    /// Token refreshes allowed per request in response to a 401.
    pub max_auth_refreshes: u32,
    /// Base delay for rate-limit backoff when no Retry-After is given.
    pub rate_limit_base: Duration,
    /// Base delay for server-error backoff.
    pub server_error_base: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
    /// Upper bound on computed backoff.
    pub max_delay: Duration,
    /// Optional upper bound on a server-supplied Retry-After. `None` waits as asked.
    pub max_retry_after: Option<Duration>,
    /// Jitter factor (0.0-1.0).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        DEFAULT_RETRY_CONFIG
    }
}

/// Default retry configuration.
pub const DEFAULT_RETRY_CONFIG: RetryConfig = RetryConfig {
    max_attempts: 3,
    max_auth_refreshes: 1,
    rate_limit_base: Duration::from_secs(1),
    server_error_base: Duration::from_secs(1),
    multiplier: 2.0,
    max_delay: Duration::from_secs(60),
    max_retry_after: None,
    jitter: 0.0,
};

impl RetryConfig {
    /// Config with a different attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Wait before the next attempt after a 429 on `attempt` (0-based).
    pub fn rate_limit_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(wait) => self.max_retry_after.map_or(wait, |cap| wait.min(cap)),
            None => self.backoff(self.rate_limit_base, attempt),
        }
    }

    /// Wait before the next attempt after a 5xx on `attempt` (0-based).
    pub fn server_error_delay(&self, attempt: u32) -> Duration {
        self.backoff(self.server_error_base, attempt)
    }

    fn backoff(&self, base: Duration, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_delay = base.as_secs_f64() * self.multiplier.powi(exponent);
        let capped_delay = base_delay.min(self.max_delay.as_secs_f64());

        if self.jitter <= 0.0 {
            return Duration::from_secs_f64(capped_delay.max(0.0));
        }

        let jitter_range = capped_delay * self.jitter.min(1.0);
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        Duration::from_secs_f64((capped_delay + jitter).max(0.0))
    }
}

/// How a data API response status is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx.
    Success,
    /// 401: refresh the token and try again.
    Unauthorized,
    /// 429: wait and try again.
    RateLimited,
    /// 5xx: back off and try again.
    ServerError,
    /// Anything else fails immediately.
    Terminal,
}

impl ResponseClass {
    /// Classify a status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Success,
            401 => Self::Unauthorized,
            429 => Self::RateLimited,
            500..=u16::MAX => Self::ServerError,
            _ => Self::Terminal,
        }
    }
}

/// Retry statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryStats {
    /// HTTP attempts issued against the data API.
    pub total_attempts: u64,
    /// Attempts that followed a 429 or 5xx.
    pub retries: u64,
    /// Token refreshes triggered by a 401.
    pub auth_refreshes: u64,
    /// Requests that ended in an error.
    pub failed_requests: u64,
}

/// Parse a Retry-After header value: delta-seconds or an HTTP-date.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    Some(
        (date.with_timezone(&Utc) - now)
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}
