//! Retry policy and response classification for API requests.

use regex::Regex;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;

/// Maximum number of attempts for a single API call.
pub const MAX_RETRIES: usize = 5;

/// Delay between attempts after a connection error, in milliseconds.
pub const CONNECTION_RETRY_DELAY_MS: u64 = 2000;

/// Delay used when a 429 response carries no usable reset hint, in milliseconds.
pub const DEFAULT_RATE_LIMIT_DELAY_MS: u64 = 2000;

/// Longest wait honoured for a rate-limit hint, in milliseconds.
pub const MAX_RATE_LIMIT_DELAY_MS: u64 = 600_000;

/// First backoff step for 502/503/504 responses, in milliseconds.
pub const BACKOFF_BASE_MS: u64 = 1000;

/// Upper bound for a single backoff step, in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30_000;

// "Malformed RateLimit header fields MUST be ignored", so anything that does not
// match exactly falls through to the next hint.
static RATE_LIMIT_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*limit=(\d+),\s*remaining=(\d+),\s*reset=(\d+(?:\.\d+)?)\s*$")
        .expect("rate limit pattern is valid")
});

/// How a response should be handled by the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 2xx: decode and return the body.
    Success,
    /// 429: wait for the advertised reset and try again.
    RateLimited,
    /// 502/503/504: back off exponentially and try again.
    ServerBusy,
    /// 400: surface field-level validation errors.
    Validation,
    /// Any other status: give up immediately.
    Failed,
}

pub fn classify_status(status: StatusCode) -> Disposition {
    match status {
        s if s.is_success() => Disposition::Success,
        StatusCode::TOO_MANY_REQUESTS => Disposition::RateLimited,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            Disposition::ServerBusy
        }
        StatusCode::BAD_REQUEST => Disposition::Validation,
        _ => Disposition::Failed,
    }
}

/// Retry knobs for a [`Client`](super::Client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub connection_delay: Duration,
    pub backoff_base: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            connection_delay: Duration::from_millis(CONNECTION_RETRY_DELAY_MS),
            backoff_base: Duration::from_millis(BACKOFF_BASE_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the next attempt after a 502/503/504. `attempt` is zero-based.
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16) as u32);
        self.backoff_base
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Works out how long to wait after a 429 response.
///
/// Hints are tried in order: the structured `RateLimit` header, `RateLimit-Reset`,
/// `Retry-After`, and finally the legacy `error.rate_reset` body field. When none
/// of them parse, [`DEFAULT_RATE_LIMIT_DELAY_MS`] is used.
pub fn rate_limit_delay(headers: &HeaderMap, body: &[u8]) -> Duration {
    let hint = header_str(headers, "ratelimit")
        .and_then(parse_rate_limit_header)
        .or_else(|| header_seconds(headers, "ratelimit-reset"))
        .or_else(|| header_seconds(headers, "retry-after"))
        .or_else(|| legacy_rate_reset(body));

    hint.and_then(seconds_to_duration)
        .unwrap_or_else(|| Duration::from_millis(DEFAULT_RATE_LIMIT_DELAY_MS))
}

/// Extracts `reset` from a `limit=N, remaining=N, reset=S` header value.
pub fn parse_rate_limit_header(value: &str) -> Option<f64> {
    let captures = RATE_LIMIT_HEADER.captures(value)?;
    captures.get(3)?.as_str().parse().ok()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}

fn header_seconds(headers: &HeaderMap, name: &str) -> Option<f64> {
    header_str(headers, name)?.trim().parse().ok()
}

fn legacy_rate_reset(body: &[u8]) -> Option<f64> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value.get("error")?.get("rate_reset")?.as_f64()
}

// Hints come from the server; anything past the cap waits the cap.
fn seconds_to_duration(seconds: f64) -> Option<Duration> {
    if !seconds.is_finite() {
        return None;
    }
    let cap = Duration::from_millis(MAX_RATE_LIMIT_DELAY_MS);
    let delay = Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(cap);
    Some(delay.min(cap))
}
