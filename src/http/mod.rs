//! HTTP client module with retry logic and error handling.

mod client;
mod config;
mod error;
mod retry;

pub use client::{Client, Query, RequestOptions};
pub use config::{ClientConfig, DEVELOPMENT_URL, PRODUCTION_URL, local_tz_offset};
pub use error::ApiError;
pub use retry::{
    BACKOFF_BASE_MS, CONNECTION_RETRY_DELAY_MS, DEFAULT_RATE_LIMIT_DELAY_MS, Disposition,
    MAX_BACKOFF_MS, MAX_RATE_LIMIT_DELAY_MS, MAX_RETRIES, RetryPolicy, classify_status,
    parse_rate_limit_header, rate_limit_delay,
};
