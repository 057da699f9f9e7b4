//! Client configuration.

use chrono::Local;
use std::time::Duration;

use super::retry::RetryPolicy;

/// Production API root.
pub const PRODUCTION_URL: &str = "https://api.close.com/api/v1/";

/// Local development server; it runs with a self-signed certificate.
pub const DEVELOPMENT_URL: &str = "https://local.close.io:5001/api/v1/";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root, always ending in `/`.
    pub base_url: String,
    pub api_key: Option<String>,
    /// Sent as `X-TZ-Offset`, in hours.
    pub tz_offset: String,
    pub retry: RetryPolicy,
    pub verify_tls: bool,
    pub timeout: Option<Duration>,
    /// Log every prepared request, with the `Authorization` header redacted.
    pub log_requests: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: PRODUCTION_URL.to_string(),
            api_key: None,
            tz_offset: local_tz_offset(),
            retry: RetryPolicy::default(),
            verify_tls: true,
            timeout: None,
            log_requests: false,
        }
    }
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::default().with_api_key(api_key)
    }

    /// Points the client at the local development server.
    pub fn development(mut self) -> Self {
        self.base_url = DEVELOPMENT_URL.to_string();
        self.verify_tls = false;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        self.base_url = base_url;
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_tz_offset(mut self, tz_offset: impl Into<String>) -> Self {
        self.tz_offset = tz_offset.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.log_requests = enabled;
        self
    }
}

/// Local UTC offset in hours, e.g. `"-5.0"` or `"5.75"`.
pub fn local_tz_offset() -> String {
    format_tz_offset(Local::now().offset().local_minus_utc())
}

fn format_tz_offset(seconds: i32) -> String {
    let hours = f64::from(seconds) / 3600.0;
    if hours.fract() == 0.0 {
        format!("{hours:.1}")
    } else {
        hours.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_production() {
        let config = ClientConfig::new("key");
        assert_eq!(config.base_url, PRODUCTION_URL);
        assert_eq!(config.api_key.as_deref(), Some("key"));
        assert!(config.verify_tls);
        assert!(config.timeout.is_none());
        assert!(!config.log_requests);
    }

    #[test]
    fn test_timeout_and_request_logging() {
        let config = ClientConfig::new("key")
            .with_timeout(Duration::from_secs(30))
            .with_request_logging(true);
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert!(config.log_requests);
    }

    #[test]
    fn test_development_disables_tls_verification() {
        let config = ClientConfig::new("key").development();
        assert_eq!(config.base_url, DEVELOPMENT_URL);
        assert!(!config.verify_tls);
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let config = ClientConfig::default().with_base_url("http://127.0.0.1:1234");
        assert_eq!(config.base_url, "http://127.0.0.1:1234/");

        let config = ClientConfig::default().with_base_url("http://127.0.0.1:1234/api/");
        assert_eq!(config.base_url, "http://127.0.0.1:1234/api/");
    }

    #[test]
    fn test_format_tz_offset() {
        assert_eq!(format_tz_offset(0), "0.0");
        assert_eq!(format_tz_offset(-5 * 3600), "-5.0");
        assert_eq!(format_tz_offset(3600 * 5 + 45 * 60), "5.75");
        assert_eq!(format_tz_offset(-(3 * 3600 + 30 * 60)), "-3.5");
    }
}
