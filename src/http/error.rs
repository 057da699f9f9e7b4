//! Typed errors returned by the API client.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Default, Deserialize)]
struct ValidationBody {
    #[serde(default)]
    errors: Vec<Value>,
    #[serde(default, rename = "field-errors")]
    field_errors: Map<String, Value>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Neither the client nor the call supplied an API key.
    #[error("Must specify an API key")]
    MissingApiKey,

    /// The underlying HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    /// The request could not be built (bad URL or header value).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The server could not be reached after every attempt.
    #[error("Connection to {url} failed: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// HTTP 400 with field-level details.
    #[error("Validation failed (HTTP {status}): {body}")]
    Validation {
        status: StatusCode,
        errors: Vec<Value>,
        field_errors: Map<String, Value>,
        body: String,
    },

    /// Any other non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },

    /// Still rate limited or overloaded when the attempts ran out.
    #[error("Gave up after {attempts} attempts, last response was HTTP {status}: {body}")]
    RetriesExhausted {
        status: StatusCode,
        body: String,
        attempts: usize,
    },

    /// A success response whose body was not JSON.
    #[error("Failed to parse JSON response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    /// Builds a validation error from a 400 response body.
    ///
    /// The body is expected to look like `{"errors": [...], "field-errors": {...}}`;
    /// anything else yields empty error collections while keeping the raw text.
    pub fn validation(status: StatusCode, body: String) -> Self {
        let ValidationBody {
            errors,
            field_errors,
        } = serde_json::from_str::<ValidationBody>(&body).unwrap_or_default();

        ApiError::Validation {
            status,
            errors,
            field_errors,
            body,
        }
    }

    /// HTTP status of the response that caused the error, if there was one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Validation { status, .. }
            | ApiError::Http { status, .. }
            | ApiError::RetriesExhausted { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw response body, if the error came from a response.
    pub fn body(&self) -> Option<&str> {
        match self {
            ApiError::Validation { body, .. }
            | ApiError::Http { body, .. }
            | ApiError::RetriesExhausted { body, .. } => Some(body),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_parses_field_errors() {
        let body = r#"{"errors": ["bad"], "field-errors": {"lead": "This field is required."}}"#;
        let err = ApiError::validation(StatusCode::BAD_REQUEST, body.to_string());

        match err {
            ApiError::Validation {
                errors,
                field_errors,
                ..
            } => {
                assert_eq!(errors, vec![Value::from("bad")]);
                assert_eq!(field_errors["lead"], "This field is required.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_validation_with_plain_text_body() {
        let err = ApiError::validation(StatusCode::BAD_REQUEST, "Bad Request".to_string());
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(err.body(), Some("Bad Request"));
        assert!(matches!(
            err,
            ApiError::Validation { ref errors, ref field_errors, .. }
                if errors.is_empty() && field_errors.is_empty()
        ));
    }

    #[test]
    fn test_status_and_display() {
        let err = ApiError::Http {
            status: StatusCode::NOT_FOUND,
            body: "Not found".to_string(),
        };
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert!(err.to_string().contains("404"));
        assert!(err.to_string().contains("Not found"));

        assert_eq!(ApiError::MissingApiKey.status(), None);
        assert!(ApiError::MissingApiKey.to_string().contains("API key"));
    }
}
