//! The [`Api`] seam used by every bulk operation, and the dry-run guard.

use async_trait::async_trait;
use log::info;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;

use crate::http::{ApiError, Client, Query, RequestOptions};

/// The four verbs of the Close API, plus a pause hook for bulk loops.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Api: Send + Sync {
    async fn get(&self, endpoint: &str, query: &Query) -> Result<Value, ApiError>;
    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, ApiError>;
    async fn put(&self, endpoint: &str, body: &Value) -> Result<Value, ApiError>;
    async fn delete(&self, endpoint: &str) -> Result<Value, ApiError>;

    /// Logs `reason` and waits, e.g. for the search index to catch up with writes.
    async fn pause(&self, duration: Duration, reason: &str) {
        info!("{}", reason);
        tokio::time::sleep(duration).await;
    }
}

#[async_trait]
impl Api for Client {
    async fn get(&self, endpoint: &str, query: &Query) -> Result<Value, ApiError> {
        self.dispatch(Method::GET, endpoint, query, None, &RequestOptions::default())
            .await
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, ApiError> {
        self.dispatch(
            Method::POST,
            endpoint,
            &[],
            Some(body),
            &RequestOptions::default(),
        )
        .await
    }

    async fn put(&self, endpoint: &str, body: &Value) -> Result<Value, ApiError> {
        self.dispatch(Method::PUT, endpoint, &[], Some(body), &RequestOptions::default())
            .await
    }

    async fn delete(&self, endpoint: &str) -> Result<Value, ApiError> {
        self.dispatch(Method::DELETE, endpoint, &[], None, &RequestOptions::default())
            .await
    }
}

/// Builds a [`Query`] from borrowed pairs.
pub fn query<K, V>(pairs: &[(K, V)]) -> Query
where
    K: AsRef<str>,
    V: ToString,
{
    pairs
        .iter()
        .map(|(k, v)| (k.as_ref().to_string(), v.to_string()))
        .collect()
}

/// Wraps an [`Api`] so that nothing is written unless the run is confirmed.
///
/// Reads always go through. Unconfirmed writes are logged as `FAKE ...` and
/// answer `null`, and pauses only log their reason.
pub struct DryRun<A> {
    inner: A,
    confirmed: bool,
}

impl<A: Api> DryRun<A> {
    pub fn new(inner: A, confirmed: bool) -> Self {
        Self { inner, confirmed }
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    fn fake(&self, method: &str, endpoint: &str, body: Option<&Value>) -> Value {
        match body {
            Some(body) => info!("FAKE {} {} {}", method, endpoint, body),
            None => info!("FAKE {} {}", method, endpoint),
        }
        Value::Null
    }
}

#[async_trait]
impl<A: Api> Api for DryRun<A> {
    async fn get(&self, endpoint: &str, query: &Query) -> Result<Value, ApiError> {
        self.inner.get(endpoint, query).await
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, ApiError> {
        if !self.confirmed {
            return Ok(self.fake("POST", endpoint, Some(body)));
        }
        self.inner.post(endpoint, body).await
    }

    async fn put(&self, endpoint: &str, body: &Value) -> Result<Value, ApiError> {
        if !self.confirmed {
            return Ok(self.fake("PUT", endpoint, Some(body)));
        }
        self.inner.put(endpoint, body).await
    }

    async fn delete(&self, endpoint: &str) -> Result<Value, ApiError> {
        if !self.confirmed {
            return Ok(self.fake("DELETE", endpoint, None));
        }
        self.inner.delete(endpoint).await
    }

    async fn pause(&self, duration: Duration, reason: &str) {
        info!("{}", reason);
        if self.confirmed {
            tokio::time::sleep(duration).await;
        }
    }
}
