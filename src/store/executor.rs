//! Query execution with retries, backoff and cache-aside.
//!
//! # Responsibilities
//! - Retry transient store faults with exponential backoff
//! - Turn "succeeded, nothing found" into a not-found error without retrying
//! - Pass nested classified errors through untouched
//! - Serve and populate cached results when a cache key is given

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::cache::MemoryCache;
use crate::error::{ApiResult, ClassifiedError, ErrorKind};
use crate::observability::metrics;
use crate::resilience::RetryPolicy;
use crate::store::{OperationError, StoreError, StoreResponse};

/// Per-call overrides. Unset fields use the executor's defaults.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Enables cache-aside under this key.
    pub cache_key: Option<String>,
    pub cache_ttl: Option<Duration>,
    pub retry: Option<RetryPolicy>,
    /// Operation name carried into logs and database errors.
    pub label: Option<String>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Runs backing-store operations on behalf of handlers.
#[derive(Clone)]
pub struct QueryExecutor {
    cache: MemoryCache<Value>,
    default_retry: RetryPolicy,
}

impl QueryExecutor {
    pub fn new(cache: MemoryCache<Value>, default_retry: RetryPolicy) -> Self {
        Self {
            cache,
            default_retry,
        }
    }

    pub fn cache(&self) -> &MemoryCache<Value> {
        &self.cache
    }

    pub fn default_retry(&self) -> RetryPolicy {
        self.default_retry
    }

    /// Execute `operation`, retrying transient faults.
    ///
    /// With `options.cache_key` set, a live cached result is returned without
    /// touching the store, and a fresh success is cached for `cache_ttl`.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: F,
        error_message: &str,
        options: QueryOptions,
    ) -> ApiResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<StoreResponse<T>, OperationError>>,
    {
        let policy = options.retry.unwrap_or(self.default_retry);
        let label = options.label.as_deref();

        let Some(key) = options.cache_key.as_deref() else {
            return self.run_with_retries(operation, error_message, &policy, label).await;
        };

        let ttl = options.cache_ttl.unwrap_or(self.cache.options().default_ttl);
        let cached = self
            .cache
            .get_or_set(
                key,
                || async move {
                    let result = self
                        .run_with_retries(operation, error_message, &policy, label)
                        .await?;
                    serde_json::to_value(&result).map_err(ClassifiedError::unexpected)
                },
                Some(ttl),
            )
            .await?;

        serde_json::from_value(cached).map_err(ClassifiedError::unexpected)
    }

    /// Like [`execute`](Self::execute), but concurrent cache misses on the
    /// same key share one run of `operation`.
    pub async fn execute_shared<T, F, Fut>(
        &self,
        operation: F,
        error_message: &str,
        options: QueryOptions,
    ) -> ApiResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<StoreResponse<T>, OperationError>> + Send,
    {
        let Some(key) = options.cache_key.clone() else {
            return self.execute(operation, error_message, options).await;
        };

        let policy = options.retry.unwrap_or(self.default_retry);
        let ttl = options.cache_ttl.unwrap_or(self.cache.options().default_ttl);
        let executor = self.clone();
        let message = error_message.to_string();
        let label = options.label;

        let cached = self
            .cache
            .get_or_set_shared(
                &key,
                move || async move {
                    let result = executor
                        .run_with_retries(operation, &message, &policy, label.as_deref())
                        .await?;
                    serde_json::to_value(&result).map_err(ClassifiedError::unexpected)
                },
                Some(ttl),
            )
            .await?;

        serde_json::from_value(cached).map_err(ClassifiedError::unexpected)
    }

    /// The retry loop on its own, for results that are never cached.
    pub async fn run_with_retries<T, F, Fut>(
        &self,
        mut operation: F,
        error_message: &str,
        policy: &RetryPolicy,
        label: Option<&str>,
    ) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<StoreResponse<T>, OperationError>>,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut last_error = StoreError::new("operation was not attempted");

        for attempt in 0..max_attempts {
            match operation().await {
                Err(OperationError::Classified(err)) => return Err(err),
                Err(OperationError::Failed(message)) => {
                    last_error = StoreError::new(message);
                }
                Ok(StoreResponse {
                    error: Some(err), ..
                }) => {
                    last_error = err;
                }
                Ok(StoreResponse {
                    data: Some(data),
                    error: None,
                }) => return Ok(data),
                Ok(StoreResponse {
                    data: None,
                    error: None,
                }) => {
                    metrics::record_query_failure(ErrorKind::NotFound);
                    return Err(ClassifiedError::not_found(
                        error_message,
                        label.map(str::to_string),
                    ));
                }
            }

            let attempts_made = attempt + 1;
            if attempts_made < max_attempts {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    operation = label.unwrap_or("query"),
                    attempt = attempts_made,
                    max_attempts,
                    delay = ?delay,
                    error = %last_error,
                    "Store operation failed, retrying"
                );
                metrics::record_query_retry();
                tokio::time::sleep(delay).await;
            }
        }

        tracing::error!(
            operation = label.unwrap_or("query"),
            attempts = max_attempts,
            error = %last_error,
            "Store operation failed, attempts exhausted"
        );
        metrics::record_query_failure(ErrorKind::Database);
        Err(ClassifiedError::Database {
            message: error_message.to_string(),
            operation: label.map(str::to_string),
            attempts: max_attempts,
            cause: last_error,
        })
    }
}
