//! Backing-store access.
//!
//! # Data Flow
//! ```text
//! Handler
//!     → table.rs (table-scoped helpers)
//!     → executor.rs (cache-aside, retries, not-found detection)
//!     → BackingStore adapter (memory.rs | rest.rs)
//!     → StoreResponse { data, error }
//! ```
//!
//! # Design Decisions
//! - The store is a collaborator behind a trait; the schema is not ours
//! - A reported `error` is a transient fault, `data: None` means "not found"
//! - Rows are JSON objects keyed by their `id` field

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::ClassifiedError;

pub mod executor;
pub mod memory;
pub mod rest;
pub mod table;

pub use executor::{QueryExecutor, QueryOptions};
pub use memory::MemoryStore;
pub use rest::RestStore;
pub use table::TableQuery;

/// A stored row.
pub type Row = Value;

/// Error reported by the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct StoreError {
    pub message: String,
    /// Store-specific error code, when provided.
    #[serde(default)]
    pub code: Option<String>,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// The store's `{data, error}` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreResponse<T> {
    pub data: Option<T>,
    pub error: Option<StoreError>,
}

impl<T> StoreResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    /// Success with nothing found.
    pub fn empty() -> Self {
        Self {
            data: None,
            error: None,
        }
    }

    pub fn failed(error: StoreError) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> StoreResponse<U> {
        StoreResponse {
            data: self.data.map(f),
            error: self.error,
        }
    }
}

/// Failure raised by an operation itself rather than reported by the store.
#[derive(Debug, Clone)]
pub enum OperationError {
    /// A classified failure from a nested call; never retried or re-wrapped.
    Classified(ClassifiedError),
    /// Any other fault; retried like a reported store error.
    Failed(String),
}

impl OperationError {
    pub fn failed(err: impl std::fmt::Display) -> Self {
        Self::Failed(err.to_string())
    }
}

impl From<ClassifiedError> for OperationError {
    fn from(err: ClassifiedError) -> Self {
        Self::Classified(err)
    }
}

/// Equality filter for `select`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub equals: Vec<(String, Value)>,
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.push((column.into(), value.into()));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `row` satisfies every equality condition.
    pub fn matches(&self, row: &Row) -> bool {
        self.equals
            .iter()
            .all(|(column, expected)| row.get(column) == Some(expected))
    }
}

/// Per-table CRUD operations exposed by the backing store.
#[async_trait]
pub trait BackingStore: Send + Sync {
    async fn select(&self, table: &str, filter: &Filter) -> StoreResponse<Vec<Row>>;

    async fn select_one(&self, table: &str, id: &str) -> StoreResponse<Row>;

    async fn insert(&self, table: &str, row: Row) -> StoreResponse<Row>;

    async fn update(&self, table: &str, id: &str, patch: Row) -> StoreResponse<Row>;

    async fn delete(&self, table: &str, id: &str) -> StoreResponse<Row>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matches() {
        let row = json!({ "id": "1", "sector": "fintech", "stage": "seed" });
        assert!(Filter::new().eq("sector", "fintech").matches(&row));
        assert!(!Filter::new().eq("sector", "biotech").matches(&row));
        assert!(Filter::new().matches(&row));
    }

    #[test]
    fn test_response_map() {
        let response = StoreResponse::ok(2).map(|n| n * 21);
        assert_eq!(response.data, Some(42));
        let failed: StoreResponse<u32> = StoreResponse::failed(StoreError::new("x"));
        assert!(failed.map(|n| n + 1).error.is_some());
    }
}
