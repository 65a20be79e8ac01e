//! In-process backing store for development and tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use crate::store::{BackingStore, Filter, Row, StoreError, StoreResponse};

/// Tables of JSON rows keyed by `id`.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<DashMap<String, BTreeMap<String, Row>>>,
    /// Number of upcoming operations that will report an injected error.
    pending_failures: Arc<AtomicU32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` operations report a store error.
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Insert rows directly, bypassing failure injection.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        let mut entries = self.tables.entry(table.to_string()).or_default();
        for row in rows {
            if let Some(id) = row_id(&row) {
                entries.insert(id, row);
            }
        }
    }

    pub fn count(&self, table: &str) -> usize {
        self.tables.get(table).map(|t| t.len()).unwrap_or(0)
    }

    fn injected_failure(&self) -> Option<StoreError> {
        let taken = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        taken
            .ok()
            .map(|_| StoreError::new("injected store failure").with_code("unavailable"))
    }
}

fn row_id(row: &Row) -> Option<String> {
    match row.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn select(&self, table: &str, filter: &Filter) -> StoreResponse<Vec<Row>> {
        if let Some(err) = self.injected_failure() {
            return StoreResponse::failed(err);
        }
        let rows: Vec<Row> = match self.tables.get(table) {
            Some(entries) => entries
                .values()
                .filter(|row| filter.matches(row))
                .take(filter.limit.unwrap_or(usize::MAX))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        StoreResponse::ok(rows)
    }

    async fn select_one(&self, table: &str, id: &str) -> StoreResponse<Row> {
        if let Some(err) = self.injected_failure() {
            return StoreResponse::failed(err);
        }
        match self.tables.get(table).and_then(|t| t.get(id).cloned()) {
            Some(row) => StoreResponse::ok(row),
            None => StoreResponse::empty(),
        }
    }

    async fn insert(&self, table: &str, mut row: Row) -> StoreResponse<Row> {
        if let Some(err) = self.injected_failure() {
            return StoreResponse::failed(err);
        }
        if !row.is_object() {
            return StoreResponse::failed(StoreError::new("row must be an object").with_code("22023"));
        }
        let id = match row_id(&row) {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                if let Some(object) = row.as_object_mut() {
                    object.insert("id".into(), Value::String(id.clone()));
                }
                id
            }
        };

        let mut entries = self.tables.entry(table.to_string()).or_default();
        if entries.contains_key(&id) {
            return StoreResponse::failed(
                StoreError::new(format!("duplicate key value for id {id}")).with_code("23505"),
            );
        }
        entries.insert(id, row.clone());
        StoreResponse::ok(row)
    }

    async fn update(&self, table: &str, id: &str, patch: Row) -> StoreResponse<Row> {
        if let Some(err) = self.injected_failure() {
            return StoreResponse::failed(err);
        }
        let Some(mut entries) = self.tables.get_mut(table) else {
            return StoreResponse::empty();
        };
        let Some(row) = entries.get_mut(id) else {
            return StoreResponse::empty();
        };
        if let (Some(target), Value::Object(changes)) = (row.as_object_mut(), patch) {
            for (k, v) in changes {
                if k != "id" {
                    target.insert(k, v);
                }
            }
        }
        StoreResponse::ok(row.clone())
    }

    async fn delete(&self, table: &str, id: &str) -> StoreResponse<Row> {
        if let Some(err) = self.injected_failure() {
            return StoreResponse::failed(err);
        }
        match self.tables.get_mut(table).and_then(|mut t| t.remove(id)) {
            Some(row) => StoreResponse::ok(row),
            None => StoreResponse::empty(),
        }
    }
}
