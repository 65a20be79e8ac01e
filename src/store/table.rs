//! Table-scoped query helpers.

use std::sync::Arc;

use serde_json::Value;

use crate::error::ApiResult;
use crate::resilience::RetryPolicy;
use crate::store::{BackingStore, Filter, QueryExecutor, QueryOptions, Row};

/// Binds an executor and a store to one table.
///
/// Reads go through the executor's retry policy; `find` is cached per row.
/// Inserts run once (they are not idempotent); update and delete retry and
/// invalidate the row's cache entry.
#[derive(Clone)]
pub struct TableQuery {
    executor: QueryExecutor,
    store: Arc<dyn BackingStore>,
    table: String,
}

impl TableQuery {
    pub fn new(executor: QueryExecutor, store: Arc<dyn BackingStore>, table: impl Into<String>) -> Self {
        Self {
            executor,
            store,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Cache key for a single row.
    pub fn row_key(&self, id: &str) -> String {
        format!("{}:{}", self.table, id)
    }

    pub async fn find(&self, id: &str) -> ApiResult<Row> {
        let store = self.store.clone();
        let table = self.table.clone();
        let row_id = id.to_string();
        let options = QueryOptions::new()
            .cached(self.row_key(id))
            .label(format!("select {}", self.table));

        self.executor
            .execute_shared(
                move || {
                    let store = store.clone();
                    let table = table.clone();
                    let row_id = row_id.clone();
                    async move { Ok(store.select_one(&table, &row_id).await) }
                },
                &format!("{} {} not found", singular(&self.table), id),
                options,
            )
            .await
    }

    pub async fn list(&self, filter: Filter) -> ApiResult<Vec<Row>> {
        let store = self.store.clone();
        let table = self.table.clone();

        self.executor
            .execute(
                move || {
                    let store = store.clone();
                    let table = table.clone();
                    let filter = filter.clone();
                    async move { Ok(store.select(&table, &filter).await) }
                },
                &format!("Failed to list {}", self.table),
                QueryOptions::new().label(format!("select {}", self.table)),
            )
            .await
    }

    pub async fn insert(&self, row: Row) -> ApiResult<Row> {
        let store = self.store.clone();
        let table = self.table.clone();

        self.executor
            .execute(
                move || {
                    let store = store.clone();
                    let table = table.clone();
                    let row = row.clone();
                    async move { Ok(store.insert(&table, row).await) }
                },
                &format!("Failed to create {}", singular(&self.table)),
                QueryOptions::new()
                    .retry(RetryPolicy::once())
                    .label(format!("insert {}", self.table)),
            )
            .await
    }

    pub async fn update(&self, id: &str, patch: Value) -> ApiResult<Row> {
        let store = self.store.clone();
        let table = self.table.clone();
        let row_id = id.to_string();

        let row = self
            .executor
            .execute(
                move || {
                    let store = store.clone();
                    let table = table.clone();
                    let row_id = row_id.clone();
                    let patch = patch.clone();
                    async move { Ok(store.update(&table, &row_id, patch).await) }
                },
                &format!("{} {} not found", singular(&self.table), id),
                QueryOptions::new().label(format!("update {}", self.table)),
            )
            .await?;
        self.executor.cache().delete(&self.row_key(id));
        Ok(row)
    }

    pub async fn delete(&self, id: &str) -> ApiResult<Row> {
        let store = self.store.clone();
        let table = self.table.clone();
        let row_id = id.to_string();

        let row = self
            .executor
            .execute(
                move || {
                    let store = store.clone();
                    let table = table.clone();
                    let row_id = row_id.clone();
                    async move { Ok(store.delete(&table, &row_id).await) }
                },
                &format!("{} {} not found", singular(&self.table), id),
                QueryOptions::new().label(format!("delete {}", self.table)),
            )
            .await?;
        self.executor.cache().delete(&self.row_key(id));
        Ok(row)
    }
}

/// "startups" → "Startup", for messages.
fn singular(table: &str) -> String {
    let stem = table.strip_suffix('s').unwrap_or(table);
    let mut chars = stem.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheOptions, MemoryCache};
    use crate::error::ErrorKind;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::time::Duration;

    fn table(store: &MemoryStore) -> TableQuery {
        let executor = QueryExecutor::new(
            MemoryCache::new(CacheOptions::default()),
            RetryPolicy::new(3, Duration::from_millis(1)).unwrap(),
        );
        TableQuery::new(executor, Arc::new(store.clone()), "startups")
    }

    #[tokio::test]
    async fn test_find_is_cached_until_update() {
        let store = MemoryStore::new();
        store.seed("startups", [json!({ "id": "s1", "name": "Acme" })]);
        let startups = table(&store);

        assert_eq!(startups.find("s1").await.unwrap()["name"], "Acme");
        // A failing store is never consulted while the row is cached.
        store.fail_next(10);
        assert_eq!(startups.find("s1").await.unwrap()["name"], "Acme");
        store.fail_next(0);

        startups.update("s1", json!({ "name": "Acme Labs" })).await.unwrap();
        assert_eq!(startups.find("s1").await.unwrap()["name"], "Acme Labs");
    }

    #[tokio::test]
    async fn test_find_missing_row() {
        let store = MemoryStore::new();
        let err = table(&store).find("nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.message(), "Startup nope not found");
    }

    #[tokio::test]
    async fn test_insert_is_not_retried() {
        let store = MemoryStore::new();
        store.fail_next(1);
        let err = table(&store)
            .insert(json!({ "name": "Acme" }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Database);
        assert_eq!(store.count("startups"), 0);
    }

    #[test]
    fn test_singular() {
        assert_eq!(singular("startups"), "Startup");
        assert_eq!(singular("investor"), "Investor");
        assert_eq!(singular(""), "");
    }
}
