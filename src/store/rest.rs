//! PostgREST-style HTTP adapter for the hosted backing store.
//!
//! # Responsibilities
//! - Translate table operations into REST calls (`/rest/v1/{table}`)
//! - Report transport failures and non-success statuses as `StoreError`s
//! - Report an empty single-row result as "nothing found"

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::config::StoreConfig;
use crate::config::validation::ValidationError;
use crate::store::{BackingStore, Filter, Row, StoreError, StoreResponse};

/// Client for a PostgREST-compatible endpoint.
#[derive(Clone)]
pub struct RestStore {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

/// Error body returned by PostgREST.
#[derive(Debug, Deserialize)]
struct RestErrorBody {
    message: Option<String>,
    code: Option<String>,
}

impl RestStore {
    pub fn new(config: &StoreConfig) -> Result<Self, ValidationError> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| ValidationError::new("store.url", format!("invalid URL: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ValidationError::new("store", format!("cannot build client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    fn table_url(&self, table: &str) -> Result<Url, StoreError> {
        let raw = format!(
            "{}/rest/v1/{}",
            self.base_url.as_str().trim_end_matches('/'),
            table
        );
        Url::parse(&raw).map_err(|e| StoreError::new(format!("invalid table URL: {e}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=representation")
    }

    fn by_id(&self, table: &str, id: &str) -> Result<Url, StoreError> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{id}"));
        Ok(url)
    }

    async fn rows(&self, builder: RequestBuilder) -> StoreResponse<Vec<Row>> {
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, "Store request failed");
                return StoreResponse::failed(StoreError::new(e.to_string()).with_code("transport"));
            }
        };
        if !response.status().is_success() {
            return StoreResponse::failed(error_from(response).await);
        }
        match response.json::<Vec<Row>>().await {
            Ok(rows) => StoreResponse::ok(rows),
            Err(e) => StoreResponse::failed(StoreError::new(e.to_string()).with_code("decode")),
        }
    }

    async fn first_row(&self, builder: RequestBuilder) -> StoreResponse<Row> {
        let response = self.rows(builder).await;
        match (response.error, response.data) {
            (Some(err), _) => StoreResponse::failed(err),
            (None, Some(rows)) => match rows.into_iter().next() {
                Some(row) => StoreResponse::ok(row),
                None => StoreResponse::empty(),
            },
            (None, None) => StoreResponse::empty(),
        }
    }
}

async fn error_from(response: Response) -> StoreError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<RestErrorBody>(&text) {
        Ok(RestErrorBody {
            message: Some(message),
            code,
        }) => StoreError {
            message,
            code: code.or_else(|| Some(status.as_u16().to_string())),
        },
        _ => StoreError::new(format!("store returned {status}"))
            .with_code(status.as_u16().to_string()),
    }
}

fn filter_literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl BackingStore for RestStore {
    async fn select(&self, table: &str, filter: &Filter) -> StoreResponse<Vec<Row>> {
        let mut url = match self.table_url(table) {
            Ok(url) => url,
            Err(e) => return StoreResponse::failed(e),
        };
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("select", "*");
            for (column, value) in &filter.equals {
                query.append_pair(column, &format!("eq.{}", filter_literal(value)));
            }
            if let Some(limit) = filter.limit {
                query.append_pair("limit", &limit.to_string());
            }
        }
        self.rows(self.request(Method::GET, url)).await
    }

    async fn select_one(&self, table: &str, id: &str) -> StoreResponse<Row> {
        match self.by_id(table, id) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("limit", "1");
                self.first_row(self.request(Method::GET, url)).await
            }
            Err(e) => StoreResponse::failed(e),
        }
    }

    async fn insert(&self, table: &str, row: Row) -> StoreResponse<Row> {
        match self.table_url(table) {
            Ok(url) => self.first_row(self.request(Method::POST, url).json(&row)).await,
            Err(e) => StoreResponse::failed(e),
        }
    }

    async fn update(&self, table: &str, id: &str, patch: Row) -> StoreResponse<Row> {
        match self.by_id(table, id) {
            Ok(url) => self.first_row(self.request(Method::PATCH, url).json(&patch)).await,
            Err(e) => StoreResponse::failed(e),
        }
    }

    async fn delete(&self, table: &str, id: &str) -> StoreResponse<Row> {
        match self.by_id(table, id) {
            Ok(url) => self.first_row(self.request(Method::DELETE, url)).await,
            Err(e) => StoreResponse::failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Query,
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::get,
        Json, Router,
    };
    use serde_json::json;
    use std::collections::HashMap;

    /// Minimal PostgREST lookalike serving one `startups` row.
    async fn start_mock_store() -> String {
        async fn startups(
            headers: HeaderMap,
            Query(params): Query<HashMap<String, String>>,
        ) -> axum::response::Response {
            if headers.get("apikey").and_then(|v| v.to_str().ok()) != Some("test-key") {
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "message": "bad key", "code": "PGRST301" })),
                )
                    .into_response();
            }
            match params.get("id").map(String::as_str) {
                Some("eq.1") | None => {
                    Json(json!([{ "id": "1", "name": "Acme" }])).into_response()
                }
                Some(_) => Json(json!([])).into_response(),
            }
        }

        let app = Router::new().route("/rest/v1/startups", get(startups));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    fn config(url: String, key: &str) -> StoreConfig {
        StoreConfig {
            url,
            api_key: key.to_string(),
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_select_one_found_and_missing() {
        let url = start_mock_store().await;
        let store = RestStore::new(&config(url, "test-key")).unwrap();

        let found = store.select_one("startups", "1").await;
        assert_eq!(found.data.unwrap()["name"], "Acme");

        let missing = store.select_one("startups", "2").await;
        assert!(missing.data.is_none());
        assert!(missing.error.is_none());
    }

    #[tokio::test]
    async fn test_error_status_becomes_store_error() {
        let url = start_mock_store().await;
        let store = RestStore::new(&config(url, "wrong")).unwrap();

        let response = store.select("startups", &Filter::new()).await;
        let err = response.error.unwrap();
        assert_eq!(err.message, "bad key");
        assert_eq!(err.code.as_deref(), Some("PGRST301"));
    }

    #[tokio::test]
    async fn test_transport_failure_becomes_store_error() {
        let store = RestStore::new(&config("http://127.0.0.1:9".to_string(), "k")).unwrap();
        let response = store.select_one("startups", "1").await;
        assert_eq!(response.error.unwrap().code.as_deref(), Some("transport"));
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(RestStore::new(&config("not a url".to_string(), "k")).is_err());
    }
}
