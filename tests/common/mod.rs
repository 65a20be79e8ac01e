//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use venture_api::config::AppConfig;
use venture_api::http::{build_router, AppState};
use venture_api::security::{Role, TokenSessionStore};
use venture_api::store::MemoryStore;

/// A router over in-memory collaborators, plus handles to drive them.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: MemoryStore,
    pub sessions: TokenSessionStore,
}

impl TestApp {
    pub fn founder_token(&self) -> String {
        self.sessions.issue("founder-1", Role::Founder)
    }

    pub fn admin_token(&self) -> String {
        self.sessions.issue("admin-1", Role::Admin)
    }

    /// Send `request` as if it arrived from `caller` ("ip:port").
    pub async fn send_from(&self, caller: &str, mut request: Request<Body>) -> Response<Body> {
        let addr: SocketAddr = caller.parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.send_from("1.2.3.4:40000", request).await
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(get(uri)).await
    }
}

/// Defaults tuned for tests: fast retries, no sweeper, seeded tables.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.retries.base_delay_ms = 1;
    config.retries.max_delay_ms = 10;
    config.rate_limit.sweep_interval_ms = Some(0);
    config.observability.metrics_enabled = false;
    config
}

pub fn app() -> TestApp {
    app_with(|_| {})
}

pub fn app_with(configure: impl FnOnce(&mut AppConfig)) -> TestApp {
    let mut config = test_config();
    configure(&mut config);

    let store = MemoryStore::new();
    store.seed(
        "startups",
        [
            json!({ "id": "s1", "name": "Acme Robotics", "sector": "robotics" }),
            json!({ "id": "s2", "name": "Ledgerly", "sector": "fintech" }),
            json!({ "id": "s3", "name": "Paywise", "sector": "fintech" }),
        ],
    );
    store.seed("investors", [json!({ "id": "i1", "name": "Northwind Ventures" })]);

    let sessions = TokenSessionStore::default();
    let state = AppState::new(config, Arc::new(store.clone()), Arc::new(sessions.clone())).unwrap();
    let router = build_router(&state);

    TestApp {
        router,
        state,
        store,
        sessions,
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: &Value, token: Option<&str>) -> Request<Body> {
    post_raw(uri, body.to_string(), token)
}

pub fn post_raw(uri: &str, body: impl Into<Body>, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(body.into()).unwrap()
}

pub fn with_bearer(mut request: Request<Body>, token: &str) -> Request<Body> {
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {token}").parse().unwrap(),
    );
    request
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}
