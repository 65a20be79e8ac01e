//! Platform endpoints.
//!
//! Thin handlers over the pipeline: each declares its rate-limit mode,
//! schemas and auth requirement, then does its work through `TableQuery`.

use std::time::Duration;

use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::http::pipeline::{AuthRequirement, Endpoint, RateLimitMode, RequestContext};
use crate::http::server::AppState;
use crate::security::RateLimitOptions;
use crate::store::Filter;
use crate::validation::{FieldSpec, Schema};

pub const STARTUPS: &str = "startups";
pub const INVESTORS: &str = "investors";
pub const MATCHES: &str = "matches";

const DEFAULT_PAGE_SIZE: usize = 20;

/// Stricter quota for match creation.
const MATCH_QUOTA: RateLimitOptions = RateLimitOptions {
    limit: 20,
    window: Duration::from_secs(60),
};

/// An endpoint bound to a method and path.
pub struct Route {
    pub method: Method,
    pub path: &'static str,
    pub endpoint: Endpoint,
}

impl Route {
    fn new(method: Method, path: &'static str, endpoint: Endpoint) -> Self {
        Self {
            method,
            path,
            endpoint,
        }
    }
}

pub fn routes(state: &AppState) -> Vec<Route> {
    vec![
        Route::new(Method::GET, "/health", health()),
        Route::new(Method::GET, "/api/startups", list_startups(state)),
        Route::new(Method::GET, "/api/startups/{id}", get_startup(state)),
        Route::new(Method::POST, "/api/matches", create_match(state)),
        Route::new(Method::GET, "/api/admin/stats", admin_stats(state)),
    ]
}

fn health() -> Endpoint {
    Endpoint::new("health", |_ctx: RequestContext| async move {
        Ok(Json(json!({ "status": "ok" })).into_response())
    })
    .rate_limit(RateLimitMode::Disabled)
}

fn get_startup(state: &AppState) -> Endpoint {
    let startups = state.table(STARTUPS);
    Endpoint::new("get_startup", move |ctx: RequestContext| {
        let startups = startups.clone();
        async move {
            let row = startups.find(ctx.path_param("id")?).await?;
            Ok(Json(row).into_response())
        }
    })
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    sector: Option<String>,
    limit: Option<usize>,
}

fn list_startups(state: &AppState) -> Endpoint {
    let startups = state.table(STARTUPS);
    Endpoint::new("list_startups", move |ctx: RequestContext| {
        let startups = startups.clone();
        async move {
            let query: ListQuery = ctx.query_as()?;
            let mut filter = Filter::new().limit(query.limit.unwrap_or(DEFAULT_PAGE_SIZE));
            if let Some(sector) = query.sector {
                filter = filter.eq("sector", sector);
            }
            let rows = startups.list(filter).await?;
            Ok(Json(json!({ "data": rows, "count": rows.len() })).into_response())
        }
    })
    .query(
        Schema::object()
            .field("sector", FieldSpec::string().min_len(1).max_len(64).optional())
            .field("limit", FieldSpec::integer().min(1).max(100).optional()),
    )
}

#[derive(Debug, Deserialize)]
struct CreateMatch {
    startup_id: String,
    investor_id: String,
    note: Option<String>,
}

fn create_match(state: &AppState) -> Endpoint {
    let startups = state.table(STARTUPS);
    let investors = state.table(INVESTORS);
    let matches = state.table(MATCHES);

    Endpoint::new("create_match", move |ctx: RequestContext| {
        let (startups, investors, matches) = (startups.clone(), investors.clone(), matches.clone());
        async move {
            let request: CreateMatch = ctx.body_as()?;
            let session = ctx.session()?;

            startups.find(&request.startup_id).await?;
            investors.find(&request.investor_id).await?;

            let row = matches
                .insert(json!({
                    "startup_id": request.startup_id,
                    "investor_id": request.investor_id,
                    "note": request.note,
                    "score": match_score(),
                    "created_by": session.user_id,
                }))
                .await?;

            tracing::info!(
                request_id = %ctx.request_id,
                match_id = %row["id"],
                "Match created"
            );
            Ok((StatusCode::CREATED, Json(row)).into_response())
        }
    })
    .rate_limit(RateLimitMode::Custom(MATCH_QUOTA))
    .auth(AuthRequirement::Authenticated)
    .body(
        Schema::object()
            .field("startup_id", FieldSpec::string().min_len(1).max_len(64))
            .field("investor_id", FieldSpec::string().min_len(1).max_len(64))
            .field("note", FieldSpec::string().max_len(500).optional()),
    )
}

/// Placeholder compatibility score until a scoring model is wired in.
fn match_score() -> u8 {
    fastrand::u8(50..=100)
}

fn admin_stats(state: &AppState) -> Endpoint {
    let state = state.clone();
    Endpoint::new("admin_stats", move |_ctx: RequestContext| {
        let state = state.clone();
        async move { Ok(Json(stats(&state)).into_response()) }
    })
    .auth(AuthRequirement::Admin)
}

fn stats(state: &AppState) -> Value {
    let options = state.limiter.options();
    json!({
        "cache_entries": state.executor.cache().len(),
        "active_rate_windows": state.limiter.active_windows(),
        "rate_limit": {
            "limit": options.limit,
            "window_ms": options.window.as_millis() as u64,
        },
    })
}
