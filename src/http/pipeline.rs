//! Per-request composition of rate limiting, validation, auth and the handler.
//!
//! # Data Flow
//! ```text
//! Received
//!     → RateLimited   (RateLimiter::check, headers recorded)
//!     → Validated     (body / query schemas)
//!     → Authenticated (SessionProvider, role check for admin)
//!     → HandlerInvoked (panics caught)
//!     → Responded     (ClassifiedError → {error, type, details?})
//! ```
//!
//! Steps after the rate limit run under the configured request deadline;
//! running out of time is a `server` error like any other.
//!
//! # Design Decisions
//! - A failed step short-circuits; the handler never runs after a rejection
//! - `process` is the only place errors become responses
//! - Rate-limit headers go on every response that was counted, pass or fail

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, FromRequestParts, Path};
use axum::http::{HeaderMap, Method, Request};
use axum::response::{IntoResponse, Response};
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{
    log_error, ApiResult, AuthFailure, ClassifiedError, FieldViolation, GENERIC_FAILURE_MESSAGE,
};
use crate::http::request::request_id;
use crate::observability::metrics;
use crate::security::rate_limit::{caller_identity, RateLimitDecision, RateLimitOptions};
use crate::security::{RateLimiter, Role, Session, SessionProvider};
use crate::validation::{self, Schema, Source};

/// Which quota an endpoint is counted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitMode {
    #[default]
    Default,
    Custom(RateLimitOptions),
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthRequirement {
    #[default]
    Public,
    Authenticated,
    Admin,
}

/// Business logic for one endpoint.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: RequestContext) -> BoxFuture<'static, ApiResult<Response>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult<Response>> + Send + 'static,
{
    fn call(&self, ctx: RequestContext) -> BoxFuture<'static, ApiResult<Response>> {
        self(ctx).boxed()
    }
}

/// One route's policy and handler.
#[derive(Clone)]
pub struct Endpoint {
    name: String,
    rate_limit: RateLimitMode,
    body_schema: Option<Schema>,
    query_schema: Option<Schema>,
    auth: AuthRequirement,
    handler: Arc<dyn Handler>,
}

impl Endpoint {
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<Response>> + Send + 'static,
    {
        Self::with_handler(name, Arc::new(handler))
    }

    /// Build around an already shared handler.
    pub fn with_handler(name: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        Self {
            name: name.into(),
            rate_limit: RateLimitMode::Default,
            body_schema: None,
            query_schema: None,
            auth: AuthRequirement::Public,
            handler,
        }
    }

    pub fn rate_limit(mut self, mode: RateLimitMode) -> Self {
        self.rate_limit = mode;
        self
    }

    pub fn body(mut self, schema: Schema) -> Self {
        self.body_schema = Some(schema);
        self
    }

    pub fn query(mut self, schema: Schema) -> Self {
        self.query_schema = Some(schema);
        self
    }

    pub fn auth(mut self, requirement: AuthRequirement) -> Self {
        self.auth = requirement;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Request body as read off the wire.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Full(Bytes),
    /// The body exceeded the configured limit and was not read.
    TooLarge { limit: usize },
    /// The body stream failed before it ended.
    Unreadable(String),
}

/// Transport-independent view of an inbound request.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub request_id: String,
    pub caller: String,
    pub method: Method,
    pub path_params: HashMap<String, String>,
    pub headers: HeaderMap,
    /// Raw query string, without the leading `?`.
    pub query: String,
    pub body: RequestBody,
}

impl InboundRequest {
    pub fn new(method: Method) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            caller: caller_identity(None),
            method,
            path_params: HashMap::new(),
            headers: HeaderMap::new(),
            query: String::new(),
            body: RequestBody::Full(Bytes::new()),
        }
    }
}

/// What a handler sees once every check has passed.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub caller: String,
    pub method: Method,
    pub path_params: HashMap<String, String>,
    pub headers: HeaderMap,
    /// Validated body, or the raw JSON body when no schema is declared.
    pub body: Option<Value>,
    /// Validated query, or every query parameter when no schema is declared.
    pub query: Value,
    pub session: Option<Session>,
    pub role: Option<Role>,
}

impl RequestContext {
    pub fn path_param(&self, name: &str) -> ApiResult<&str> {
        self.path_params.get(name).map(String::as_str).ok_or_else(|| {
            ClassifiedError::validation(
                format!("Missing path parameter '{name}'"),
                vec![FieldViolation::new(format!("params.{name}"), "is required")],
            )
        })
    }

    pub fn body_as<T: DeserializeOwned>(&self) -> ApiResult<T> {
        let body = self.body.clone().unwrap_or(Value::Null);
        serde_json::from_value(body).map_err(|e| {
            ClassifiedError::validation(
                "Invalid request body",
                vec![FieldViolation::new("body", e.to_string())],
            )
        })
    }

    pub fn query_as<T: DeserializeOwned>(&self) -> ApiResult<T> {
        serde_json::from_value(self.query.clone()).map_err(|e| {
            ClassifiedError::validation(
                "Invalid request query",
                vec![FieldViolation::new("query", e.to_string())],
            )
        })
    }

    pub fn session(&self) -> ApiResult<&Session> {
        self.session.as_ref().ok_or_else(|| {
            ClassifiedError::auth("Authentication required", AuthFailure::MissingSession)
        })
    }
}

/// Runs endpoints through the fixed sequence of checks.
#[derive(Clone)]
pub struct RequestPipeline {
    limiter: Arc<RateLimiter>,
    sessions: Arc<dyn SessionProvider>,
    default_limit_enabled: bool,
    request_timeout: Option<Duration>,
}

impl RequestPipeline {
    pub fn new(limiter: Arc<RateLimiter>, sessions: Arc<dyn SessionProvider>) -> Self {
        Self {
            limiter,
            sessions,
            default_limit_enabled: true,
            request_timeout: None,
        }
    }

    /// Fail requests still running after `timeout` with a `server` error.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Skip endpoints in `RateLimitMode::Default` when disabled.
    pub fn with_default_limit(mut self, enabled: bool) -> Self {
        self.default_limit_enabled = enabled;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub async fn process(&self, endpoint: &Endpoint, request: InboundRequest) -> Response {
        let start = Instant::now();
        let request_id = request.request_id.clone();
        let caller = request.caller.clone();

        let decision = match endpoint.rate_limit {
            RateLimitMode::Default if self.default_limit_enabled => {
                Some(self.limiter.check(&caller))
            }
            RateLimitMode::Custom(options) => Some(self.limiter.check_with(&caller, options)),
            RateLimitMode::Default | RateLimitMode::Disabled => None,
        };

        let outcome = match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(endpoint, request, decision))
                .await
                .unwrap_or_else(|_| {
                    tracing::warn!(
                        endpoint = %endpoint.name,
                        timeout = ?limit,
                        "Request deadline elapsed"
                    );
                    Err(ClassifiedError::server("Request timed out"))
                }),
            None => self.run(endpoint, request, decision).await,
        };

        let mut response = match outcome {
            Ok(response) => response,
            Err(err) => log_error(
                err,
                &[
                    ("endpoint", endpoint.name.clone()),
                    ("request_id", request_id),
                    ("caller", caller),
                ],
            )
            .into_response(),
        };

        if let Some(decision) = decision {
            decision.apply_headers(response.headers_mut());
        }
        metrics::record_request(&endpoint.name, response.status().as_u16(), start);
        response
    }

    async fn run(
        &self,
        endpoint: &Endpoint,
        request: InboundRequest,
        decision: Option<RateLimitDecision>,
    ) -> ApiResult<Response> {
        if let Some(decision) = decision.filter(|d| !d.allowed) {
            metrics::record_rate_limited(&endpoint.name);
            return Err(decision.into_error());
        }

        let (body, query) = validate_input(endpoint, &request)?;
        let (session, role) = self.authenticate(endpoint.auth, &request.headers).await?;

        let ctx = RequestContext {
            request_id: request.request_id,
            caller: request.caller,
            method: request.method,
            path_params: request.path_params,
            headers: request.headers,
            body,
            query,
            session,
            role,
        };

        let handler = Arc::clone(&endpoint.handler);
        match AssertUnwindSafe(async move { handler.call(ctx).await })
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                tracing::error!(
                    endpoint = %endpoint.name,
                    panic = panic_message(panic.as_ref()),
                    "Handler panicked"
                );
                Err(ClassifiedError::unknown(GENERIC_FAILURE_MESSAGE))
            }
        }
    }

    async fn authenticate(
        &self,
        requirement: AuthRequirement,
        headers: &HeaderMap,
    ) -> ApiResult<(Option<Session>, Option<Role>)> {
        if requirement == AuthRequirement::Public {
            return Ok((None, None));
        }

        let session = self.sessions.get_session(headers).await.ok_or_else(|| {
            ClassifiedError::auth("Authentication required", AuthFailure::MissingSession)
        })?;
        let role = self.sessions.get_role(&session.user_id).await;

        if requirement == AuthRequirement::Admin && role != Some(Role::Admin) {
            return Err(ClassifiedError::auth(
                "Admin access required",
                AuthFailure::InsufficientRole {
                    required: Role::Admin.to_string(),
                    actual: role.map(|r| r.to_string()),
                },
            ));
        }
        Ok((Some(session), role))
    }
}

/// Body and query validation. Violations from both sources are reported together.
fn validate_input(
    endpoint: &Endpoint,
    request: &InboundRequest,
) -> ApiResult<(Option<Value>, Value)> {
    let mut violations = Vec::new();

    let body = match (&request.body, &endpoint.body_schema) {
        (RequestBody::TooLarge { limit }, Some(_)) => {
            violations.push(FieldViolation::new(
                "body",
                format!("must be at most {limit} bytes"),
            ));
            None
        }
        (RequestBody::Unreadable(_), Some(_)) => {
            violations.push(FieldViolation::new("body", "could not be read"));
            None
        }
        (RequestBody::TooLarge { .. } | RequestBody::Unreadable(_), None) => None,
        (RequestBody::Full(bytes), Some(schema)) => {
            let parsed = if bytes.is_empty() {
                Ok(Value::Object(Default::default()))
            } else {
                serde_json::from_slice::<Value>(bytes)
            };
            match parsed {
                Ok(value) => collect(
                    validation::validate(schema, &value, Source::Body),
                    &mut violations,
                )?,
                Err(_) => {
                    violations.push(FieldViolation::new("body", "must be valid JSON"));
                    None
                }
            }
        }
        (RequestBody::Full(bytes), None) => serde_json::from_slice(bytes).ok(),
    };

    let raw_query = validation::parse_query(&request.query);
    let query = match &endpoint.query_schema {
        Some(schema) => collect(
            validation::validate(schema, &raw_query, Source::Query),
            &mut violations,
        )?,
        None => Some(raw_query),
    };

    if violations.is_empty() {
        Ok((body, query.unwrap_or(Value::Null)))
    } else {
        Err(ClassifiedError::validation("Invalid request", violations))
    }
}

/// Gather validation violations; any other error ends validation.
fn collect(
    result: ApiResult<Value>,
    violations: &mut Vec<FieldViolation>,
) -> ApiResult<Option<Value>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ClassifiedError::Validation {
            violations: found, ..
        }) => {
            violations.extend(found);
            Ok(None)
        }
        Err(other) => Err(other),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Read at most `limit` bytes of `body`.
async fn read_body(body: Body, limit: usize) -> RequestBody {
    let mut stream = body.into_data_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) if buf.len() + chunk.len() > limit => {
                tracing::debug!(limit, "Request body over limit");
                return RequestBody::TooLarge { limit };
            }
            Ok(chunk) => buf.extend_from_slice(&chunk),
            Err(e) => {
                tracing::debug!(error = %e, "Request body stream failed");
                return RequestBody::Unreadable(e.to_string());
            }
        }
    }
    RequestBody::Full(Bytes::from(buf))
}

/// Adapt an axum request to the pipeline.
pub async fn dispatch(
    pipeline: RequestPipeline,
    endpoint: Arc<Endpoint>,
    max_body_bytes: usize,
    request: Request<Body>,
) -> Response {
    let (mut parts, body) = request.into_parts();

    let caller = caller_identity(
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr),
    );
    let request_id = request_id(&parts.headers).unwrap_or_else(|| Uuid::new_v4().to_string());
    let path_params = Path::<HashMap<String, String>>::from_request_parts(&mut parts, &())
        .await
        .map(|Path(params)| params)
        .unwrap_or_default();

    let span = tracing::info_span!(
        "api_request",
        request_id = %request_id,
        endpoint = %endpoint.name,
        caller = %caller,
    );

    async move {
        let body = read_body(body, max_body_bytes).await;

        let inbound = InboundRequest {
            request_id,
            caller,
            method: parts.method,
            path_params,
            query: parts.uri.query().unwrap_or_default().to_string(),
            headers: parts.headers,
            body,
        };
        pipeline.process(&endpoint, inbound).await
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::security::TokenSessionStore;
    use crate::validation::FieldSpec;
    use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
    use axum::Json;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn pipeline(limit: u32) -> (RequestPipeline, TokenSessionStore) {
        let sessions = TokenSessionStore::default();
        let limiter = RateLimiter::new(RateLimitOptions::new(limit, Duration::from_secs(60)).unwrap());
        (
            RequestPipeline::new(Arc::new(limiter), Arc::new(sessions.clone())),
            sessions,
        )
    }

    fn counting_endpoint(calls: Arc<AtomicU32>) -> Endpoint {
        Endpoint::new("count", move |_ctx: RequestContext| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Json(json!({ "ok": true })).into_response())
            }
        })
    }

    fn from(caller: &str) -> InboundRequest {
        let mut request = InboundRequest::new(Method::GET);
        request.caller = caller.to_string();
        request
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_without_running_handler() {
        let (pipeline, _) = pipeline(3);
        let calls = Arc::new(AtomicU32::new(0));
        let endpoint = counting_endpoint(calls.clone());

        let mut statuses = Vec::new();
        let mut remaining = Vec::new();
        for _ in 0..4 {
            let response = pipeline.process(&endpoint, from("1.2.3.4")).await;
            statuses.push(response.status().as_u16());
            remaining.push(response.headers()["x-ratelimit-remaining"].to_str().unwrap().to_string());
        }

        assert_eq!(statuses, vec![200, 200, 200, 429]);
        assert_eq!(remaining, vec!["2", "1", "0", "0"]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_disabled_limit_sets_no_headers() {
        let (pipeline, _) = pipeline(1);
        let endpoint = counting_endpoint(Arc::new(AtomicU32::new(0))).rate_limit(RateLimitMode::Disabled);
        for _ in 0..3 {
            let response = pipeline.process(&endpoint, from("1.2.3.4")).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert!(!response.headers().contains_key("x-ratelimit-limit"));
        }
    }

    #[tokio::test]
    async fn test_invalid_body_never_reaches_handler() {
        let (pipeline, _) = pipeline(10);
        let calls = Arc::new(AtomicU32::new(0));
        let endpoint = counting_endpoint(calls.clone())
            .body(Schema::object().field("name", FieldSpec::string().min_len(1)));

        let mut request = from("1.2.3.4");
        request.body = RequestBody::Full(Bytes::from_static(b"{\"name\": 5}"));
        let response = pipeline.process(&endpoint, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["type"], "validation");
        assert_eq!(body["details"]["violations"][0]["path"], "body.name");

        let mut request = from("1.2.3.4");
        request.body = RequestBody::Full(Bytes::from_static(b"{not json"));
        let body = body_json(pipeline.process(&endpoint, request).await).await;
        assert_eq!(body["details"]["violations"][0]["path"], "body");

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_validated_body_reaches_handler() {
        let (pipeline, _) = pipeline(10);
        let endpoint = Endpoint::new("echo", |ctx: RequestContext| async move {
            Ok(Json(ctx.body.unwrap_or(Value::Null)).into_response())
        })
        .body(Schema::object().field("name", FieldSpec::string()));

        let mut request = from("1.2.3.4");
        request.body = RequestBody::Full(Bytes::from_static(b"{\"name\":\"Acme\",\"x\":1}"));
        let body = body_json(pipeline.process(&endpoint, request).await).await;
        assert_eq!(body, json!({ "name": "Acme" }));
    }

    #[tokio::test]
    async fn test_auth_and_admin_checks() {
        let (pipeline, sessions) = pipeline(10);
        let founder = sessions.issue("u-1", Role::Founder);
        let admin = sessions.issue("u-2", Role::Admin);
        let endpoint = counting_endpoint(Arc::new(AtomicU32::new(0))).auth(AuthRequirement::Admin);

        let anonymous = pipeline.process(&endpoint, from("1.2.3.4")).await;
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let with_token = |token: &str| {
            let mut request = from("1.2.3.4");
            request.headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
            );
            request
        };

        let forbidden = pipeline.process(&endpoint, with_token(&founder)).await;
        assert_eq!(forbidden.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(forbidden).await;
        assert_eq!(body["details"]["reason"], "insufficient_role");

        let allowed = pipeline.process(&endpoint, with_token(&admin)).await;
        assert_eq!(allowed.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_generic_500() {
        let (pipeline, _) = pipeline(10);
        let endpoint = Endpoint::new("boom", |_ctx: RequestContext| async move {
            if true {
                panic!("secret internal detail");
            }
            Ok(StatusCode::OK.into_response())
        });

        let response = pipeline.process(&endpoint, from("1.2.3.4")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["type"], "unknown");
        assert_eq!(body["error"], GENERIC_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn test_handler_error_keeps_kind() {
        let (pipeline, _) = pipeline(10);
        let endpoint = Endpoint::new("missing", |_ctx: RequestContext| async move {
            Err::<Response, _>(ClassifiedError::not_found("Startup not found", None))
        });

        let response = pipeline.process(&endpoint, from("1.2.3.4")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key("x-ratelimit-remaining"));
        let body = body_json(response).await;
        assert_eq!(body, json!({ "error": "Startup not found", "type": ErrorKind::NotFound.as_str() }));
    }

    #[tokio::test]
    async fn test_oversized_body_is_validation_error() {
        let (pipeline, _) = pipeline(10);
        let calls = Arc::new(AtomicU32::new(0));
        let endpoint = counting_endpoint(calls.clone())
            .body(Schema::object().field("name", FieldSpec::string()));

        let mut request = from("1.2.3.4");
        request.body = RequestBody::TooLarge { limit: 16 };
        let response = pipeline.process(&endpoint, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["details"]["violations"][0]["message"], "must be at most 16 bytes");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_body_without_schema_is_ignored() {
        let (pipeline, _) = pipeline(10);
        let endpoint = counting_endpoint(Arc::new(AtomicU32::new(0)));

        let mut request = from("1.2.3.4");
        request.body = RequestBody::TooLarge { limit: 16 };
        assert_eq!(pipeline.process(&endpoint, request).await.status(), StatusCode::OK);

        let mut request = from("1.2.3.4");
        request.body = RequestBody::Unreadable("connection reset".into());
        assert_eq!(pipeline.process(&endpoint, request).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_read_body_distinguishes_overflow() {
        let small = read_body(Body::from("{\"a\":1}"), 64).await;
        assert!(matches!(small, RequestBody::Full(bytes) if bytes.len() == 7));

        let large = read_body(Body::from(vec![b'x'; 65]), 64).await;
        assert!(matches!(large, RequestBody::TooLarge { limit: 64 }));
    }

    #[tokio::test]
    async fn test_rate_limit_checked_before_validation() {
        let (pipeline, _) = pipeline(1);
        let calls = Arc::new(AtomicU32::new(0));
        let endpoint = counting_endpoint(calls.clone())
            .body(Schema::object().field("name", FieldSpec::string()));

        let mut request = from("1.2.3.4");
        request.body = RequestBody::Full(Bytes::from_static(b"{\"name\":\"Acme\"}"));
        assert_eq!(pipeline.process(&endpoint, request).await.status(), StatusCode::OK);

        let mut request = from("1.2.3.4");
        request.body = RequestBody::Full(Bytes::from_static(b"{not json"));
        let response = pipeline.process(&endpoint, request).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_json(response).await["type"], "rate-limit");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_every_kind_maps_to_its_status() {
        let (pipeline, _) = pipeline(100);
        let cases = [
            (ClassifiedError::auth("no session", AuthFailure::MissingSession), 401, "auth"),
            (
                ClassifiedError::database("query failed", crate::store::StoreError::new("reset")),
                500,
                "database",
            ),
            (
                ClassifiedError::validation("bad", vec![FieldViolation::new("body.name", "is required")]),
                400,
                "validation",
            ),
            (ClassifiedError::not_found("missing", None), 404, "not-found"),
            (ClassifiedError::server("boom"), 500, "server"),
            (
                ClassifiedError::external_service("mail down", "mailer"),
                502,
                "external-service",
            ),
            (ClassifiedError::rate_limit("slow down", 3, 1_700_000_000), 429, "rate-limit"),
            (ClassifiedError::unknown("???"), 500, "unknown"),
        ];

        for (error, status, kind) in cases {
            let endpoint = Endpoint::new(kind, move |_ctx: RequestContext| {
                let error = error.clone();
                async move { Err::<Response, _>(error) }
            });
            let response = pipeline.process(&endpoint, from("1.2.3.4")).await;
            assert_eq!(response.status().as_u16(), status, "{kind}");
            assert_eq!(body_json(response).await["type"], kind);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_deadline_becomes_server_error() {
        let (pipeline, _) = pipeline(10);
        let pipeline = pipeline.with_request_timeout(Duration::from_secs(1));
        let endpoint = Endpoint::new("slow", |_ctx: RequestContext| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(StatusCode::OK.into_response())
        });

        let response = pipeline.process(&endpoint, from("1.2.3.4")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "9");
        let body = body_json(response).await;
        assert_eq!(body, json!({ "error": "Request timed out", "type": "server" }));
    }
}
