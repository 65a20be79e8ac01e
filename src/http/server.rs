//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build shared application state from configuration
//! - Create the Axum Router with one pipeline-backed route per endpoint
//! - Wire up middleware (request ID, tracing)
//! - Serve with connection info and graceful shutdown
//! - Run the rate-limit sweeper for the server's lifetime

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::body::Body;
use axum::http::{HeaderName, Request};
use axum::response::Response;
use axum::routing::{MethodFilter, MethodRouter};
use axum::Router;
use futures_util::future::BoxFuture;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::cache::MemoryCache;
use crate::config::validation::ValidationError;
use crate::config::AppConfig;
use crate::http::handlers;
use crate::http::pipeline::{dispatch, Endpoint, RequestPipeline};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::Shutdown;
use crate::security::{RateLimiter, SessionProvider, TokenSessionStore};
use crate::store::{BackingStore, MemoryStore, QueryExecutor, RestStore, TableQuery};

/// Application state shared by every endpoint.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: RequestPipeline,
    pub limiter: Arc<RateLimiter>,
    pub executor: QueryExecutor,
    pub store: Arc<dyn BackingStore>,
    pub sessions: Arc<dyn SessionProvider>,
}

impl AppState {
    /// State with explicit collaborators.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn BackingStore>,
        sessions: Arc<dyn SessionProvider>,
    ) -> Result<Self, ValidationError> {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.options()?));
        let executor = QueryExecutor::new(
            MemoryCache::new(config.cache.options()),
            config.retries.policy()?,
        );
        let pipeline = RequestPipeline::new(Arc::clone(&limiter), Arc::clone(&sessions))
            .with_default_limit(config.rate_limit.enabled)
            .with_request_timeout(config.timeouts.request_timeout());

        Ok(Self {
            config: Arc::new(config),
            pipeline,
            limiter,
            executor,
            store,
            sessions,
        })
    }

    /// State with collaborators chosen by configuration: the REST store when
    /// `store.url` is set, the in-process store otherwise.
    pub fn from_config(config: AppConfig) -> Result<Self, ValidationError> {
        let store: Arc<dyn BackingStore> = if config.store.is_remote() {
            tracing::info!(url = %config.store.url, "Using REST backing store");
            Arc::new(RestStore::new(&config.store)?)
        } else {
            tracing::warn!("No store.url configured, using in-memory backing store");
            Arc::new(MemoryStore::new())
        };

        let header = HeaderName::try_from(config.auth.session_header.as_str()).map_err(|e| {
            ValidationError::new("auth.session_header", format!("invalid header name: {e}"))
        })?;
        let sessions: Arc<dyn SessionProvider> = Arc::new(TokenSessionStore::new(header));

        Self::new(config, store, sessions)
    }

    /// Table-scoped queries through the shared executor.
    pub fn table(&self, name: &str) -> TableQuery {
        TableQuery::new(self.executor.clone(), Arc::clone(&self.store), name)
    }
}

/// HTTP server for the API.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        let router = build_router(&state);
        Self { router, state }
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let sweeper = self
            .state
            .config
            .rate_limit
            .sweep_interval()
            .map(|interval| self.state.limiter.spawn_sweeper(interval, shutdown.subscribe()));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.signal())
            .await?;

        if let Some(sweeper) = sweeper {
            shutdown.trigger();
            let _ = sweeper.await;
        }
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: &AppState) -> Router {
    let max_body_bytes = state.config.listener.max_body_bytes;
    let mut paths: BTreeMap<&'static str, MethodRouter> = BTreeMap::new();

    for route in handlers::routes(state) {
        let filter = match MethodFilter::try_from(route.method.clone()) {
            Ok(filter) => filter,
            Err(e) => {
                tracing::error!(path = route.path, method = %route.method, error = %e, "Skipping route");
                continue;
            }
        };
        let handler = endpoint_handler(state.pipeline.clone(), route.endpoint, max_body_bytes);
        let method_router = paths.remove(route.path).unwrap_or_default();
        paths.insert(route.path, method_router.on(filter, handler));
    }

    let router = paths
        .into_iter()
        .fold(Router::new(), |router, (path, method_router)| {
            router.route(path, method_router)
        });

    router.layer(
        ServiceBuilder::new()
            .layer(set_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(propagate_request_id_layer()),
    )
}

fn endpoint_handler(
    pipeline: RequestPipeline,
    endpoint: Endpoint,
    max_body_bytes: usize,
) -> impl Fn(Request<Body>) -> BoxFuture<'static, Response> + Clone + Send + Sync + 'static {
    let endpoint = Arc::new(endpoint);
    move |request: Request<Body>| {
        Box::pin(dispatch(
            pipeline.clone(),
            Arc::clone(&endpoint),
            max_body_bytes,
            request,
        ))
    }
}
