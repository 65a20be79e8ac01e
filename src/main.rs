//! venture-api server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (request id, trace, timeout)
//!                         │
//!                         ▼
//!                     http::pipeline
//!                     ┌──────────────────────────────────────────────┐
//!                     │ security::rate_limit → validation →          │
//!                     │ security::session → handler (panic-safe)     │
//!                     └──────────────────┬───────────────────────────┘
//!                                        │ TableQuery
//!                                        ▼
//!                     store::executor (cache-aside, retries, backoff)
//!                                        │
//!                                        ▼
//!                     BackingStore (PostgREST | in-memory)
//!
//!     Cross-cutting: config, error taxonomy, observability, lifecycle
//! ```

use tokio::net::TcpListener;
use venture_api::config;
use venture_api::http::{AppState, HttpServer};
use venture_api::lifecycle::{spawn_signal_listener, Shutdown};
use venture_api::observability::{logging, metrics};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::from_env()?;
    logging::init(&config.observability)?;

    tracing::info!("venture-api v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        rate_limit = config.rate_limit.limit,
        rate_window_ms = config.rate_limit.window_ms,
        retry_attempts = config.retries.max_attempts,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let state = AppState::from_config(config)?;
    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    HttpServer::new(state).run(listener, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
