//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID / trace / timeout layers)
//!     → pipeline.rs::dispatch (caller, path params, bounded body)
//!     → RequestPipeline::process (rate limit → validate → auth → handler)
//!     → handlers.rs (endpoint logic over TableQuery)
//!     → Response (handler JSON or error envelope + X-RateLimit-* headers)
//! ```

pub mod handlers;
pub mod pipeline;
pub mod request;
pub mod server;

pub use pipeline::{
    dispatch, AuthRequirement, Endpoint, InboundRequest, RateLimitMode, RequestBody,
    RequestContext, RequestPipeline,
};
pub use request::X_REQUEST_ID;
pub use server::{build_router, AppState, HttpServer};
