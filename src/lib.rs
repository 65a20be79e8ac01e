//! Request-resilience layer for the startup/investor matching API.

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod store;
pub mod validation;

pub use config::schema::AppConfig;
pub use error::{ApiResult, ClassifiedError, ErrorKind};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
