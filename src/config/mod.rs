//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional via VENTURE_CONFIG)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (VENTURE_* environment overrides)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → converted into RateLimitOptions / RetryPolicy / CacheOptions
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{from_env, load_config, ConfigError};
pub use schema::AppConfig;
pub use schema::StoreConfig;
pub use validation::ValidationError;
