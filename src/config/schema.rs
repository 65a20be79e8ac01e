//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the API.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheOptions;
use crate::config::validation::ValidationError;
use crate::resilience::RetryPolicy;
use crate::security::rate_limit::RateLimitOptions;

/// Root configuration for the API server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Per-caller request quota.
    pub rate_limit: RateLimitConfig,

    /// Retry policy for backing-store operations.
    pub retries: RetryConfig,

    /// Query result cache.
    pub cache: CacheConfig,

    /// Backing-store connection.
    pub store: StoreConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Session lookup.
    pub auth: AuthConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

impl TimeoutConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting for endpoints using the default quota.
    pub enabled: bool,

    /// Requests allowed per caller per window.
    pub limit: u32,

    /// Window length in milliseconds.
    pub window_ms: u64,

    /// How often expired windows are swept, in milliseconds. Defaults to
    /// the window length; 0 disables sweeping.
    pub sweep_interval_ms: Option<u64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 100,
            window_ms: 60_000,
            sweep_interval_ms: None,
        }
    }
}

impl RateLimitConfig {
    pub fn options(&self) -> Result<RateLimitOptions, ValidationError> {
        RateLimitOptions::new(self.limit, Duration::from_millis(self.window_ms))
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        match self.sweep_interval_ms.unwrap_or(self.window_ms) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per operation, including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 300,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> Result<RetryPolicy, ValidationError> {
        Ok(
            RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))?
                .with_max_delay(Duration::from_millis(self.max_delay_ms)),
        )
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 60,
        }
    }
}

impl CacheConfig {
    pub fn options(&self) -> CacheOptions {
        CacheOptions {
            default_ttl: Duration::from_secs(self.default_ttl_secs),
        }
    }
}

/// Backing-store connection. An empty `url` selects the in-process store.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL of the PostgREST endpoint.
    pub url: String,

    /// Service key sent as `apikey` and bearer token.
    pub api_key: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            timeout_secs: 10,
        }
    }
}

impl StoreConfig {
    pub fn is_remote(&self) -> bool {
        !self.url.is_empty()
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level or filter directive (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Session lookup configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Header carrying the session token. `authorization` expects `Bearer <token>`.
    pub session_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_header: "authorization".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [rate_limit]
            limit = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.rate_limit.limit, 5);
        assert_eq!(config.rate_limit.window_ms, 60_000);
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert!(!config.store.is_remote());
    }

    #[test]
    fn test_conversions() {
        let config = AppConfig::default();
        let options = config.rate_limit.options().unwrap();
        assert_eq!(options.limit, 100);
        assert_eq!(options.window, Duration::from_secs(60));

        let policy = config.retries.policy().unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(300));

        assert_eq!(config.cache.options().default_ttl, Duration::from_secs(60));
        assert_eq!(
            config.rate_limit.sweep_interval(),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_sweep_interval_follows_window() {
        let mut config: AppConfig = toml::from_str(
            r#"
            [rate_limit]
            window_ms = 5000
            "#,
        )
        .unwrap();
        assert_eq!(
            config.rate_limit.sweep_interval(),
            Some(Duration::from_secs(5))
        );

        config.rate_limit.sweep_interval_ms = Some(250);
        assert_eq!(
            config.rate_limit.sweep_interval(),
            Some(Duration::from_millis(250))
        );

        config.rate_limit.sweep_interval_ms = Some(0);
        assert_eq!(config.rate_limit.sweep_interval(), None);
    }
}
