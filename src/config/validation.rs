//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, windows > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::AppConfig;

/// A single semantic problem with a configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `rate_limit.limit`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be > 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }

    if let Err(e) = config.rate_limit.options() {
        errors.push(e);
    }
    if let Err(e) = config.retries.policy() {
        errors.push(e);
    }
    if config.retries.max_delay_ms < config.retries.base_delay_ms {
        errors.push(ValidationError::new(
            "retries.max_delay_ms",
            "must be >= retries.base_delay_ms",
        ));
    }

    if config.store.is_remote() {
        if Url::parse(&config.store.url).is_err() {
            errors.push(ValidationError::new(
                "store.url",
                format!("'{}' is not a valid URL", config.store.url),
            ));
        }
        if config.store.api_key.is_empty() {
            errors.push(ValidationError::new(
                "store.api_key",
                "required when store.url is set",
            ));
        }
    }
    if config.store.timeout_secs == 0 {
        errors.push(ValidationError::new("store.timeout_secs", "must be > 0"));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }
    if config.auth.session_header.trim().is_empty() {
        errors.push(ValidationError::new("auth.session_header", "must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
