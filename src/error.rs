//! Classified errors shared by every layer of the API.
//!
//! # Design Decisions
//! - The taxonomy is closed: eight kinds, each with a fixed HTTP status
//! - Context is carried per variant, only the fields relevant to that kind
//! - Errors are values: constructed at the point of failure, never mutated,
//!   rendered once at the pipeline boundary

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::store::StoreError;

/// Message returned to callers for failures we refuse to describe.
pub const GENERIC_FAILURE_MESSAGE: &str = "An unexpected error occurred";

/// The closed set of error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Auth,
    Database,
    Validation,
    NotFound,
    Server,
    ExternalService,
    RateLimit,
    Unknown,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::Auth,
        ErrorKind::Database,
        ErrorKind::Validation,
        ErrorKind::NotFound,
        ErrorKind::Server,
        ErrorKind::ExternalService,
        ErrorKind::RateLimit,
        ErrorKind::Unknown,
    ];

    /// Wire name used in the `type` field of error envelopes.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Database => "database",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Server => "server",
            ErrorKind::ExternalService => "external-service",
            ErrorKind::RateLimit => "rate-limit",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// HTTP status bound to this kind.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::ExternalService => StatusCode::BAD_GATEWAY,
            ErrorKind::Database | ErrorKind::Server | ErrorKind::Unknown => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an authentication check failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AuthFailure {
    MissingSession,
    InvalidSession,
    InsufficientRole {
        required: String,
        actual: Option<String>,
    },
}

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    /// Dotted path to the offending field, e.g. `body.founders[0].email`.
    pub path: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A typed failure with a fixed kind, message and HTTP status.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifiedError {
    #[error("{message}")]
    Auth { message: String, reason: AuthFailure },

    #[error("{message}")]
    Database {
        message: String,
        /// Logical operation or table, when known.
        operation: Option<String>,
        /// Attempts made before giving up.
        attempts: u32,
        #[source]
        cause: StoreError,
    },

    #[error("{message}")]
    Validation {
        message: String,
        violations: Vec<FieldViolation>,
    },

    #[error("{message}")]
    NotFound {
        message: String,
        resource: Option<String>,
    },

    #[error("{message}")]
    Server { message: String },

    #[error("{message}")]
    ExternalService { message: String, service: String },

    #[error("{message}")]
    RateLimit {
        message: String,
        limit: u32,
        /// Window reset as unix seconds.
        reset_at: u64,
    },

    #[error("{message}")]
    Unknown { message: String },
}

/// Result alias used across the request layer.
pub type ApiResult<T> = Result<T, ClassifiedError>;

impl ClassifiedError {
    pub fn auth(message: impl Into<String>, reason: AuthFailure) -> Self {
        Self::Auth {
            message: message.into(),
            reason,
        }
    }

    pub fn database(message: impl Into<String>, cause: StoreError) -> Self {
        Self::Database {
            message: message.into(),
            operation: None,
            attempts: 1,
            cause,
        }
    }

    pub fn validation(message: impl Into<String>, violations: Vec<FieldViolation>) -> Self {
        Self::Validation {
            message: message.into(),
            violations,
        }
    }

    pub fn not_found(message: impl Into<String>, resource: Option<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            resource,
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    pub fn external_service(message: impl Into<String>, service: impl Into<String>) -> Self {
        Self::ExternalService {
            message: message.into(),
            service: service.into(),
        }
    }

    pub fn rate_limit(message: impl Into<String>, limit: u32, reset_at: u64) -> Self {
        Self::RateLimit {
            message: message.into(),
            limit,
            reset_at,
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    /// Wrap an unclassified failure.
    ///
    /// The original error is logged; the caller only sees a generic message.
    pub fn unexpected<E>(err: E) -> Self
    where
        E: std::error::Error,
    {
        tracing::error!(error = %err, "Unclassified failure wrapped as unknown");
        Self::unknown(GENERIC_FAILURE_MESSAGE)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Database { .. } => ErrorKind::Database,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Server { .. } => ErrorKind::Server,
            Self::ExternalService { .. } => ErrorKind::ExternalService,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.kind().status()
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Auth { message, .. }
            | Self::Database { message, .. }
            | Self::Validation { message, .. }
            | Self::NotFound { message, .. }
            | Self::Server { message }
            | Self::ExternalService { message, .. }
            | Self::RateLimit { message, .. }
            | Self::Unknown { message } => message,
        }
    }

    /// Kind-specific context rendered for the response envelope.
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::Auth { reason, .. } => serde_json::to_value(reason).ok(),
            Self::Database {
                operation,
                attempts,
                ..
            } => {
                // The store's own message stays server-side.
                let mut details = Map::new();
                if let Some(operation) = operation {
                    details.insert("operation".into(), json!(operation));
                }
                details.insert("attempts".into(), json!(attempts));
                Some(Value::Object(details))
            }
            Self::Validation { violations, .. } => Some(json!({ "violations": violations })),
            Self::NotFound { resource, .. } => {
                resource.as_ref().map(|r| json!({ "resource": r }))
            }
            Self::ExternalService { service, .. } => Some(json!({ "service": service })),
            Self::RateLimit {
                limit, reset_at, ..
            } => Some(json!({ "limit": limit, "reset_at": reset_at })),
            Self::Server { .. } | Self::Unknown { .. } => None,
        }
    }
}

/// Wire shape of every error response.
#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    error: &'a str,
    #[serde(rename = "type")]
    kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for ClassifiedError {
    fn into_response(self) -> Response {
        let envelope = ErrorEnvelope {
            error: self.message(),
            kind: self.kind(),
            details: self.details(),
        };
        (self.status(), Json(envelope)).into_response()
    }
}

/// Emit a structured log entry for `error` and hand it back unchanged.
///
/// `extra` is merged into the logged context next to the error's own details.
pub fn log_error(error: ClassifiedError, extra: &[(&str, String)]) -> ClassifiedError {
    let timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;

    let context: Map<String, Value> = extra
        .iter()
        .map(|(k, v)| ((*k).to_string(), Value::String(v.clone())))
        .collect();
    let context = Value::Object(context);
    let details = error.details().unwrap_or(Value::Null);
    let trace = std::error::Error::source(&error).map(|s| s.to_string());
    let status = error.status();

    if status.is_server_error() {
        tracing::error!(
            kind = %error.kind(),
            status = status.as_u16(),
            details = %details,
            context = %context,
            cause = ?trace,
            timestamp_ms,
            "{}",
            error
        );
    } else {
        tracing::warn!(
            kind = %error.kind(),
            status = status.as_u16(),
            details = %details,
            context = %context,
            timestamp_ms,
            "{}",
            error
        );
    }

    error
}
