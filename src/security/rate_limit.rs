//! Per-caller fixed-window rate limiting.
//!
//! # Responsibilities
//! - Count requests per caller inside a fixed window
//! - Decide allow/deny atomically per caller
//! - Expose the quota state as `X-RateLimit-*` headers
//! - Sweep expired windows in the background
//!
//! # Design Decisions
//! - Fixed window, not a sliding log: one counter per caller per window
//! - The increment-and-compare runs under the DashMap entry lock for the key
//! - Callers are identified by connection address only; proxy headers are ignored

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::validation::ValidationError;
use crate::error::ClassifiedError;

pub const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Caller identity used when the connection address is unavailable.
pub const UNKNOWN_CALLER: &str = "unknown";

const RATE_LIMIT_MESSAGE: &str = "Too many requests, please try again later";

/// Quota policy: `limit` requests per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitOptions {
    pub limit: u32,
    pub window: Duration,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            limit: 100,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitOptions {
    pub fn new(limit: u32, window: Duration) -> Result<Self, ValidationError> {
        if limit == 0 {
            return Err(ValidationError::new("rate_limit.limit", "must be at least 1"));
        }
        if window.is_zero() {
            return Err(ValidationError::new("rate_limit.window_ms", "must be > 0"));
        }
        Ok(Self { limit, window })
    }
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    reset_at: Instant,
}

/// Outcome of a single `check`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Window end, unix seconds.
    pub reset_at: u64,
    /// Time until the window resets.
    pub retry_after: Duration,
}

impl RateLimitDecision {
    pub fn into_error(self) -> ClassifiedError {
        ClassifiedError::rate_limit(RATE_LIMIT_MESSAGE, self.limit, self.reset_at)
    }

    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(LIMIT_HEADER, HeaderValue::from(self.limit));
        headers.insert(REMAINING_HEADER, HeaderValue::from(self.remaining));
        headers.insert(RESET_HEADER, HeaderValue::from(self.reset_at));
    }
}

/// Shared window store for every rate-limited endpoint.
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    options: RateLimitOptions,
}

impl RateLimiter {
    pub fn new(options: RateLimitOptions) -> Self {
        Self {
            windows: DashMap::new(),
            options,
        }
    }

    pub fn options(&self) -> RateLimitOptions {
        self.options
    }

    /// Count one request from `caller` against the default policy.
    pub fn check(&self, caller: &str) -> RateLimitDecision {
        self.check_key(caller.to_string(), self.options)
    }

    /// Count one request against an endpoint-specific policy.
    ///
    /// Override policies keep their own windows so they never share a
    /// counter with the default policy.
    pub fn check_with(&self, caller: &str, options: RateLimitOptions) -> RateLimitDecision {
        if options == self.options {
            return self.check(caller);
        }
        let key = format!("{}/{}ms:{}", options.limit, options.window.as_millis(), caller);
        self.check_key(key, options)
    }

    fn check_key(&self, key: String, options: RateLimitOptions) -> RateLimitDecision {
        let now = Instant::now();
        let window = {
            let mut entry = self.windows.entry(key).or_insert(RateWindow {
                count: 0,
                reset_at: now + options.window,
            });
            if entry.reset_at <= now {
                *entry = RateWindow {
                    count: 0,
                    reset_at: now + options.window,
                };
            }
            entry.count = entry.count.saturating_add(1);
            *entry
        };

        let retry_after = window.reset_at.saturating_duration_since(now);
        RateLimitDecision {
            allowed: window.count <= options.limit,
            limit: options.limit,
            remaining: options.limit.saturating_sub(window.count),
            reset_at: unix_seconds_after(retry_after),
            retry_after,
        }
    }

    /// Drop windows whose reset time has passed. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, window| window.reset_at > now);
        before.saturating_sub(self.windows.len())
    }

    /// Number of callers with a live or not-yet-swept window.
    pub fn active_windows(&self) -> usize {
        self.windows.len()
    }

    /// Run `sweep` every `interval` until shutdown is broadcast.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!(interval = ?interval, "Rate limit sweeper starting");
            let mut ticker = time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.sweep();
                        if removed > 0 {
                            tracing::debug!(
                                removed,
                                active = limiter.active_windows(),
                                "Swept expired rate limit windows"
                            );
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Rate limit sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }
}

/// Caller identity from the connection address.
pub fn caller_identity(addr: Option<SocketAddr>) -> String {
    addr.map(|a| a.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CALLER.to_string())
}

fn unix_seconds_after(delay: Duration) -> u64 {
    (SystemTime::now() + delay)
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
