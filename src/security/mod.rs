//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (inside the pipeline):
//!     → rate_limit.rs (per-caller quota, X-RateLimit-* headers)
//!     → session.rs (session and role lookup for protected endpoints)
//! ```
//!
//! # Design Decisions
//! - Fail closed: a missing or unknown session is rejected
//! - No trust in client input: the caller is the connection address

pub mod rate_limit;
pub mod session;

pub use rate_limit::{RateLimitDecision, RateLimitOptions, RateLimiter};
pub use session::{Role, Session, SessionProvider, TokenSessionStore};
