//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Backing-store call (store/executor.rs):
//!     → attempt operation
//!     → On transient failure: retries.rs (attempt budget left?)
//!     → backoff.rs (base × 2^i, capped) → sleep → next attempt
//! ```
//!
//! # Design Decisions
//! - Only store faults are retried; absence, validation and auth are final
//! - Delays are applied between attempts, never after the last one
//! - Policies are plain values, validated when built

pub mod backoff;
pub mod retries;

pub use retries::RetryPolicy;
