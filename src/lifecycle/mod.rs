//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → HTTP server stops accepting and drains
//!             → rate-limit sweeper exits its loop
//! ```
//!
//! # Design Decisions
//! - One broadcast coordinator shared by every long-running task
//! - Ordered shutdown: stop accept, drain, stop background tasks

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{spawn_signal_listener, wait_for_signal};
