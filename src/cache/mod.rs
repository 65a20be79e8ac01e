//! In-process caching.
//!
//! # Data Flow
//! ```text
//! Handler / QueryExecutor
//!     → memory.rs get (hit: return, expired: evict lazily)
//!     → miss: compute, store with ttl, return
//! ```
//!
//! # Design Decisions
//! - Stores are explicit values injected through AppState, never globals
//! - Expired entries are evicted on read; there is no background sweep
//! - `get_or_set` may compute concurrently on a racing miss;
//!   `get_or_set_shared` joins callers onto one in-flight computation

pub mod memory;

pub use memory::{CacheOptions, MemoryCache};
