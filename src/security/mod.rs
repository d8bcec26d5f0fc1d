//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection:
//!     → rate_limit.rs (per-source daily allowance, durable)
//!     → admitted: hand the stream to the connection handler
//!     → denied: close without reply
//! ```
//!
//! # Design Decisions
//! - Fail closed: a counter that cannot be read or written denies
//! - No trust in client input: sources are only ever identified by IP

pub mod rate_limit;

pub use rate_limit::{Admission, CounterEntry, RateLimitStore};
