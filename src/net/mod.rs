//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bounded accept, connection limits)
//!     → server.rs (accept loop, one task per connection)
//!     → connection.rs (rate check → read → decode → interpret →
//!                      persist → forward → reply → close)
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion; a limit of one
//!   processes connections strictly in order
//! - Each connection tracked for graceful shutdown
//! - The sender only ever sees `OK` or an abrupt close

pub mod connection;
pub mod listener;
pub mod server;

pub use connection::{ConnectionOutcome, RejectReason, ACKNOWLEDGMENT};
pub use listener::{Listener, ListenerError};
pub use server::{Collaborators, PostOfficeServer};
