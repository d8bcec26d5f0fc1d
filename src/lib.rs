//! PostOffice: a one way telegram machine.
//!
//! Listens for short messages over TCP, admits at most a fixed number of
//! connections per source per day, decrypts armored payloads, writes each
//! message to disk and sends it to the printer.
//!
//! # Architecture
//!
//! ```text
//! sender ──TCP──▶ net::listener ──▶ net::connection
//!                                      │
//!                                      ├─▶ security::rate_limit  (<source>.rate)
//!                                      ├─▶ payload::interpreter  (gpg)
//!                                      ├─▶ storage::artifact     (logs/<source>_<time>)
//!                                      ├─▶ sink                  (lp)
//!                                      └─▶ "OK" back to sender
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod payload;
pub mod security;
pub mod sink;
pub mod storage;

pub use config::PostOfficeConfig;
pub use lifecycle::Shutdown;
pub use net::{Collaborators, Listener, PostOfficeServer};
