//! Per-connection spans.
//!
//! Every event logged while a connection is handled carries its
//! `connection_id` and `source`.

use tracing::Span;

use crate::net::connection::ConnectionId;

pub fn connection_span(id: ConnectionId, source: &str) -> Span {
    tracing::info_span!("connection", connection_id = %id, source = %source)
}
