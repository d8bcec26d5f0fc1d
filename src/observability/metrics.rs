//! Metrics collection and exposition.
//!
//! # Metrics
//! - `postoffice_connections_total` (counter): connections by outcome
//! - `postoffice_rate_limited_total` (counter): connections denied by the daily limit
//! - `postoffice_sink_failures_total` (counter): artifacts that could not be printed
//!
//! Recording is a no-op until a recorder is installed, so tests and
//! metrics-disabled deployments pay nothing.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::net::connection::{ConnectionOutcome, RejectReason};

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics endpoint"),
    }
}

pub fn record_outcome(outcome: &ConnectionOutcome) {
    ::metrics::counter!("postoffice_connections_total", "outcome" => outcome.label()).increment(1);
    if matches!(outcome, ConnectionOutcome::Rejected(RejectReason::RateLimited)) {
        ::metrics::counter!("postoffice_rate_limited_total").increment(1);
    }
}

pub fn record_sink_failure() {
    ::metrics::counter!("postoffice_sink_failures_total").increment(1);
}
