//! Accept loop.
//!
//! # Responsibilities
//! - Build the shared connection context from configuration
//! - Accept connections within the listener's concurrency limit
//! - Run each connection in its own task, isolated from the loop
//! - Stop accepting on shutdown and drain in-flight connections

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::Instrument;

use crate::config::PostOfficeConfig;
use crate::net::connection::{Connection, ConnectionContext, ConnectionTracker};
use crate::net::listener::{Listener, ListenerError};
use crate::observability::spans::connection_span;
use crate::payload::{Decryptor, GpgDecryptor, Passphrase, PayloadInterpreter};
use crate::security::RateLimitStore;
use crate::sink::{CupsSink, OutputSink};
use crate::storage::ArtifactWriter;

/// How long shutdown waits for in-flight connections.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// External capabilities the receiver hands work to.
#[derive(Clone)]
pub struct Collaborators {
    pub decryptor: Arc<dyn Decryptor>,
    pub passphrase: Option<Passphrase>,
    /// `None` disables printing.
    pub sink: Option<Arc<dyn OutputSink>>,
}

impl Collaborators {
    /// GnuPG for decryption and CUPS for printing, as configured.
    pub fn from_config(config: &PostOfficeConfig, passphrase: Option<Passphrase>) -> Self {
        let sink: Option<Arc<dyn OutputSink>> = if config.sink.enabled {
            Some(Arc::new(CupsSink::new(&config.sink)))
        } else {
            None
        };

        Self {
            decryptor: Arc::new(GpgDecryptor::new(config.decryption.gpg_program.clone())),
            passphrase,
            sink,
        }
    }
}

/// The message receiver.
pub struct PostOfficeServer {
    context: Arc<ConnectionContext>,
    tracker: ConnectionTracker,
}

impl PostOfficeServer {
    pub fn new(config: &PostOfficeConfig, collaborators: Collaborators) -> Self {
        let interpreter = if config.decryption.enabled {
            PayloadInterpreter::new(
                collaborators.decryptor,
                collaborators.passphrase,
                config.decryption.on_failure,
            )
        } else {
            PayloadInterpreter::passthrough()
        };

        let context = ConnectionContext {
            rate_limit: RateLimitStore::new(&config.rate_limit),
            artifacts: ArtifactWriter::new(&config.storage),
            interpreter,
            sink: collaborators.sink,
            read_buffer_bytes: config.listener.read_buffer_bytes,
            read_timeout: config.listener.read_timeout(),
        };

        Self {
            context: Arc::new(context),
            tracker: ConnectionTracker::new(),
        }
    }

    /// Accept connections until `shutdown` fires, then drain.
    ///
    /// Per-connection failures never end the loop.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        tracing::info!(
            address = ?listener.local_addr().ok(),
            max_connections = listener.max_connections(),
            "Receiver accepting connections"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, addr, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(ListenerError::Closed) => return Err(ListenerError::Closed),
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept failed");
                            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                            continue;
                        }
                    };

                    let guard = self.tracker.track();
                    let source = addr.ip().to_string();
                    let span = connection_span(guard.id(), &source);
                    let context = Arc::clone(&self.context);

                    tokio::spawn(
                        async move {
                            let _permit = permit;
                            let connection = Connection::new(guard.id(), source, stream);
                            let outcome = connection.run(&context).await;
                            tracing::debug!(outcome = outcome.label(), "Connection finished");
                            drop(guard);
                        }
                        .instrument(span),
                    );
                }
            }
        }

        if !self.tracker.wait_for_drain(DRAIN_TIMEOUT).await {
            tracing::warn!(
                active = self.tracker.active_count(),
                "Connections still open after drain timeout"
            );
        }
        tracing::info!("Receiver stopped");
        Ok(())
    }
}
