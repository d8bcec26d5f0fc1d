//! Connection state machine and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Drive one connection through admission, read, decode, interpretation,
//!   persistence, forwarding and acknowledgment
//! - Contain every per-connection failure; none reaches the accept loop
//! - Track in-flight connections for graceful shutdown
//!
//! # States
//! ```text
//! Accepted → RateChecked → Decoded → Interpreted → Persisted → Replied → Closed
//!     └──────────┴────────────┴───────────┴────────────┴──────────→ Closed (on error)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ConnectionError, ConnectionResult};
use crate::observability::metrics;
use crate::payload::PayloadInterpreter;
use crate::security::{Admission, RateLimitStore};
use crate::sink::{self, OutputSink};
use crate::storage::{ArtifactRef, ArtifactWriter};

/// Reply sent to the sender once its message is stored.
pub const ACKNOWLEDGMENT: &[u8] = b"OK";

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Where a connection is in its handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    RateChecked,
    Decoded,
    Interpreted,
    Persisted,
    Replied,
    Closed,
}

/// Why a connection was closed without an acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    RateLimited,
    ReadFailed,
    DecodeError,
    DecryptionFailed,
    StorageFailed,
}

impl From<&ConnectionError> for RejectReason {
    fn from(err: &ConnectionError) -> Self {
        match err {
            ConnectionError::RateLimited(_) => RejectReason::RateLimited,
            ConnectionError::Read(_) => RejectReason::ReadFailed,
            ConnectionError::Decode(_) => RejectReason::DecodeError,
            ConnectionError::Decryption(_) => RejectReason::DecryptionFailed,
            ConnectionError::Storage(_) => RejectReason::StorageFailed,
        }
    }
}

/// Terminal result of one connection. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOutcome {
    Rejected(RejectReason),
    Accepted(ArtifactRef),
}

impl ConnectionOutcome {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionOutcome::Accepted(_) => "accepted",
            ConnectionOutcome::Rejected(RejectReason::RateLimited) => "rate_limited",
            ConnectionOutcome::Rejected(RejectReason::ReadFailed) => "read_failed",
            ConnectionOutcome::Rejected(RejectReason::DecodeError) => "decode_error",
            ConnectionOutcome::Rejected(RejectReason::DecryptionFailed) => "decryption_failed",
            ConnectionOutcome::Rejected(RejectReason::StorageFailed) => "storage_failed",
        }
    }
}

/// Everything a connection handler needs, owned by the server and shared
/// by all connections.
pub struct ConnectionContext {
    pub rate_limit: RateLimitStore,
    pub artifacts: ArtifactWriter,
    pub interpreter: PayloadInterpreter,
    /// `None` disables forwarding.
    pub sink: Option<Arc<dyn OutputSink>>,
    /// Size of the single read. Longer messages are truncated.
    pub read_buffer_bytes: usize,
    pub read_timeout: Option<Duration>,
}

/// One inbound connection being handled.
pub struct Connection<S> {
    id: ConnectionId,
    source: String,
    stream: S,
    state: ConnectionState,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(id: ConnectionId, source: impl Into<String>, stream: S) -> Self {
        Self {
            id,
            source: source.into(),
            stream,
            state: ConnectionState::Accepted,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Handle the connection to completion and close it.
    pub async fn run(mut self, ctx: &ConnectionContext) -> ConnectionOutcome {
        let outcome = match self.process(ctx).await {
            Ok(artifact) => ConnectionOutcome::Accepted(artifact),
            Err(err) => {
                self.log_rejection(&err);
                ConnectionOutcome::Rejected(RejectReason::from(&err))
            }
        };

        let _ = self.stream.shutdown().await;
        self.advance(ConnectionState::Closed);
        metrics::record_outcome(&outcome);
        outcome
    }

    async fn process(&mut self, ctx: &ConnectionContext) -> ConnectionResult<ArtifactRef> {
        match ctx.rate_limit.check(&self.source).await? {
            Admission::Admitted => self.advance(ConnectionState::RateChecked),
            Admission::Denied => return Err(ConnectionError::RateLimited(self.source.clone())),
        }

        let bytes = self.read_message(ctx).await?;
        let text = String::from_utf8(bytes)?;
        self.advance(ConnectionState::Decoded);

        let body = ctx.interpreter.resolve(text).await?;
        self.advance(ConnectionState::Interpreted);

        let artifact = ctx
            .artifacts
            .persist(&body, &self.source, Local::now().naive_local())
            .await?;
        self.advance(ConnectionState::Persisted);

        if let Some(output) = &ctx.sink {
            if let Err(e) = sink::forward(output.as_ref(), &artifact).await {
                tracing::warn!(artifact = %artifact, error = %e, "Failed to forward artifact to printer");
                metrics::record_sink_failure();
            }
        }

        // The artifact is already stored; a sender that vanished only misses the reply.
        match self.stream.write_all(ACKNOWLEDGMENT).await {
            Ok(()) => self.advance(ConnectionState::Replied),
            Err(e) => tracing::warn!(error = %e, "Failed to acknowledge message"),
        }

        tracing::info!(artifact = %artifact, "Message stored");
        Ok(artifact)
    }

    /// One read of at most `read_buffer_bytes`, not a loop to end-of-stream.
    async fn read_message(&mut self, ctx: &ConnectionContext) -> ConnectionResult<Vec<u8>> {
        let mut buf = vec![0u8; ctx.read_buffer_bytes];
        let read = self.stream.read(&mut buf);
        let n = match ctx.read_timeout {
            Some(limit) => tokio::time::timeout(limit, read).await.map_err(|_| {
                ConnectionError::Read(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("no data within {}s", limit.as_secs()),
                ))
            })?,
            None => read.await,
        }
        .map_err(ConnectionError::Read)?;

        buf.truncate(n);
        Ok(buf)
    }

    fn advance(&mut self, next: ConnectionState) {
        tracing::trace!(connection_id = %self.id, from = ?self.state, to = ?next, "Connection state");
        self.state = next;
    }

    fn log_rejection(&self, err: &ConnectionError) {
        match err {
            ConnectionError::RateLimited(_) => {
                tracing::warn!(source = %self.source, "Rate limit exceeded, closing connection");
            }
            ConnectionError::Storage(e) if self.state == ConnectionState::Accepted => {
                tracing::error!(source = %self.source, error = %e, "Rate limit state unavailable, denying");
            }
            ConnectionError::Decode(e) => {
                tracing::warn!(
                    source = %self.source,
                    bytes = ?e.as_bytes(),
                    error = %e.utf8_error(),
                    "Error decoding received bytes"
                );
            }
            other => tracing::error!(source = %self.source, error = %other, "Dropping connection"),
        }
    }
}

/// Tracks in-flight connections for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    /// Current count of active connections.
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until all connections are closed or `deadline` passes.
    /// Returns whether everything drained.
    pub async fn wait_for_drain(&self, deadline: Duration) -> bool {
        let drained = async {
            while self.active_count.load(Ordering::SeqCst) > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        tokio::time::timeout(deadline, drained).await.is_ok()
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
