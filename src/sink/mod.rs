//! Output sink subsystem.
//!
//! Stored artifacts are handed to a sink (a printer) after they are
//! written. Forwarding is best effort: the sender's acknowledgment never
//! depends on it and failed submissions are not retried.

pub mod cups;

use std::path::Path;

use async_trait::async_trait;

use crate::error::SinkError;
use crate::storage::ArtifactRef;

pub use cups::CupsSink;

/// Somewhere stored artifacts can be submitted to.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// The destination used when none is named, if the system has one.
    async fn default_destination(&self) -> Result<Option<String>, SinkError>;

    /// Submit `file` to `destination`, returning the job id.
    async fn submit(&self, destination: &str, file: &Path, title: &str) -> Result<String, SinkError>;
}

/// Submit `artifact` to the sink's default destination.
pub async fn forward(sink: &dyn OutputSink, artifact: &ArtifactRef) -> Result<String, SinkError> {
    let destination = sink
        .default_destination()
        .await?
        .ok_or(SinkError::Unavailable)?;

    let job = sink.submit(&destination, &artifact.path, &artifact.name).await?;
    tracing::info!(artifact = %artifact, destination = %destination, job = %job, "Artifact sent to printer");
    Ok(job)
}
