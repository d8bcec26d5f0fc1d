//! Artifact storage subsystem.
//!
//! Accepted messages are written once, never modified, and only removed
//! by hand.

pub mod artifact;

pub use artifact::{ArtifactRef, ArtifactWriter, ARTIFACT_TIMESTAMP_FORMAT};
