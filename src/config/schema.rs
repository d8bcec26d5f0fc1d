//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the receiver.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the receiver.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PostOfficeConfig {
    /// Listener configuration (bind address, buffer, timeouts).
    pub listener: ListenerConfig,

    /// Per-source daily admission control.
    pub rate_limit: RateLimitConfig,

    /// Where received messages are written.
    pub storage: StorageConfig,

    /// Armored payload decryption.
    pub decryption: DecryptionConfig,

    /// Print sink settings.
    pub sink: SinkConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:7878").
    pub bind_address: String,

    /// Maximum connections processed at once. 1 keeps processing sequential.
    pub max_connections: usize,

    /// OS accept backlog.
    pub backlog: u32,

    /// Size of the single read performed per connection. Longer messages
    /// are truncated.
    pub read_buffer_bytes: usize,

    /// Read timeout in seconds (0 = wait forever).
    pub read_timeout_secs: u64,
}

impl ListenerConfig {
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_secs > 0).then(|| Duration::from_secs(self.read_timeout_secs))
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:7878".to_string(),
            max_connections: 1,
            backlog: 1,
            read_buffer_bytes: 1024,
            read_timeout_secs: 30,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Connections admitted per source per calendar day.
    pub connection_limit: u32,

    /// Directory holding one `<source>.rate` counter file per source.
    pub state_dir: PathBuf,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            connection_limit: 20,
            state_dir: PathBuf::from("."),
        }
    }
}

/// Artifact storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub artifact_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("logs"),
        }
    }
}

/// What to do with a message whose decryption failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecryptFailurePolicy {
    /// Drop the connection without storing anything or acknowledging.
    #[default]
    Reject,
    /// Store the failure text as the message body and acknowledge.
    Persist,
}

/// Decryption configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DecryptionConfig {
    /// Decrypt armored payloads. When off they are stored as received.
    pub enabled: bool,

    /// GnuPG executable.
    pub gpg_program: String,

    pub on_failure: DecryptFailurePolicy,
}

impl Default for DecryptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gpg_program: "gpg".to_string(),
            on_failure: DecryptFailurePolicy::Reject,
        }
    }
}

/// Print sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Forward stored messages to the default printer.
    pub enabled: bool,

    /// CUPS submission command.
    pub lp_program: String,

    /// CUPS status command, used to find the default destination.
    pub lpstat_program: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lp_program: "lp".to_string(),
            lpstat_program: "lpstat".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines instead of human-readable text.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
