//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PostOfficeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::PostOfficeConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a configuration, collecting every violation.
pub fn validate_config(config: &PostOfficeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be at least 1"));
    }
    if config.listener.backlog == 0 {
        errors.push(ValidationError::new("listener.backlog", "must be at least 1"));
    }
    if config.listener.read_buffer_bytes == 0 {
        errors.push(ValidationError::new("listener.read_buffer_bytes", "must be at least 1"));
    }
    if config.rate_limit.connection_limit == 0 {
        errors.push(ValidationError::new("rate_limit.connection_limit", "must be at least 1"));
    }
    if config.decryption.enabled && config.decryption.gpg_program.trim().is_empty() {
        errors.push(ValidationError::new("decryption.gpg_program", "must not be empty"));
    }
    if config.sink.enabled {
        if config.sink.lp_program.trim().is_empty() {
            errors.push(ValidationError::new("sink.lp_program", "must not be empty"));
        }
        if config.sink.lpstat_program.trim().is_empty() {
            errors.push(ValidationError::new("sink.lpstat_program", "must not be empty"));
        }
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
