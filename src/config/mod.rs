//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CLI overrides applied in main
//!     → PostOfficeConfig (validated, immutable)
//!     → handed to the server at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    DecryptFailurePolicy, DecryptionConfig, ListenerConfig, ObservabilityConfig,
    PostOfficeConfig, RateLimitConfig, SinkConfig, StorageConfig,
};
pub use validation::{validate_config, ValidationError};
