//! Payload interpretation subsystem.
//!
//! # Data Flow
//! ```text
//! Decoded text
//!     → interpreter.rs (armor marker in the first 30 chars?)
//!     → yes: decryptor.rs (gpg) → plaintext or DecryptError
//!     → no: unchanged
//! ```

pub mod decryptor;
pub mod interpreter;

pub use decryptor::{Decryptor, GpgDecryptor, Passphrase};
pub use interpreter::{is_armored, PayloadInterpreter, ARMOR_MARKER};
