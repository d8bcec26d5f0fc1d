//! Detects armored encrypted payloads and resolves them to plaintext.

use std::sync::Arc;

use crate::config::DecryptFailurePolicy;
use crate::error::DecryptError;
use crate::payload::decryptor::{Decryptor, Passphrase};

/// Marker looked for at the start of an armored message.
pub const ARMOR_MARKER: &str = "-----BEGIN PGP MESSAGE----";

/// How many leading characters are searched for the marker.
pub const ARMOR_PREFIX_CHARS: usize = 30;

/// True when the first [`ARMOR_PREFIX_CHARS`] characters contain the marker.
pub fn is_armored(text: &str) -> bool {
    let end = text
        .char_indices()
        .nth(ARMOR_PREFIX_CHARS)
        .map_or(text.len(), |(idx, _)| idx);
    text[..end].contains(ARMOR_MARKER)
}

/// Resolves received text into the body that gets stored.
#[derive(Clone)]
pub struct PayloadInterpreter {
    decryptor: Option<Arc<dyn Decryptor>>,
    passphrase: Option<Passphrase>,
    on_failure: DecryptFailurePolicy,
}

impl PayloadInterpreter {
    pub fn new(
        decryptor: Arc<dyn Decryptor>,
        passphrase: Option<Passphrase>,
        on_failure: DecryptFailurePolicy,
    ) -> Self {
        Self {
            decryptor: Some(decryptor),
            passphrase,
            on_failure,
        }
    }

    /// An interpreter that stores everything as received.
    pub fn passthrough() -> Self {
        Self {
            decryptor: None,
            passphrase: None,
            on_failure: DecryptFailurePolicy::Reject,
        }
    }

    /// Plaintext passes through unchanged; armored text is replaced by the
    /// decryptor's output.
    pub async fn resolve(&self, text: String) -> Result<String, DecryptError> {
        if !is_armored(&text) {
            return Ok(text);
        }
        let Some(decryptor) = &self.decryptor else {
            tracing::debug!("Decryption disabled, keeping armored payload");
            return Ok(text);
        };

        match decryptor.decrypt(&text, self.passphrase.as_ref()).await {
            Ok(plaintext) => Ok(plaintext),
            Err(e) if self.on_failure == DecryptFailurePolicy::Persist => {
                tracing::warn!(error = %e, "Decryption failed, storing failure text");
                Ok(e.to_string())
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for PayloadInterpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadInterpreter")
            .field("decrypts", &self.decryptor.is_some())
            .field("passphrase", &self.passphrase)
            .field("on_failure", &self.on_failure)
            .finish()
    }
}
