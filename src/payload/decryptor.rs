//! Decryption capability for armored payloads.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::DecryptError;

/// Secret used to unlock the receiving key. Never printed.
#[derive(Clone)]
pub struct Passphrase(String);

impl Passphrase {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Read the first line of `path`.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let line = contents.lines().next().unwrap_or_default();
        Ok(Self(line.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Passphrase(****)")
    }
}

/// Turns an armored encrypted message into plaintext.
#[async_trait]
pub trait Decryptor: Send + Sync {
    async fn decrypt(
        &self,
        armored: &str,
        passphrase: Option<&Passphrase>,
    ) -> Result<String, DecryptError>;
}

/// Decrypts by piping the message through the GnuPG command line.
///
/// With a passphrase, gpg reads it as the first line of stdin
/// (`--passphrase-fd 0`) and the message from the rest.
#[derive(Debug, Clone)]
pub struct GpgDecryptor {
    program: String,
}

impl GpgDecryptor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Decryptor for GpgDecryptor {
    async fn decrypt(
        &self,
        armored: &str,
        passphrase: Option<&Passphrase>,
    ) -> Result<String, DecryptError> {
        let mut command = Command::new(&self.program);
        command.args(["--batch", "--quiet", "--yes", "--no-tty"]);
        if passphrase.is_some() {
            command.args(["--pinentry-mode", "loopback", "--passphrase-fd", "0"]);
        }
        command
            .arg("--decrypt")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;

        let mut input = String::with_capacity(armored.len() + 64);
        if let Some(passphrase) = passphrase {
            input.push_str(passphrase.expose());
            input.push('\n');
        }
        input.push_str(armored);

        // Messages are bounded by the read buffer, well under a pipe's capacity.
        // A program that exits before reading everything is judged by its status.
        if let Some(mut stdin) = child.stdin.take() {
            let written = match stdin.write_all(input.as_bytes()).await {
                Ok(()) => stdin.shutdown().await,
                Err(e) => Err(e),
            };
            match written {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e.into()),
                _ => {}
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DecryptError::Rejected(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
