//! Durable records of accepted messages.
//!
//! An artifact is named `<source>_<DD-MM-YYYY-HH-MM><AM|PM>` and holds a
//! framed copy of the message:
//!
//! ```text
//! ------------
//! <source>
//! <timestamp>
//! ------------
//! <body>
//! ------------
//! ```
//!
//! Names only resolve to the minute, so a second message from the same
//! source in the same minute replaces the first.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use tokio::fs;

use crate::config::StorageConfig;
use crate::error::StorageError;

/// Timestamp format used in artifact names and headers.
pub const ARTIFACT_TIMESTAMP_FORMAT: &str = "%d-%m-%Y-%H-%M%p";

/// Separator line around the header and body.
pub const FRAME_DELIMITER: &str = "------------";

/// Handle to a stored artifact, passed on to the output sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    /// File name, also used as the print job title.
    pub name: String,
    pub path: PathBuf,
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Writes accepted messages into the artifact directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            dir: config.artifact_dir.clone(),
        }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    /// Store `body` received from `source` at `timestamp`, creating the
    /// artifact directory if needed and overwriting any same-named artifact.
    pub async fn persist(
        &self,
        body: &str,
        source: &str,
        timestamp: NaiveDateTime,
    ) -> Result<ArtifactRef, StorageError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::new(&self.dir, e))?;

        let stamp = timestamp.format(ARTIFACT_TIMESTAMP_FORMAT).to_string();
        let name = format!("{source}_{stamp}");
        let path = self.dir.join(&name);

        fs::write(&path, frame(body, source, &stamp))
            .await
            .map_err(|e| StorageError::new(&path, e))?;

        tracing::debug!(artifact = %name, bytes = body.len(), "Artifact written");
        Ok(ArtifactRef { name, path })
    }
}

fn frame(body: &str, source: &str, stamp: &str) -> String {
    format!("{FRAME_DELIMITER}\n{source}\n{stamp}\n{FRAME_DELIMITER}\n{body}\n{FRAME_DELIMITER}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn writer(dir: &TempDir) -> ArtifactWriter {
        ArtifactWriter::new(&StorageConfig {
            artifact_dir: dir.path().join("logs"),
        })
    }

    #[tokio::test]
    async fn writes_framed_record() {
        let dir = TempDir::new().unwrap();
        let artifact = writer(&dir)
            .persist("hello", "127.0.0.1", at(14, 5, 0))
            .await
            .unwrap();

        assert_eq!(artifact.name, "127.0.0.1_09-03-2024-14-05PM");
        assert_eq!(
            std::fs::read_to_string(&artifact.path).unwrap(),
            "------------\n127.0.0.1\n09-03-2024-14-05PM\n------------\nhello\n------------"
        );
    }

    #[tokio::test]
    async fn morning_timestamps_use_am() {
        let dir = TempDir::new().unwrap();
        let artifact = writer(&dir)
            .persist("x", "10.1.1.1", at(9, 30, 0))
            .await
            .unwrap();
        assert_eq!(artifact.name, "10.1.1.1_09-03-2024-09-30AM");
    }

    #[tokio::test]
    async fn same_minute_overwrites() {
        let dir = TempDir::new().unwrap();
        let writer = writer(&dir);

        let first = writer.persist("first", "s", at(10, 0, 1)).await.unwrap();
        let second = writer.persist("second", "s", at(10, 0, 59)).await.unwrap();

        assert_eq!(first, second);
        let contents = std::fs::read_to_string(&second.path).unwrap();
        assert!(contents.contains("\nsecond\n"));
        assert!(!contents.contains("first"));
        assert_eq!(std::fs::read_dir(writer.dir()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn unwritable_dir_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        let writer = ArtifactWriter::new(&StorageConfig {
            artifact_dir: blocker,
        });

        assert!(writer.persist("x", "s", at(1, 0, 0)).await.is_err());
    }
}
