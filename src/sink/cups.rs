//! CUPS print sink driven through the `lpstat` and `lp` commands.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::SinkConfig;
use crate::error::SinkError;
use crate::sink::OutputSink;

#[derive(Debug, Clone)]
pub struct CupsSink {
    lp_program: String,
    lpstat_program: String,
}

impl CupsSink {
    pub fn new(config: &SinkConfig) -> Self {
        Self {
            lp_program: config.lp_program.clone(),
            lpstat_program: config.lpstat_program.clone(),
        }
    }
}

#[async_trait]
impl OutputSink for CupsSink {
    async fn default_destination(&self) -> Result<Option<String>, SinkError> {
        let output = Command::new(&self.lpstat_program).arg("-d").output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            // lpstat exits non-zero when no default is set on some systems
            if stdout.contains("no system default destination") {
                return Ok(None);
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SinkError::Command(stderr.trim().to_string()));
        }
        Ok(parse_default_destination(&stdout))
    }

    async fn submit(&self, destination: &str, file: &Path, title: &str) -> Result<String, SinkError> {
        let output = Command::new(&self.lp_program)
            .arg("-d")
            .arg(destination)
            .arg("-t")
            .arg(title)
            .arg(file)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SinkError::Command(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_job_id(&stdout).unwrap_or_else(|| stdout.trim().to_string()))
    }
}

/// `system default destination: <name>` → `<name>`.
fn parse_default_destination(stdout: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        let (_, name) = line.split_once("system default destination:")?;
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    })
}

/// `request id is <job> (1 file(s))` → `<job>`.
fn parse_job_id(stdout: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        let (_, rest) = line.split_once("request id is ")?;
        rest.split_whitespace().next().map(str::to_string)
    })
}
