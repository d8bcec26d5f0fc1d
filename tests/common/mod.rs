//! Shared utilities for receiver integration tests.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use postoffice::config::PostOfficeConfig;
use postoffice::error::{DecryptError, SinkError};
use postoffice::payload::{Decryptor, Passphrase};
use postoffice::sink::OutputSink;
use postoffice::{Collaborators, Listener, PostOfficeServer, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

pub const ARMORED: &str =
    "-----BEGIN PGP MESSAGE-----\n\nhQEMAwAAAAAAAAAAAQf/placeholder\n-----END PGP MESSAGE-----\n";

/// Decryptor that answers with a fixed plaintext, or fails.
pub struct FakeDecryptor {
    pub plaintext: Option<&'static str>,
}

#[async_trait]
impl Decryptor for FakeDecryptor {
    async fn decrypt(&self, _armored: &str, _passphrase: Option<&Passphrase>) -> Result<String, DecryptError> {
        match self.plaintext {
            Some(text) => Ok(text.to_string()),
            None => Err(DecryptError::Rejected("no secret key".into())),
        }
    }
}

/// Sink that records submissions, or fails every one.
#[derive(Default)]
pub struct RecordingSink {
    pub broken: bool,
    pub jobs: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl OutputSink for RecordingSink {
    async fn default_destination(&self) -> Result<Option<String>, SinkError> {
        if self.broken {
            return Ok(None);
        }
        Ok(Some("test-printer".into()))
    }

    async fn submit(&self, _destination: &str, file: &Path, _title: &str) -> Result<String, SinkError> {
        let mut jobs = self.jobs.lock().unwrap();
        jobs.push(file.to_path_buf());
        Ok(format!("test-printer-{}", jobs.len()))
    }
}

pub struct TestReceiver {
    pub addr: SocketAddr,
    pub config: PostOfficeConfig,
    pub sink: Arc<RecordingSink>,
    shutdown: Shutdown,
    task: JoinHandle<Result<(), postoffice::net::ListenerError>>,
}

impl TestReceiver {
    pub fn artifact_dir(&self) -> &Path {
        &self.config.storage.artifact_dir
    }

    /// Every artifact currently stored, as `(file name, contents)`.
    pub fn artifacts(&self) -> Vec<(String, String)> {
        let Ok(entries) = std::fs::read_dir(self.artifact_dir()) else {
            return Vec::new();
        };
        let mut artifacts: Vec<_> = entries
            .map(|entry| {
                let entry = entry.unwrap();
                let name = entry.file_name().to_string_lossy().into_owned();
                let contents = std::fs::read_to_string(entry.path()).unwrap();
                (name, contents)
            })
            .collect();
        artifacts.sort();
        artifacts
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("receiver did not stop")
            .unwrap()
            .unwrap();
    }
}

/// Start a receiver on an ephemeral loopback port with state under `dir`.
pub async fn start_receiver(
    dir: &Path,
    decryptor: FakeDecryptor,
    sink: RecordingSink,
    customize: impl FnOnce(&mut PostOfficeConfig),
) -> TestReceiver {
    let mut config = PostOfficeConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.listener.backlog = 64;
    config.listener.read_timeout_secs = 2;
    config.rate_limit.state_dir = dir.join("rate");
    config.storage.artifact_dir = dir.join("logs");
    customize(&mut config);

    let sink = Arc::new(sink);
    let collaborators = Collaborators {
        decryptor: Arc::new(decryptor),
        passphrase: Some(Passphrase::new("test")),
        sink: Some(sink.clone() as Arc<dyn OutputSink>),
    };

    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = PostOfficeServer::new(&config, collaborators);
    let shutdown = Shutdown::new();
    let task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    TestReceiver {
        addr,
        config,
        sink,
        shutdown,
        task,
    }
}

/// Send `payload` and collect whatever comes back before the receiver
/// closes. A reset counts as no reply.
pub async fn send(addr: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    if stream.write_all(payload).await.is_err() {
        return Vec::new();
    }

    let mut reply = Vec::new();
    match tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut reply)).await {
        Ok(Ok(_)) => reply,
        Ok(Err(_)) => Vec::new(),
        Err(_) => panic!("receiver neither replied nor closed"),
    }
}
