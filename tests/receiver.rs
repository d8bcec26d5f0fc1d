//! End-to-end tests against a receiver on a loopback port.

use std::sync::Arc;

use postoffice::config::DecryptFailurePolicy;
use tempfile::TempDir;

mod common;

use common::{send, start_receiver, FakeDecryptor, RecordingSink, ARMORED};

fn plain_decryptor() -> FakeDecryptor {
    FakeDecryptor {
        plaintext: Some("attack at dawn"),
    }
}

#[tokio::test]
async fn plaintext_message_is_stored_printed_and_acknowledged() {
    let dir = TempDir::new().unwrap();
    let receiver = start_receiver(dir.path(), plain_decryptor(), RecordingSink::default(), |_| {}).await;

    let reply = send(receiver.addr, b"hello").await;
    assert_eq!(reply, b"OK");

    let artifacts = receiver.artifacts();
    assert_eq!(artifacts.len(), 1);
    let (name, contents) = &artifacts[0];
    assert!(name.starts_with("127.0.0.1_"), "unexpected name {name}");
    assert!(name.ends_with("AM") || name.ends_with("PM"));
    assert!(contents.starts_with("------------\n127.0.0.1\n"));
    assert!(contents.ends_with("------------\nhello\n------------"));

    let jobs = receiver.sink.jobs.lock().unwrap().clone();
    assert_eq!(jobs, vec![receiver.artifact_dir().join(name)]);

    receiver.stop().await;
}

#[tokio::test]
async fn twenty_first_message_of_the_day_is_refused() {
    let dir = TempDir::new().unwrap();
    let receiver = start_receiver(dir.path(), plain_decryptor(), RecordingSink::default(), |_| {}).await;

    for i in 0..20 {
        let reply = send(receiver.addr, format!("message {i}").as_bytes()).await;
        assert_eq!(reply, b"OK", "message {i} should be admitted");
    }
    let reply = send(receiver.addr, b"one too many").await;
    assert!(reply.is_empty());

    let counter = std::fs::read_to_string(dir.path().join("rate").join("127.0.0.1.rate")).unwrap();
    assert!(counter.trim_end().ends_with(" 20"), "counter file: {counter:?}");

    receiver.stop().await;
}

#[tokio::test]
async fn invalid_utf8_is_dropped_and_listener_survives() {
    let dir = TempDir::new().unwrap();
    let receiver = start_receiver(dir.path(), plain_decryptor(), RecordingSink::default(), |_| {}).await;

    let reply = send(receiver.addr, &[0xc3, 0x28, 0xa0, 0xa1]).await;
    assert!(reply.is_empty());
    assert!(receiver.artifacts().is_empty());

    let reply = send(receiver.addr, b"still here").await;
    assert_eq!(reply, b"OK");
    assert_eq!(receiver.artifacts().len(), 1);

    receiver.stop().await;
}

#[tokio::test]
async fn armored_message_is_stored_decrypted() {
    let dir = TempDir::new().unwrap();
    let receiver = start_receiver(dir.path(), plain_decryptor(), RecordingSink::default(), |_| {}).await;

    let reply = send(receiver.addr, ARMORED.as_bytes()).await;
    assert_eq!(reply, b"OK");

    let (_, contents) = &receiver.artifacts()[0];
    assert!(contents.contains("\nattack at dawn\n"));
    assert!(!contents.contains("BEGIN PGP MESSAGE"));

    receiver.stop().await;
}

#[tokio::test]
async fn failed_decryption_is_rejected_by_default() {
    let dir = TempDir::new().unwrap();
    let receiver = start_receiver(
        dir.path(),
        FakeDecryptor { plaintext: None },
        RecordingSink::default(),
        |_| {},
    )
    .await;

    let reply = send(receiver.addr, ARMORED.as_bytes()).await;
    assert!(reply.is_empty());
    assert!(receiver.artifacts().is_empty());
    assert!(receiver.sink.jobs.lock().unwrap().is_empty());

    receiver.stop().await;
}

#[tokio::test]
async fn failed_decryption_can_be_persisted() {
    let dir = TempDir::new().unwrap();
    let receiver = start_receiver(
        dir.path(),
        FakeDecryptor { plaintext: None },
        RecordingSink::default(),
        |config| config.decryption.on_failure = DecryptFailurePolicy::Persist,
    )
    .await;

    let reply = send(receiver.addr, ARMORED.as_bytes()).await;
    assert_eq!(reply, b"OK");
    let (_, contents) = &receiver.artifacts()[0];
    assert!(contents.contains("decryption failed: no secret key"));

    receiver.stop().await;
}

#[tokio::test]
async fn decryption_disabled_stores_armored_text() {
    let dir = TempDir::new().unwrap();
    let receiver = start_receiver(
        dir.path(),
        plain_decryptor(),
        RecordingSink::default(),
        |config| config.decryption.enabled = false,
    )
    .await;

    assert_eq!(send(receiver.addr, ARMORED.as_bytes()).await, b"OK");
    let (_, contents) = &receiver.artifacts()[0];
    assert!(contents.contains("-----BEGIN PGP MESSAGE-----"));

    receiver.stop().await;
}

#[tokio::test]
async fn printer_trouble_does_not_affect_sender() {
    let dir = TempDir::new().unwrap();
    let receiver = start_receiver(
        dir.path(),
        plain_decryptor(),
        RecordingSink {
            broken: true,
            ..Default::default()
        },
        |_| {},
    )
    .await;

    assert_eq!(send(receiver.addr, b"hello").await, b"OK");
    assert_eq!(receiver.artifacts().len(), 1);
    assert!(receiver.sink.jobs.lock().unwrap().is_empty());

    receiver.stop().await;
}

#[tokio::test]
async fn concurrent_senders_share_one_daily_allowance() {
    let dir = TempDir::new().unwrap();
    let receiver = start_receiver(dir.path(), plain_decryptor(), RecordingSink::default(), |config| {
        config.listener.max_connections = 8;
    })
    .await;
    let addr = receiver.addr;

    let handles: Vec<_> = (0..30)
        .map(|i| tokio::spawn(async move { send(addr, format!("burst {i}").as_bytes()).await }))
        .collect();

    let mut acknowledged = 0;
    for handle in handles {
        if handle.await.unwrap() == b"OK" {
            acknowledged += 1;
        }
    }
    assert_eq!(acknowledged, 20);

    receiver.stop().await;
}

#[tokio::test]
async fn shutdown_stops_accepting() {
    let dir = TempDir::new().unwrap();
    let receiver = start_receiver(dir.path(), plain_decryptor(), RecordingSink::default(), |_| {}).await;
    let addr = receiver.addr;
    let sink = Arc::clone(&receiver.sink);

    assert_eq!(send(addr, b"before").await, b"OK");
    receiver.stop().await;

    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    assert_eq!(sink.jobs.lock().unwrap().len(), 1);
}
