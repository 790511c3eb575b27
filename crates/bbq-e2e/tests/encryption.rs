mod helpers;

use std::time::Duration;

use bbq_core::{Callback, QueueOptions};
use serde_json::json;

fn encrypted_options() -> QueueOptions {
    QueueOptions {
        secret_key: "correct horse battery staple".to_string(),
        rebroadcast_time: 150,
        ..QueueOptions::default()
    }
}

/// Payloads are hex ciphertext at rest and plaintext in every envelope.
#[test]
fn e2e_payloads_are_encrypted_at_rest() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = helpers::dispatcher_with(dir.path(), encrypted_options());
    let (seen_tx, seen_rx) = std::sync::mpsc::channel();

    dispatcher.create_queue("vault", None).unwrap();
    dispatcher.create_worker("w", None).unwrap();
    dispatcher
        .create_job(
            "w",
            "read",
            "vault",
            Callback::in_process(move |ctx| {
                seen_tx.send(ctx.message.value.clone()).unwrap();
                // Leave the message pipelined long enough to inspect disk.
                std::thread::sleep(Duration::from_millis(500));
                Ok(())
            }),
            None,
        )
        .unwrap();

    dispatcher
        .add_message("vault", json!({"card": "4111-1111"}))
        .unwrap();

    // The callback sees plaintext.
    let value = seen_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(value, json!({"card": "4111-1111"}));

    // Disk sees only hex ciphertext.
    let payloads = helpers::payload_contents(dir.path());
    assert_eq!(payloads.len(), 1);
    assert!(!payloads[0].contains("4111"));
    assert!(payloads[0].chars().all(|c| c.is_ascii_hexdigit()));

    // And the snapshots never contain the key.
    let mut meta_blobs = String::new();
    for entry in walkdir(dir.path()) {
        if entry.ends_with(".json") {
            meta_blobs.push_str(&std::fs::read_to_string(&entry).unwrap());
        }
    }
    assert!(!meta_blobs.contains("correct horse battery staple"));

    dispatcher.shutdown().unwrap();
}

/// Restart with the same key decrypts restored payloads for delivery.
#[test]
fn e2e_encrypted_messages_survive_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first = helpers::dispatcher_with(dir.path(), encrypted_options());
    first.create_queue("vault", None).unwrap();
    first.add_message("vault", json!("sealed")).unwrap();
    first.shutdown().unwrap();

    let second = helpers::dispatcher_with(dir.path(), encrypted_options());
    assert_eq!(second.queue_stats("vault").unwrap().pipeline, 1);

    let (seen_tx, seen_rx) = std::sync::mpsc::channel();
    second.create_worker("w", None).unwrap();
    second
        .create_job(
            "w",
            "unseal",
            "vault",
            Callback::in_process(move |ctx| {
                seen_tx.send(ctx.message.value.clone()).unwrap();
                Ok(())
            }),
            None,
        )
        .unwrap();

    let value = seen_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(value, json!("sealed"));

    second.shutdown().unwrap();
}

fn walkdir(root: &std::path::Path) -> Vec<String> {
    let mut out = Vec::new();
    fn walk(dir: &std::path::Path, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, out);
            } else {
                out.push(path.to_string_lossy().into_owned());
            }
        }
    }
    walk(root, &mut out);
    out
}
