mod helpers;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bbq_core::{Callback, QueueOptions};
use serde_json::json;

/// Restart: three enqueued messages survive shutdown and are re-broadcast in
/// `createdAt` order, exactly once each, when a worker shows up.
#[test]
fn e2e_restart_restores_and_rebroadcasts_in_order() {
    let dir = tempfile::tempdir().unwrap();

    let first = helpers::dispatcher_at(dir.path());
    first.create_queue("q", None).unwrap();
    for i in 0..3 {
        first.add_message("q", json!(format!("msg-{i}"))).unwrap();
    }
    assert_eq!(first.queue_stats("q").unwrap().pipeline, 3);
    first.shutdown().unwrap();

    // Fresh process over the same root.
    let second = helpers::dispatcher_with(
        dir.path(),
        QueueOptions {
            rebroadcast_time: 150,
            ..QueueOptions::default()
        },
    );
    assert_eq!(
        second.queue_stats("q").unwrap().pipeline,
        3,
        "pipeline restored from metaq.json"
    );

    let seen: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = Arc::clone(&seen);
    second.create_worker("w", None).unwrap();
    second
        .create_job(
            "w",
            "resume",
            "q",
            Callback::in_process(move |ctx| {
                seen_cb.lock().unwrap().push(ctx.message.value.clone());
                Ok(())
            }),
            // One instance at a time keeps completion order observable.
            Some(bbq_core::JobOptions {
                concurrency: 1,
                ..bbq_core::JobOptions::default()
            }),
        )
        .unwrap();

    assert!(helpers::wait_until(Duration::from_secs(10), || {
        seen.lock().unwrap().len() == 3
    }));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![json!("msg-0"), json!("msg-1"), json!("msg-2")],
        "re-broadcast follows createdAt order, no duplicates"
    );

    assert!(helpers::wait_until(Duration::from_secs(5), || {
        second.queue_stats("q").unwrap().pipeline == 0
    }));
    second.shutdown().unwrap();
}

/// The restart path also resumes failed messages (rebroadcast with fails).
#[test]
fn e2e_restart_reoffers_failed_messages() {
    let dir = tempfile::tempdir().unwrap();

    let first = helpers::dispatcher_at(dir.path());
    first.create_queue("q", None).unwrap();
    first.create_worker("w", None).unwrap();
    first
        .create_job(
            "w",
            "fail-once",
            "q",
            Callback::in_process(|_| Err("down for maintenance".into())),
            None,
        )
        .unwrap();
    first.add_message("q", json!("stubborn")).unwrap();
    assert!(helpers::wait_until(Duration::from_secs(5), || {
        first.queue_stats("q").unwrap().fails == 1
    }));
    first.shutdown().unwrap();

    // After restart the failed message is re-offered; a healthy job now
    // completes it.
    let second = helpers::dispatcher_with(
        dir.path(),
        QueueOptions {
            rebroadcast_time: 150,
            ..QueueOptions::default()
        },
    );
    assert_eq!(second.queue_stats("q").unwrap().fails, 1);

    let (seen_tx, seen_rx) = std::sync::mpsc::channel();
    second.create_worker("w", None).unwrap();
    second
        .create_job(
            "w",
            "recovered",
            "q",
            Callback::in_process(move |ctx| {
                seen_tx.send(ctx.message.value.clone()).unwrap();
                Ok(())
            }),
            None,
        )
        .unwrap();

    let value = seen_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(value, json!("stubborn"));
    assert!(helpers::wait_until(Duration::from_secs(5), || {
        let stats = second.queue_stats("q").unwrap();
        stats.pipeline == 0 && stats.fails == 0
    }));
    second.shutdown().unwrap();
}
