mod helpers;

use bbq_core::{Callback, CreateJobError, CreateWorkerError, QueueOpError};
use serde_json::json;

#[test]
fn e2e_create_queue_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = helpers::dispatcher_at(dir.path());

    let a = dispatcher.create_queue("orders", None).unwrap();
    let b = dispatcher.create_queue("orders", None).unwrap();
    assert_eq!(a, b);

    // Both lookups resolve the same mailbox.
    let by_id = dispatcher.queue_stats_by_id(a).unwrap();
    let by_name = dispatcher.queue_stats("orders").unwrap();
    assert_eq!(by_id.id, by_name.id);
    assert_eq!(by_id.name, "orders");

    dispatcher.shutdown().unwrap();
}

#[test]
fn e2e_delete_queue_unregisters_and_clears_disk() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = helpers::dispatcher_at(dir.path());

    dispatcher.create_queue("trash", None).unwrap();
    dispatcher.add_message("trash", json!("junk")).unwrap();
    assert_eq!(helpers::payload_file_count(dir.path()), 1);

    dispatcher.delete_queue("trash").unwrap();
    assert_eq!(helpers::payload_file_count(dir.path()), 0);
    assert!(matches!(
        dispatcher.queue_stats("trash").unwrap_err(),
        QueueOpError::QueueNotFound(_)
    ));

    // A new queue under the same name starts empty.
    dispatcher.create_queue("trash", None).unwrap();
    assert_eq!(dispatcher.queue_stats("trash").unwrap().pipeline, 0);

    dispatcher.shutdown().unwrap();
}

#[test]
fn e2e_duplicate_names_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = helpers::dispatcher_at(dir.path());

    dispatcher.create_queue("q", None).unwrap();
    dispatcher.create_worker("w", None).unwrap();
    assert!(matches!(
        dispatcher.create_worker("w", None).unwrap_err(),
        CreateWorkerError::NameDuplicate(_)
    ));

    dispatcher
        .create_job("w", "j", "q", Callback::in_process(|_| Ok(())), None)
        .unwrap();
    assert!(matches!(
        dispatcher
            .create_job("w", "j", "q", Callback::in_process(|_| Ok(())), None)
            .unwrap_err(),
        CreateJobError::NameDuplicate(_)
    ));
    // Schedule jobs share the same namespace.
    assert!(matches!(
        dispatcher
            .create_schedule_job(
                "w",
                "j",
                Callback::in_process(|_| Ok(())),
                "daily",
                json!(1),
                None,
            )
            .unwrap_err(),
        CreateJobError::NameDuplicate(_)
    ));

    dispatcher.shutdown().unwrap();
}

#[test]
fn e2e_schedule_job_registration_smoke() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = helpers::dispatcher_at(dir.path());

    dispatcher.create_worker("cron", None).unwrap();
    dispatcher
        .create_schedule_job(
            "cron",
            "nightly-report",
            Callback::in_process(|_| Ok(())),
            "0 3 * * *",
            json!({"report": "sales"}),
            None,
        )
        .unwrap();
    assert!(matches!(
        dispatcher
            .create_schedule_job(
                "cron",
                "broken",
                Callback::in_process(|_| Ok(())),
                "not a pattern",
                json!(1),
                None,
            )
            .unwrap_err(),
        CreateJobError::Pattern(_)
    ));

    dispatcher.shutdown().unwrap();
}
