use super::*;
use crate::dispatcher::command::DispatcherCommand;
use crate::dispatcher::config::DispatcherConfig;
use crate::dispatcher::job::Callback;
use crate::queue::QueueOptions;
use crate::storage::FsStorage;

use crossbeam_channel::Sender;
use serde_json::json;


/// Build a scheduler over a fresh temp root. Tests drive it synchronously:
/// send commands, finish with `Shutdown`, then call `run()` on the current
/// thread and assert on replies and scheduler state.
fn test_setup() -> (Sender<DispatcherCommand>, Scheduler, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = DispatcherConfig {
        path: dir.path().join("bbq"),
        idle_timeout_ms: 10,
        ..DispatcherConfig::default()
    };
    let (tx, scheduler) = scheduler_at(config);
    (tx, scheduler, dir)
}

fn scheduler_at(config: DispatcherConfig) -> (Sender<DispatcherCommand>, Scheduler) {
    let storage: Arc<dyn Storage> = Arc::new(FsStorage::new());
    let (tx, rx) = crossbeam_channel::bounded(100);
    let scheduler = Scheduler::new(storage, rx, tx.clone(), config);
    (tx, scheduler)
}

fn send_create_queue(tx: &Sender<DispatcherCommand>, name: &str, options: Option<QueueOptions>) {
    let (reply, _rx) = tokio::sync::oneshot::channel();
    tx.send(DispatcherCommand::CreateQueue {
        name: name.to_string(),
        options,
        reply,
    })
    .unwrap();
}

fn send_create_worker(tx: &Sender<DispatcherCommand>, name: &str, options: Option<crate::dispatcher::config::WorkerOptions>) {
    let (reply, _rx) = tokio::sync::oneshot::channel();
    tx.send(DispatcherCommand::CreateWorker {
        name: name.to_string(),
        options,
        reply,
    })
    .unwrap();
}

fn send_create_job(
    tx: &Sender<DispatcherCommand>,
    worker: &str,
    name: &str,
    queue: &str,
    callback: Callback,
    options: Option<crate::dispatcher::config::JobOptions>,
) {
    let (reply, _rx) = tokio::sync::oneshot::channel();
    tx.send(DispatcherCommand::CreateJob {
        worker: worker.to_string(),
        name: name.to_string(),
        queue: queue.to_string(),
        callback,
        options,
        reply,
    })
    .unwrap();
}

fn send_add_message(
    tx: &Sender<DispatcherCommand>,
    queue: &str,
    value: serde_json::Value,
) -> tokio::sync::oneshot::Receiver<Result<uuid::Uuid, crate::error::AddMessageError>> {
    let (reply, rx) = tokio::sync::oneshot::channel();
    tx.send(DispatcherCommand::AddMessage {
        queue: queue.to_string(),
        value,
        reply,
    })
    .unwrap();
    rx
}

fn shutdown_and_run(tx: &Sender<DispatcherCommand>, scheduler: &mut Scheduler) {
    tx.send(DispatcherCommand::Shutdown).unwrap();
    scheduler.run();
}
