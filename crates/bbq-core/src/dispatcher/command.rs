use serde_json::Value;
use uuid::Uuid;

use crate::error::{
    AddMessageError, AttemptError, CreateJobError, CreateQueueError, CreateWorkerError,
    DeleteQueueError, QueueOpError,
};
use crate::message::MessageEnvelope;
use crate::queue::{QueueOptions, QueueStats};

use super::config::{JobOptions, ScheduleJobOptions, WorkerOptions};
use super::job::{Callback, JobKind};

/// Commands sent from caller threads to the single-threaded scheduler core.
///
/// Each variant that expects a response includes a `tokio::sync::oneshot::Sender`
/// for the reply. Fire-and-forget commands omit the reply channel —
/// `AttemptSettled` is internal, posted by attempt threads.
pub(crate) enum DispatcherCommand {
    CreateQueue {
        name: String,
        options: Option<QueueOptions>,
        reply: tokio::sync::oneshot::Sender<Result<Uuid, CreateQueueError>>,
    },
    DeleteQueue {
        name: String,
        reply: tokio::sync::oneshot::Sender<Result<(), DeleteQueueError>>,
    },
    AddMessage {
        queue: String,
        value: Value,
        reply: tokio::sync::oneshot::Sender<Result<Uuid, AddMessageError>>,
    },
    GetFail {
        queue: String,
        msg_id: Uuid,
        reply: tokio::sync::oneshot::Sender<Result<Option<MessageEnvelope>, QueueOpError>>,
    },
    Rebroadcast {
        queue: String,
        with_fails: bool,
        reply: tokio::sync::oneshot::Sender<Result<usize, QueueOpError>>,
    },
    QueueStats {
        queue: String,
        reply: tokio::sync::oneshot::Sender<Result<QueueStats, QueueOpError>>,
    },
    QueueStatsById {
        id: Uuid,
        reply: tokio::sync::oneshot::Sender<Result<QueueStats, QueueOpError>>,
    },
    CreateWorker {
        name: String,
        options: Option<WorkerOptions>,
        reply: tokio::sync::oneshot::Sender<Result<(), CreateWorkerError>>,
    },
    CreateJob {
        worker: String,
        name: String,
        queue: String,
        callback: Callback,
        options: Option<JobOptions>,
        reply: tokio::sync::oneshot::Sender<Result<(), CreateJobError>>,
    },
    CreateScheduleJob {
        worker: String,
        name: String,
        callback: Callback,
        pattern: String,
        sample_data: Value,
        options: Option<ScheduleJobOptions>,
        reply: tokio::sync::oneshot::Sender<Result<(), CreateJobError>>,
    },
    /// Posted by an attempt thread when its callback settles.
    AttemptSettled {
        worker: String,
        job: String,
        kind: JobKind,
        instance_id: Uuid,
        outcome: Result<(), AttemptError>,
    },
    Shutdown,
}
