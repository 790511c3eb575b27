//! The top-level coordinator handle.
//!
//! A `Dispatcher` owns the scheduler thread and the inbound command channel.
//! Caller threads send typed commands through the handle's methods and block
//! on a oneshot reply; all queue/worker mutation happens sequentially on the
//! scheduler thread.

pub(crate) mod command;
pub mod config;
pub mod job;
mod scheduler;
mod worker;

use std::sync::Arc;
use std::thread;

use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::error::{
    AddMessageError, CreateJobError, CreateQueueError, CreateWorkerError, DeleteQueueError,
    DispatcherError, QueueOpError,
};
use crate::message::MessageEnvelope;
use crate::queue::{QueueOptions, QueueStats};
use crate::storage::{FsStorage, Storage};

pub use config::{DispatcherConfig, JobOptions, ScheduleJobOptions, WorkerOptions};
pub use job::{BoxError, Callback, JobContext, JobFn};

use command::DispatcherCommand;
use scheduler::Scheduler;

/// Embedded job-queue coordinator. Dropping the handle shuts the scheduler
/// down; prefer [`Dispatcher::shutdown`] to observe join errors.
pub struct Dispatcher {
    command_tx: crossbeam_channel::Sender<DispatcherCommand>,
    scheduler_thread: Option<thread::JoinHandle<()>>,
}

impl Dispatcher {
    /// Create a dispatcher with filesystem storage rooted at `config.path`,
    /// spawning the scheduler on a dedicated OS thread. Existing state under
    /// the root is restored before the call returns control to the caller's
    /// timeline (restoration happens on the scheduler thread).
    pub fn new(config: DispatcherConfig) -> Result<Self, DispatcherError> {
        Self::with_storage(config, Arc::new(FsStorage::new()))
    }

    /// Create a dispatcher over a custom storage implementation.
    pub fn with_storage(
        config: DispatcherConfig,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, DispatcherError> {
        // Fail fast if the root is unusable; the scheduler re-checks on its
        // own thread during recovery.
        storage.ensure_dir(&config.path)?;

        let (tx, rx) =
            crossbeam_channel::bounded::<DispatcherCommand>(config.command_channel_capacity);
        let internal_tx = tx.clone();

        let handle = thread::Builder::new()
            .name("bbq-scheduler".to_string())
            .spawn(move || {
                let mut scheduler = Scheduler::new(storage, rx, internal_tx, config);
                scheduler.run();
            })
            .map_err(|e| DispatcherError::SchedulerSpawn(e.to_string()))?;

        info!("dispatcher started");

        Ok(Self {
            command_tx: tx,
            scheduler_thread: Some(handle),
        })
    }

    /// Create a queue, idempotent by name. Returns the queue id.
    pub fn create_queue(
        &self,
        name: &str,
        options: Option<QueueOptions>,
    ) -> Result<Uuid, CreateQueueError> {
        self.request(|reply| DispatcherCommand::CreateQueue {
            name: name.to_string(),
            options,
            reply,
        })?
    }

    /// Delete a queue and its on-disk directory.
    pub fn delete_queue(&self, name: &str) -> Result<(), DeleteQueueError> {
        self.request(|reply| DispatcherCommand::DeleteQueue {
            name: name.to_string(),
            reply,
        })?
    }

    /// Enqueue a value (string, number, or structured object) and broadcast
    /// it to workers. Returns the new message id.
    pub fn add_message(
        &self,
        queue: &str,
        value: impl Into<Value>,
    ) -> Result<Uuid, AddMessageError> {
        self.request(|reply| DispatcherCommand::AddMessage {
            queue: queue.to_string(),
            value: value.into(),
            reply,
        })?
    }

    /// Take a failed message out of the queue for inspection. The payload
    /// file is deleted; the caller owns the envelope from here.
    pub fn get_fail(
        &self,
        queue: &str,
        msg_id: Uuid,
    ) -> Result<Option<MessageEnvelope>, QueueOpError> {
        self.request(|reply| DispatcherCommand::GetFail {
            queue: queue.to_string(),
            msg_id,
            reply,
        })?
    }

    /// Re-emit every persisted message (optionally including fails) as fresh
    /// broadcasts. Returns how many were emitted.
    pub fn rebroadcast(&self, queue: &str, with_fails: bool) -> Result<usize, QueueOpError> {
        self.request(|reply| DispatcherCommand::Rebroadcast {
            queue: queue.to_string(),
            with_fails,
            reply,
        })?
    }

    /// Pipeline and fails depth for a queue.
    pub fn queue_stats(&self, queue: &str) -> Result<QueueStats, QueueOpError> {
        self.request(|reply| DispatcherCommand::QueueStats {
            queue: queue.to_string(),
            reply,
        })?
    }

    /// Same lookup, keyed by queue id.
    pub fn queue_stats_by_id(&self, id: Uuid) -> Result<QueueStats, QueueOpError> {
        self.request(|reply| DispatcherCommand::QueueStatsById { id, reply })?
    }

    /// Register a worker. Names are unique across the dispatcher.
    pub fn create_worker(
        &self,
        name: &str,
        options: Option<WorkerOptions>,
    ) -> Result<(), CreateWorkerError> {
        self.request(|reply| DispatcherCommand::CreateWorker {
            name: name.to_string(),
            options,
            reply,
        })?
    }

    /// Register a job consuming from `queue` on the named worker.
    pub fn create_job(
        &self,
        worker: &str,
        name: &str,
        queue: &str,
        callback: Callback,
        options: Option<JobOptions>,
    ) -> Result<(), CreateJobError> {
        self.request(|reply| DispatcherCommand::CreateJob {
            worker: worker.to_string(),
            name: name.to_string(),
            queue: queue.to_string(),
            callback,
            options,
            reply,
        })?
    }

    /// Register a cron-triggered job on the named worker. `pattern` is a
    /// 5-field cron expression or a named shorthand (`daily`, `minutely`, …);
    /// `sample_data` is cloned into every synthetic envelope.
    pub fn create_schedule_job(
        &self,
        worker: &str,
        name: &str,
        callback: Callback,
        pattern: &str,
        sample_data: impl Into<Value>,
        options: Option<ScheduleJobOptions>,
    ) -> Result<(), CreateJobError> {
        self.request(|reply| DispatcherCommand::CreateScheduleJob {
            worker: worker.to_string(),
            name: name.to_string(),
            callback,
            pattern: pattern.to_string(),
            sample_data: sample_data.into(),
            options,
            reply,
        })?
    }

    /// Initiate graceful shutdown: send the shutdown command and wait for
    /// the scheduler thread to finish.
    pub fn shutdown(mut self) -> Result<(), DispatcherError> {
        info!("initiating dispatcher shutdown");

        // Ignore the error if the channel already closed.
        let _ = self.command_tx.send(DispatcherCommand::Shutdown);

        if let Some(handle) = self.scheduler_thread.take() {
            handle
                .join()
                .map_err(|_| DispatcherError::SchedulerPanicked)?;
        }

        info!("dispatcher shutdown complete");
        Ok(())
    }

    fn send_command(&self, cmd: DispatcherCommand) -> Result<(), DispatcherError> {
        self.command_tx.try_send(cmd).map_err(|e| match e {
            crossbeam_channel::TrySendError::Full(_) => DispatcherError::ChannelFull,
            crossbeam_channel::TrySendError::Disconnected(_) => {
                DispatcherError::ChannelDisconnected
            }
        })
    }

    /// Send a request command and block on its oneshot reply.
    fn request<T>(
        &self,
        build: impl FnOnce(tokio::sync::oneshot::Sender<T>) -> DispatcherCommand,
    ) -> Result<T, DispatcherError> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.send_command(build(reply_tx))?;
        reply_rx
            .blocking_recv()
            .map_err(|_| DispatcherError::ReplyDropped)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // If shutdown wasn't called explicitly, attempt to stop the scheduler.
        if self.scheduler_thread.is_some() {
            let _ = self.command_tx.send(DispatcherCommand::Shutdown);
            if let Some(handle) = self.scheduler_thread.take() {
                let _ = handle.join();
            }
        }
    }
}
