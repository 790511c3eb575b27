use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dispatcher::command::DispatcherCommand;
use crate::dispatcher::config::DispatcherConfig;
use crate::dispatcher::worker::WorkerState;
use crate::queue::QueueState;
use crate::storage::Storage;

mod execution;
mod handlers;
mod recovery;
mod routing;
mod timers;

use timers::{TimerEvent, TimerWheel};

/// Single-threaded scheduler core. Owns all queue, worker, and timer state
/// and processes commands from caller threads via a crossbeam channel.
pub(crate) struct Scheduler {
    storage: Arc<dyn Storage>,
    inbound: Receiver<DispatcherCommand>,
    /// Cloned into attempt threads so settlements come back as commands.
    internal_tx: Sender<DispatcherCommand>,
    config: DispatcherConfig,
    root: PathBuf,
    idle_timeout: Duration,
    running: bool,
    created_at: u64,
    queues: HashMap<Uuid, QueueState>,
    /// name → queue id; name uniqueness is enforced here.
    queue_ids: HashMap<String, Uuid>,
    /// Sorted by descending priority; ties keep registration order.
    workers: Vec<WorkerState>,
    timers: TimerWheel,
}

impl Scheduler {
    pub fn new(
        storage: Arc<dyn Storage>,
        inbound: Receiver<DispatcherCommand>,
        internal_tx: Sender<DispatcherCommand>,
        config: DispatcherConfig,
    ) -> Self {
        let root = config.path.clone();
        let idle_timeout = Duration::from_millis(config.idle_timeout_ms);
        Self {
            storage,
            inbound,
            internal_tx,
            config,
            root,
            idle_timeout,
            running: true,
            created_at: now_ms(),
            queues: HashMap::new(),
            queue_ids: HashMap::new(),
            workers: Vec::new(),
            timers: TimerWheel::default(),
        }
    }

    /// Run the scheduler event loop. Blocks the current thread until a
    /// `Shutdown` command arrives or the inbound channel disconnects.
    pub fn run(&mut self) {
        info!("scheduler started");
        if let Err(e) = self.recover() {
            warn!(error = %e, "recovery failed, starting with empty state");
        }

        while self.running {
            // Phase 1: drain all buffered commands (non-blocking).
            let mut drained = 0;
            while let Ok(cmd) = self.inbound.try_recv() {
                self.handle_command(cmd);
                drained += 1;
                if !self.running {
                    break;
                }
            }

            // Phase 2: fire every due timer.
            self.fire_due_timers();

            if !self.running {
                break;
            }

            // Phase 3: park until the next command or the next deadline.
            if drained == 0 {
                let wait = self
                    .timers
                    .until_next()
                    .map_or(self.idle_timeout, |d| d.min(self.idle_timeout));
                match self.inbound.recv_timeout(wait) {
                    Ok(cmd) => self.handle_command(cmd),
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                        info!("inbound channel disconnected, shutting down");
                        self.running = false;
                    }
                }
            }
        }

        // Final snapshots so restart sees the latest pipeline/fails state
        // even when a debounced writer was still pending.
        for queue in self.queues.values() {
            if let Err(e) = queue.write_meta() {
                warn!(queue = %queue.name, error = %e, "failed to write final queue snapshot");
            }
        }
        info!("scheduler stopped");
    }

    fn handle_command(&mut self, cmd: DispatcherCommand) {
        match cmd {
            DispatcherCommand::CreateQueue { name, options, reply } => {
                info!(%name, "create queue command received");
                let result = self.handle_create_queue(&name, options);
                let _ = reply.send(result);
            }
            DispatcherCommand::DeleteQueue { name, reply } => {
                info!(%name, "delete queue command received");
                let result = self.handle_delete_queue(&name);
                let _ = reply.send(result);
            }
            DispatcherCommand::AddMessage { queue, value, reply } => {
                debug!(%queue, "add message command received");
                let result = self.handle_add_message(&queue, value);
                let _ = reply.send(result);
            }
            DispatcherCommand::GetFail { queue, msg_id, reply } => {
                debug!(%queue, %msg_id, "get fail command received");
                let result = self.handle_get_fail(&queue, msg_id);
                let _ = reply.send(result);
            }
            DispatcherCommand::Rebroadcast { queue, with_fails, reply } => {
                debug!(%queue, with_fails, "rebroadcast command received");
                let result = self.handle_rebroadcast(&queue, with_fails);
                let _ = reply.send(result);
            }
            DispatcherCommand::QueueStats { queue, reply } => {
                let result = self.handle_queue_stats(&queue);
                let _ = reply.send(result);
            }
            DispatcherCommand::QueueStatsById { id, reply } => {
                let result = self.handle_queue_stats_by_id(id);
                let _ = reply.send(result);
            }
            DispatcherCommand::CreateWorker { name, options, reply } => {
                info!(%name, "create worker command received");
                let result = self.handle_create_worker(&name, options);
                let _ = reply.send(result);
            }
            DispatcherCommand::CreateJob {
                worker,
                name,
                queue,
                callback,
                options,
                reply,
            } => {
                info!(%worker, %name, %queue, "create job command received");
                let result = self.handle_create_job(&worker, &name, &queue, callback, options);
                let _ = reply.send(result);
            }
            DispatcherCommand::CreateScheduleJob {
                worker,
                name,
                callback,
                pattern,
                sample_data,
                options,
                reply,
            } => {
                info!(%worker, %name, %pattern, "create schedule job command received");
                let result =
                    self.handle_create_schedule_job(&worker, &name, callback, &pattern, sample_data, options);
                let _ = reply.send(result);
            }
            DispatcherCommand::AttemptSettled {
                worker,
                job,
                kind,
                instance_id,
                outcome,
            } => {
                debug!(%worker, %job, %instance_id, ok = outcome.is_ok(), "attempt settled");
                self.attempt_settled(&worker, &job, kind, instance_id, outcome);
            }
            DispatcherCommand::Shutdown => {
                info!("shutdown command received, draining remaining commands");
                self.running = false;
            }
        }
    }

    /// Invalidate any pending snapshot writer for the queue and re-arm the
    /// debounced write.
    fn trigger_queue_snapshot(&mut self, queue_id: Uuid) {
        let Some(queue) = self.queues.get_mut(&queue_id) else {
            return;
        };
        let gen = queue.bump_meta_gen();
        let delay = Duration::from_millis(queue.meta_debounce_ms());
        self.timers
            .arm(delay, TimerEvent::QueueSnapshot { queue_id, gen });
    }

    fn worker(&self, name: &str) -> Option<&WorkerState> {
        self.workers.iter().find(|w| w.name == name)
    }

    fn worker_mut(&mut self, name: &str) -> Option<&mut WorkerState> {
        self.workers.iter_mut().find(|w| w.name == name)
    }

    // --- test accessors ---

    #[cfg(test)]
    pub fn queue_by_name(&self, name: &str) -> Option<&QueueState> {
        self.queue_ids.get(name).and_then(|id| self.queues.get(id))
    }

    #[cfg(test)]
    pub fn worker_by_name(&self, name: &str) -> Option<&WorkerState> {
        self.worker(name)
    }

    #[cfg(test)]
    pub fn fire_timer_now(&mut self, event: TimerEvent) {
        self.handle_timer(event);
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests;
