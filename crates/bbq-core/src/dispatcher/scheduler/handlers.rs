use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cron::CronPattern;
use crate::dispatcher::config::{JobOptions, ScheduleJobOptions, WorkerOptions};
use crate::dispatcher::job::{Callback, JobState, ScheduleJobState};
use crate::dispatcher::worker::WorkerState;
use crate::error::{
    AddMessageError, CreateJobError, CreateQueueError, CreateWorkerError, DeleteQueueError,
    QueueOpError,
};
use crate::message::MessageEnvelope;
use crate::queue::{QueueOptions, QueueStats};
use crate::storage::paths;

use super::timers::TimerEvent;
use super::{now_ms, Scheduler};

impl Scheduler {
    /// Idempotent by name: an existing queue is returned as-is.
    pub(super) fn handle_create_queue(
        &mut self,
        name: &str,
        options: Option<QueueOptions>,
    ) -> Result<Uuid, CreateQueueError> {
        if let Some(id) = self.queue_ids.get(name) {
            return Ok(*id);
        }

        let options = options.unwrap_or_else(|| self.config.queue_option.clone());
        let dir = paths::queue_dir(&self.root, name);
        let id = self.setup_queue(Uuid::now_v7(), name, dir, options)?;
        self.write_dispatcher_meta();
        if self.config.log {
            info!(%name, %id, "queue created");
        }
        Ok(id)
    }

    pub(super) fn handle_delete_queue(&mut self, name: &str) -> Result<(), DeleteQueueError> {
        let id = self
            .queue_ids
            .remove(name)
            .ok_or_else(|| DeleteQueueError::QueueNotFound(name.to_string()))?;
        if let Some(queue) = self.queues.remove(&id) {
            self.storage.remove_dir(&queue.dir)?;
        }
        self.write_dispatcher_meta();
        if self.config.log {
            info!(%name, "queue deleted");
        }
        Ok(())
    }

    /// Validate, persist, broadcast. The expiration timer and the debounced
    /// snapshot are armed only after the message is durably in the pipeline.
    pub(super) fn handle_add_message(
        &mut self,
        queue_name: &str,
        value: Value,
    ) -> Result<Uuid, AddMessageError> {
        let queue_id = *self
            .queue_ids
            .get(queue_name)
            .ok_or_else(|| AddMessageError::QueueNotFound(queue_name.to_string()))?;

        let (envelope, expire_timer) = {
            let Some(queue) = self.queues.get_mut(&queue_id) else {
                return Err(AddMessageError::QueueNotFound(queue_name.to_string()));
            };
            let envelope = queue.add_message(&value, now_ms())?;
            let expire_timer = (queue.options.expire > 0).then(|| {
                (
                    queue.arm_delete_timer(envelope.message.id),
                    queue.options.expire,
                )
            });
            (envelope, expire_timer)
        };

        let msg_id = envelope.message.id;
        if let Some((gen, expire_secs)) = expire_timer {
            self.timers.arm(
                Duration::from_secs(expire_secs),
                TimerEvent::ExpireMessage {
                    queue_id,
                    msg_id,
                    gen,
                },
            );
        }
        if self.config.log {
            info!(queue = %queue_name, %msg_id, "message added");
        }
        self.trigger_queue_snapshot(queue_id);
        self.listen(queue_id, envelope);
        Ok(msg_id)
    }

    /// Hand a failed message over to the caller, removing it from the queue.
    pub(super) fn handle_get_fail(
        &mut self,
        queue_name: &str,
        msg_id: Uuid,
    ) -> Result<Option<MessageEnvelope>, QueueOpError> {
        let queue_id = *self
            .queue_ids
            .get(queue_name)
            .ok_or_else(|| QueueOpError::QueueNotFound(queue_name.to_string()))?;
        let taken = {
            let Some(queue) = self.queues.get_mut(&queue_id) else {
                return Err(QueueOpError::QueueNotFound(queue_name.to_string()));
            };
            queue.take_fail(msg_id)?
        };
        if taken.is_some() {
            self.trigger_queue_snapshot(queue_id);
        }
        Ok(taken)
    }

    pub(super) fn handle_rebroadcast(
        &mut self,
        queue_name: &str,
        with_fails: bool,
    ) -> Result<usize, QueueOpError> {
        let queue_id = *self
            .queue_ids
            .get(queue_name)
            .ok_or_else(|| QueueOpError::QueueNotFound(queue_name.to_string()))?;
        self.rebroadcast_queue(queue_id, with_fails)
    }

    /// Re-emit every persisted message, re-read and decrypted from disk, in
    /// `created_at` order. Unreadable payloads are skipped with a warning.
    pub(super) fn rebroadcast_queue(
        &mut self,
        queue_id: Uuid,
        with_fails: bool,
    ) -> Result<usize, QueueOpError> {
        let envelopes: Vec<MessageEnvelope> = {
            let Some(queue) = self.queues.get(&queue_id) else {
                return Err(QueueOpError::QueueNotFound(queue_id.to_string()));
            };
            let mut messages: Vec<_> = queue.pipeline.iter().cloned().collect();
            if with_fails {
                messages.extend(queue.fails.iter().cloned());
            }
            messages.sort_by_key(|m| m.created_at);
            messages
                .iter()
                .filter_map(|m| match queue.read_envelope(m) {
                    Ok(envelope) => Some(envelope),
                    Err(e) => {
                        warn!(queue = %queue.name, msg_id = %m.id, error = %e, "skipping unreadable message during rebroadcast");
                        None
                    }
                })
                .collect()
        };

        let count = envelopes.len();
        for envelope in envelopes {
            self.listen(queue_id, envelope);
        }
        Ok(count)
    }

    pub(super) fn handle_queue_stats(&self, queue_name: &str) -> Result<QueueStats, QueueOpError> {
        let queue_id = self
            .queue_ids
            .get(queue_name)
            .ok_or_else(|| QueueOpError::QueueNotFound(queue_name.to_string()))?;
        let queue = self
            .queues
            .get(queue_id)
            .ok_or_else(|| QueueOpError::QueueNotFound(queue_name.to_string()))?;
        Ok(queue.stats())
    }

    pub(super) fn handle_queue_stats_by_id(&self, id: Uuid) -> Result<QueueStats, QueueOpError> {
        let queue = self
            .queues
            .get(&id)
            .ok_or_else(|| QueueOpError::QueueNotFound(id.to_string()))?;
        Ok(queue.stats())
    }

    /// Workers are held in descending priority order; equal priorities keep
    /// registration order.
    pub(super) fn handle_create_worker(
        &mut self,
        name: &str,
        options: Option<WorkerOptions>,
    ) -> Result<(), CreateWorkerError> {
        if self.workers.iter().any(|w| w.name == name) {
            return Err(CreateWorkerError::NameDuplicate(name.to_string()));
        }
        let options = options.unwrap_or_default();
        let interval = options.interval_run_job;
        let pos = self
            .workers
            .iter()
            .position(|w| w.options.priority < options.priority)
            .unwrap_or(self.workers.len());
        self.workers
            .insert(pos, WorkerState::new(name.to_string(), options));
        self.timers.arm(
            Duration::from_millis(interval),
            TimerEvent::WorkerInterval {
                worker: name.to_string(),
            },
        );
        if self.config.log {
            info!(worker = %name, "worker created");
        }
        Ok(())
    }

    pub(super) fn handle_create_job(
        &mut self,
        worker_name: &str,
        job_name: &str,
        queue_name: &str,
        callback: Callback,
        options: Option<JobOptions>,
    ) -> Result<(), CreateJobError> {
        callback.validate()?;
        let queue_id = *self
            .queue_ids
            .get(queue_name)
            .ok_or_else(|| CreateJobError::QueueNotFound(queue_name.to_string()))?;
        let Some(worker) = self.worker_mut(worker_name) else {
            return Err(CreateJobError::WorkerNotFound(worker_name.to_string()));
        };
        if worker.has_job_name(job_name) {
            return Err(CreateJobError::NameDuplicate(job_name.to_string()));
        }
        worker.jobs.push(JobState {
            name: job_name.to_string(),
            queue_id,
            queue_name: queue_name.to_string(),
            callback,
            options: options.unwrap_or_default(),
            working_message: Default::default(),
            instances: Default::default(),
        });
        worker.observer_queue.insert(queue_id, true);
        if self.config.log {
            info!(worker = %worker_name, job = %job_name, queue = %queue_name, "job created");
        }
        Ok(())
    }

    pub(super) fn handle_create_schedule_job(
        &mut self,
        worker_name: &str,
        job_name: &str,
        callback: Callback,
        pattern: &str,
        sample_data: Value,
        options: Option<ScheduleJobOptions>,
    ) -> Result<(), CreateJobError> {
        callback.validate()?;
        if sample_data.is_null() {
            return Err(CreateJobError::SampleUndefined);
        }
        let options = options.unwrap_or_default();
        let timezone: chrono_tz::Tz = options
            .timezone
            .parse()
            .map_err(|_| CreateJobError::InvalidTimezone(options.timezone.clone()))?;
        let pattern = CronPattern::parse(pattern)?;

        let Some(worker) = self.worker_mut(worker_name) else {
            return Err(CreateJobError::WorkerNotFound(worker_name.to_string()));
        };
        if worker.has_job_name(job_name) {
            return Err(CreateJobError::NameDuplicate(job_name.to_string()));
        }
        worker.schedule_jobs.push(ScheduleJobState {
            name: job_name.to_string(),
            callback,
            pattern,
            timezone,
            sample_data,
            options,
            instances: Default::default(),
        });
        self.timers.arm(
            super::timers::SCHEDULE_TICK,
            TimerEvent::ScheduleTick {
                worker: worker_name.to_string(),
                job: job_name.to_string(),
            },
        );
        if self.config.log {
            info!(worker = %worker_name, job = %job_name, "schedule job created");
        }
        Ok(())
    }
}
