//! Message routing: Dispatcher.listen → Worker.run → Job dispatch, plus
//! attempt settlement, retries, schedule ticks, and the interval pass.

use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dispatcher::job::{JobContext, JobInstance, JobKind};
use crate::error::AttemptError;
use crate::message::MessageEnvelope;

use super::timers::{TimerEvent, DONE_DELETE_DELAY, SCHEDULE_TICK};
use super::{now_ms, Scheduler};

impl Scheduler {
    /// Offer an envelope to workers in priority order; the first observing
    /// worker takes it. With no observer, the message is re-emitted after the
    /// queue's rebroadcast delay.
    pub(super) fn listen(&mut self, queue_id: Uuid, envelope: MessageEnvelope) {
        for idx in 0..self.workers.len() {
            if self.workers[idx].exist_observer_queue(queue_id) {
                self.worker_run(idx, queue_id, envelope);
                return;
            }
        }
        self.arm_rebroadcast(queue_id, envelope.message.id);
    }

    fn arm_rebroadcast(&mut self, queue_id: Uuid, msg_id: Uuid) {
        let Some(queue) = self.queues.get(&queue_id) else {
            return;
        };
        let delay = Duration::from_millis(queue.options.rebroadcast_time);
        self.timers
            .arm(delay, TimerEvent::Rebroadcast { queue_id, msg_id });
    }

    /// Worker.run: accept the envelope into the least-loaded eligible job, or
    /// pause this queue's observer and ask for a rebroadcast.
    fn worker_run(&mut self, worker_idx: usize, queue_id: Uuid, envelope: MessageEnvelope) {
        let msg_id = envelope.message.id;
        let selected = self.workers[worker_idx].select_job(queue_id);
        let Some(job_idx) = selected else {
            // Every job on this queue is saturated: stop observing and let
            // the queue resend later.
            let worker = &mut self.workers[worker_idx];
            worker.observer_queue.insert(queue_id, false);
            if worker.options.log {
                debug!(worker = %worker.name, %queue_id, %msg_id, "worker saturated, pausing queue observer");
            }
            self.arm_rebroadcast(queue_id, msg_id);
            return;
        };
        self.workers[worker_idx].jobs[job_idx]
            .working_message
            .push_back(envelope);
        self.kick_job(worker_idx, job_idx);
    }

    /// Drain the job's working messages into new instances while concurrency
    /// permits. Accepting a message unpauses its source queue (down_message).
    pub(super) fn kick_job(&mut self, worker_idx: usize, job_idx: usize) {
        loop {
            let spawn = {
                let worker = &mut self.workers[worker_idx];
                let worker_name = worker.name.clone();
                let job = &mut worker.jobs[job_idx];
                if !job.has_free_instance_slot() {
                    None
                } else if let Some(envelope) = job.working_message.pop_front() {
                    let instance_id = Uuid::now_v7();
                    job.instances.insert(
                        instance_id,
                        JobInstance {
                            id: instance_id,
                            envelope: envelope.clone(),
                            tried: 1,
                        },
                    );
                    if job.options.log {
                        info!(worker = %worker_name, job = %job.name, msg_id = %envelope.message.id, "message accepted");
                    }
                    let ctx = JobContext {
                        id: instance_id,
                        name: job.name.clone(),
                        worker: worker_name.clone(),
                        queue: Some(job.queue_name.clone()),
                        options: job.options.clone(),
                        handle_at: now_ms(),
                        message: envelope.clone(),
                        tried: 1,
                    };
                    let callback = job.callback.clone();
                    let timeout = job.options.timeout;
                    let job_name = job.name.clone();
                    // down_message: the accepted message no longer counts
                    // against the working cap, so the queue may resume.
                    if let Some(qid) = envelope.queue_id {
                        worker.observer_queue.insert(qid, true);
                    }
                    Some((worker_name, job_name, instance_id, callback, ctx, timeout))
                } else {
                    None
                }
            };
            match spawn {
                Some((worker, job, instance_id, callback, ctx, timeout)) => {
                    self.spawn_attempt(worker, job, JobKind::Queue, instance_id, callback, ctx, timeout);
                }
                None => break,
            }
        }
    }

    /// An attempt thread reported back. Success releases the instance and
    /// schedules the message's deferred deletion; failure routes the message
    /// to fails and either arms a retry or settles terminally.
    pub(super) fn attempt_settled(
        &mut self,
        worker_name: &str,
        job_name: &str,
        kind: JobKind,
        instance_id: Uuid,
        outcome: Result<(), AttemptError>,
    ) {
        match kind {
            JobKind::Queue => self.queue_attempt_settled(worker_name, job_name, instance_id, outcome),
            JobKind::Schedule => {
                self.schedule_attempt_settled(worker_name, job_name, instance_id, outcome)
            }
        }
    }

    fn queue_attempt_settled(
        &mut self,
        worker_name: &str,
        job_name: &str,
        instance_id: Uuid,
        outcome: Result<(), AttemptError>,
    ) {
        let Some(worker_idx) = self.workers.iter().position(|w| w.name == worker_name) else {
            return;
        };
        let Some(job_idx) = self.workers[worker_idx]
            .jobs
            .iter()
            .position(|j| j.name == job_name)
        else {
            return;
        };

        enum Next {
            Done { queue_id: Option<Uuid>, msg_id: Uuid },
            Retry { queue_id: Option<Uuid>, msg_id: Uuid, retry_after: u64 },
            Terminal { queue_id: Option<Uuid>, msg_id: Uuid },
        }

        let next = {
            let job = &mut self.workers[worker_idx].jobs[job_idx];
            let Some(instance) = job.instances.get(&instance_id) else {
                return;
            };
            let queue_id = instance.envelope.queue_id;
            let msg_id = instance.envelope.message.id;
            let tried = instance.tried;
            match outcome {
                Ok(()) => {
                    // down_instance, then Queue.done.
                    job.instances.remove(&instance_id);
                    Next::Done { queue_id, msg_id }
                }
                Err(e) => {
                    warn!(worker = %worker_name, job = %job_name, %msg_id, tried, error = %e, "job attempt failed");
                    if tried < job.options.retry + 1 {
                        Next::Retry {
                            queue_id,
                            msg_id,
                            retry_after: job.options.retry_after,
                        }
                    } else {
                        job.instances.remove(&instance_id);
                        Next::Terminal { queue_id, msg_id }
                    }
                }
            }
        };

        match next {
            Next::Done { queue_id, msg_id } => {
                if let Some(queue_id) = queue_id {
                    self.queue_done(queue_id, msg_id);
                }
                self.kick_job(worker_idx, job_idx);
            }
            Next::Retry {
                queue_id,
                msg_id,
                retry_after,
            } => {
                if let Some(queue_id) = queue_id {
                    self.queue_fail(queue_id, msg_id);
                }
                self.timers.arm(
                    Duration::from_millis(retry_after),
                    TimerEvent::RetryAttempt {
                        worker: worker_name.to_string(),
                        job: job_name.to_string(),
                        kind: JobKind::Queue,
                        instance_id,
                    },
                );
            }
            Next::Terminal { queue_id, msg_id } => {
                if let Some(queue_id) = queue_id {
                    self.queue_fail(queue_id, msg_id);
                }
                self.kick_job(worker_idx, job_idx);
            }
        }
    }

    fn schedule_attempt_settled(
        &mut self,
        worker_name: &str,
        job_name: &str,
        instance_id: Uuid,
        outcome: Result<(), AttemptError>,
    ) {
        let retry_after = {
            let Some(worker) = self.worker_mut(worker_name) else {
                return;
            };
            let Some(job) = worker.schedule_job_mut(job_name) else {
                return;
            };
            let Some(instance) = job.instances.get(&instance_id) else {
                return;
            };
            let tried = instance.tried;
            match outcome {
                Ok(()) => {
                    job.instances.remove(&instance_id);
                    None
                }
                Err(e) => {
                    warn!(worker = %worker_name, job = %job_name, tried, error = %e, "schedule job attempt failed");
                    if tried < job.options.retry + 1 {
                        Some(job.options.retry_after)
                    } else {
                        job.instances.remove(&instance_id);
                        None
                    }
                }
            }
        };

        if let Some(retry_after) = retry_after {
            self.timers.arm(
                Duration::from_millis(retry_after),
                TimerEvent::RetryAttempt {
                    worker: worker_name.to_string(),
                    job: job_name.to_string(),
                    kind: JobKind::Schedule,
                    instance_id,
                },
            );
        }
    }

    /// Queue.done: deletion is deferred by one second so late cleanup races
    /// after callback completion stay harmless.
    fn queue_done(&mut self, queue_id: Uuid, msg_id: Uuid) {
        let Some(queue) = self.queues.get_mut(&queue_id) else {
            return;
        };
        let gen = queue.arm_delete_timer(msg_id);
        self.timers.arm(
            DONE_DELETE_DELAY,
            TimerEvent::DoneDelete {
                queue_id,
                msg_id,
                gen,
            },
        );
    }

    /// Queue.fail: move the message into the fails list. Failing an already
    /// failed message leaves the record unchanged.
    fn queue_fail(&mut self, queue_id: Uuid, msg_id: Uuid) {
        let failed = {
            let Some(queue) = self.queues.get_mut(&queue_id) else {
                return;
            };
            queue.mark_failed(msg_id, now_ms())
        };
        if failed.is_some() {
            self.trigger_queue_snapshot(queue_id);
        }
    }

    /// A retry timer fired: re-run the attempt on the same instance. Retries
    /// do not touch working messages or observers.
    pub(super) fn retry_attempt(
        &mut self,
        worker_name: &str,
        job_name: &str,
        kind: JobKind,
        instance_id: Uuid,
    ) {
        let Some(worker) = self.worker_mut(worker_name) else {
            return;
        };
        let worker_owned = worker.name.clone();

        let spawn = match kind {
            JobKind::Queue => worker.job_mut(job_name).and_then(|job| {
                let instance = job.instances.get_mut(&instance_id)?;
                instance.tried += 1;
                Some((
                    job.callback.clone(),
                    JobContext {
                        id: instance_id,
                        name: job.name.clone(),
                        worker: worker_owned.clone(),
                        queue: Some(job.queue_name.clone()),
                        options: job.options.clone(),
                        handle_at: now_ms(),
                        message: instance.envelope.clone(),
                        tried: instance.tried,
                    },
                    job.options.timeout,
                ))
            }),
            JobKind::Schedule => worker.schedule_job_mut(job_name).and_then(|job| {
                let instance = job.instances.get_mut(&instance_id)?;
                instance.tried += 1;
                Some((
                    job.callback.clone(),
                    JobContext {
                        id: instance_id,
                        name: job.name.clone(),
                        worker: worker_owned.clone(),
                        queue: None,
                        options: job.options.as_job_options(),
                        handle_at: now_ms(),
                        message: instance.envelope.clone(),
                        tried: instance.tried,
                    },
                    job.options.timeout,
                ))
            }),
        };

        if let Some((callback, ctx, timeout)) = spawn {
            self.spawn_attempt(
                worker_owned,
                job_name.to_string(),
                kind,
                instance_id,
                callback,
                ctx,
                timeout,
            );
        }
    }

    /// The one-minute tick for a schedule job: re-arm, evaluate the cron
    /// match, and start an instance if concurrency permits.
    pub(super) fn schedule_tick(&mut self, worker_name: &str, job_name: &str) {
        let registered = self
            .worker(worker_name)
            .is_some_and(|w| w.schedule_jobs.iter().any(|j| j.name == job_name));
        if !registered {
            return;
        }

        // Re-arm before evaluating the pattern.
        self.timers.arm(
            SCHEDULE_TICK,
            TimerEvent::ScheduleTick {
                worker: worker_name.to_string(),
                job: job_name.to_string(),
            },
        );

        let spawn = {
            let Some(worker) = self.worker_mut(worker_name) else {
                return;
            };
            let worker_owned = worker.name.clone();
            let Some(job) = worker.schedule_job_mut(job_name) else {
                return;
            };
            if !job.pattern.is_time_to_run(job.timezone, chrono::Utc::now()) {
                None
            } else if job.instances.len() >= job.options.concurrency {
                debug!(worker = %worker_owned, job = %job_name, "schedule tick skipped, concurrency cap reached");
                None
            } else {
                let envelope = job.synthetic_envelope(now_ms());
                let instance_id = Uuid::now_v7();
                job.instances.insert(
                    instance_id,
                    JobInstance {
                        id: instance_id,
                        envelope: envelope.clone(),
                        tried: 1,
                    },
                );
                Some((
                    worker_owned.clone(),
                    job.callback.clone(),
                    JobContext {
                        id: instance_id,
                        name: job.name.clone(),
                        worker: worker_owned,
                        queue: None,
                        options: job.options.as_job_options(),
                        handle_at: now_ms(),
                        message: envelope,
                        tried: 1,
                    },
                    job.options.timeout,
                    instance_id,
                ))
            }
        };

        if let Some((worker_owned, callback, ctx, timeout, instance_id)) = spawn {
            self.spawn_attempt(
                worker_owned,
                job_name.to_string(),
                JobKind::Schedule,
                instance_id,
                callback,
                ctx,
                timeout,
            );
        }
    }

    /// Legacy interval dispatch pass: re-kick every job so working messages
    /// drain even without a fresh routing event.
    pub(super) fn worker_interval(&mut self, worker_name: &str) {
        let Some(worker_idx) = self.workers.iter().position(|w| w.name == worker_name) else {
            return;
        };
        let interval = self.workers[worker_idx].options.interval_run_job;
        self.timers.arm(
            Duration::from_millis(interval),
            TimerEvent::WorkerInterval {
                worker: worker_name.to_string(),
            },
        );
        for job_idx in 0..self.workers[worker_idx].jobs.len() {
            self.kick_job(worker_idx, job_idx);
        }
    }
}
