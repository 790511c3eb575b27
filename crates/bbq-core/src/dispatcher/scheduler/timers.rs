//! The scheduler's timer wheel and timer-event handling.
//!
//! Every suspension the coordination layer needs — message expiration, the
//! debounced metadata writer, the 1 s done-delay, retry delays, rebroadcast
//! delays, the 60 s schedule tick, and the worker interval pass — is an entry
//! in one binary heap. Re-armable timers are invalidated by generation
//! counters checked at fire time instead of being removed from the heap.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use uuid::Uuid;

use super::Scheduler;

pub(super) const DONE_DELETE_DELAY: Duration = Duration::from_secs(1);
pub(super) const SCHEDULE_TICK: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub(super) enum TimerEvent {
    /// Per-message expiration (or re-armed deferred deletion after restart).
    ExpireMessage { queue_id: Uuid, msg_id: Uuid, gen: u64 },
    /// 1 s deferred deletion after `done`.
    DoneDelete { queue_id: Uuid, msg_id: Uuid, gen: u64 },
    /// Debounced queue metadata snapshot.
    QueueSnapshot { queue_id: Uuid, gen: u64 },
    /// Back-pressure / no-worker re-emission of one message.
    Rebroadcast { queue_id: Uuid, msg_id: Uuid },
    /// Delayed retry of a settled-failed attempt.
    RetryAttempt {
        worker: String,
        job: String,
        kind: crate::dispatcher::job::JobKind,
        instance_id: Uuid,
    },
    /// 60 s cron evaluation tick for one schedule job.
    ScheduleTick { worker: String, job: String },
    /// Legacy interval dispatch pass for one worker.
    WorkerInterval { worker: String },
}

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    event: TimerEvent,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}
impl Eq for TimerEntry {}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

/// Min-heap of pending timers, FIFO among equal deadlines.
#[derive(Default)]
pub(super) struct TimerWheel {
    heap: BinaryHeap<Reverse<TimerEntry>>,
    seq: u64,
}

impl TimerWheel {
    pub fn arm(&mut self, delay: Duration, event: TimerEvent) {
        self.seq += 1;
        self.heap.push(Reverse(TimerEntry {
            deadline: Instant::now() + delay,
            seq: self.seq,
            event,
        }));
    }

    /// Time until the earliest pending timer, `None` when the wheel is empty.
    pub fn until_next(&self) -> Option<Duration> {
        self.heap
            .peek()
            .map(|Reverse(e)| e.deadline.saturating_duration_since(Instant::now()))
    }

    /// Pop the next due timer, if any.
    pub fn pop_due(&mut self, now: Instant) -> Option<TimerEvent> {
        if self.heap.peek().is_some_and(|Reverse(e)| e.deadline <= now) {
            self.heap.pop().map(|Reverse(e)| e.event)
        } else {
            None
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

impl Scheduler {
    /// Fire every due timer. Stale generations and vanished queues/jobs are
    /// silently skipped — a fired timer never errors the loop.
    pub(super) fn fire_due_timers(&mut self) {
        let now = Instant::now();
        while let Some(event) = self.timers.pop_due(now) {
            self.handle_timer(event);
        }
    }

    pub(super) fn handle_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::ExpireMessage { queue_id, msg_id, gen }
            | TimerEvent::DoneDelete { queue_id, msg_id, gen } => {
                let Some(queue) = self.queues.get_mut(&queue_id) else {
                    return;
                };
                if !queue.delete_timer_current(msg_id, gen) {
                    return;
                }
                let name = queue.name.clone();
                let removed = queue.remove_message(msg_id);
                match removed {
                    Ok(true) => {
                        debug!(queue = %name, %msg_id, "message removed by timer");
                        self.trigger_queue_snapshot(queue_id);
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(queue = %name, %msg_id, error = %e, "failed to remove message")
                    }
                }
            }
            TimerEvent::QueueSnapshot { queue_id, gen } => {
                let Some(queue) = self.queues.get(&queue_id) else {
                    return;
                };
                if !queue.meta_gen_current(gen) {
                    return;
                }
                // Snapshot IO failures are logged, never propagated — the
                // next trigger overwrites.
                if let Err(e) = queue.write_meta() {
                    warn!(queue = %queue.name, error = %e, "failed to write queue metadata snapshot");
                }
            }
            TimerEvent::Rebroadcast { queue_id, msg_id } => {
                let envelope = {
                    let Some(queue) = self.queues.get(&queue_id) else {
                        return;
                    };
                    let Some(message) = queue.find(msg_id).cloned() else {
                        // Deleted or taken over in the meantime.
                        return;
                    };
                    match queue.read_envelope(&message) {
                        Ok(envelope) => envelope,
                        Err(e) => {
                            warn!(queue = %queue.name, %msg_id, error = %e, "failed to re-read message for rebroadcast");
                            return;
                        }
                    }
                };
                self.listen(queue_id, envelope);
            }
            TimerEvent::RetryAttempt {
                worker,
                job,
                kind,
                instance_id,
            } => self.retry_attempt(&worker, &job, kind, instance_id),
            TimerEvent::ScheduleTick { worker, job } => self.schedule_tick(&worker, &job),
            TimerEvent::WorkerInterval { worker } => self.worker_interval(&worker),
        }
    }
}
