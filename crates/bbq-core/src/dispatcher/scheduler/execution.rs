//! Job attempt execution, off the scheduler thread.
//!
//! In-process callbacks run on their own thread and race a
//! `recv_timeout` deadline; a callback that outlives its timeout is
//! abandoned. External callbacks spawn a child process (the worker runtime),
//! receive the job context as JSON on stdin, and are killed on timeout.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;
use uuid::Uuid;

use crate::dispatcher::command::DispatcherCommand;
use crate::dispatcher::job::{Callback, JobContext, JobKind};
use crate::error::AttemptError;

use super::Scheduler;

const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(10);

impl Scheduler {
    /// Run one attempt on a fresh thread; the settlement comes back through
    /// the command channel.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn spawn_attempt(
        &self,
        worker: String,
        job: String,
        kind: JobKind,
        instance_id: Uuid,
        callback: Callback,
        ctx: JobContext,
        timeout_ms: u64,
    ) {
        let tx = self.internal_tx.clone();
        let (worker_name, job_name) = (worker.clone(), job.clone());
        let spawned = thread::Builder::new()
            .name(format!("bbq-attempt-{job}"))
            .spawn(move || {
                let outcome = run_attempt(callback, ctx, Duration::from_millis(timeout_ms));
                let _ = tx.send(DispatcherCommand::AttemptSettled {
                    worker,
                    job,
                    kind,
                    instance_id,
                    outcome,
                });
            });

        if let Err(e) = spawned {
            warn!(worker = %worker_name, job = %job_name, error = %e, "failed to spawn attempt thread");
            // try_send: the scheduler drains this channel itself, so a
            // blocking send here could never complete on a full channel.
            let _ = self.internal_tx.try_send(DispatcherCommand::AttemptSettled {
                worker: worker_name,
                job: job_name,
                kind,
                instance_id,
                outcome: Err(AttemptError::Runtime(e.to_string())),
            });
        }
    }
}

/// Execute the callback under the per-attempt timeout.
fn run_attempt(callback: Callback, ctx: JobContext, timeout: Duration) -> Result<(), AttemptError> {
    match callback {
        Callback::InProcess(f) => {
            let (tx, rx) = crossbeam_channel::bounded(1);
            let spawned = thread::Builder::new()
                .name("bbq-callback".to_string())
                .spawn(move || {
                    let _ = tx.send(f(ctx).map_err(|e| e.to_string()));
                });
            if let Err(e) = spawned {
                return Err(AttemptError::Runtime(e.to_string()));
            }
            match rx.recv_timeout(timeout) {
                Ok(Ok(())) => Ok(()),
                Ok(Err(message)) => Err(AttemptError::Callback(message)),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    Err(AttemptError::Timeout(timeout.as_millis() as u64))
                }
                // The callback thread dropped the sender without sending — it
                // panicked.
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    Err(AttemptError::Callback("callback panicked".to_string()))
                }
            }
        }
        Callback::External(path) => run_external(&path, &ctx, timeout),
    }
}

/// Run a callback module in an isolated child process. Exit status 0 is
/// success; anything else fails with the captured stderr.
fn run_external(path: &Path, ctx: &JobContext, timeout: Duration) -> Result<(), AttemptError> {
    let payload = serde_json::to_string(ctx)
        .map_err(|e| AttemptError::Runtime(format!("failed to serialize job context: {e}")))?;

    let mut child = Command::new(path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| AttemptError::Runtime(format!("failed to start worker runtime: {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        // A runtime that exits without reading closes the pipe; its exit
        // status is what decides the outcome.
        let _ = stdin.write_all(payload.as_bytes());
    }

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                if status.success() {
                    return Ok(());
                }
                let mut stderr = String::new();
                if let Some(mut pipe) = child.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr);
                }
                let detail = if stderr.trim().is_empty() {
                    format!("worker runtime exited with {status}")
                } else {
                    stderr.trim().to_string()
                };
                return Err(AttemptError::Callback(detail));
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(AttemptError::Timeout(timeout.as_millis() as u64));
                }
                thread::sleep(CHILD_POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AttemptError::Runtime(e.to_string()));
            }
        }
    }
}
