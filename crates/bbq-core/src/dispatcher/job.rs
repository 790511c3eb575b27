//! Job descriptors, the callback variants, and the structured handle given
//! to callbacks.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::cron::CronPattern;
use crate::error::CreateJobError;
use crate::message::{canonical_form, Message, MessageEnvelope};

use super::config::{JobOptions, ScheduleJobOptions};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
pub type JobFn = Arc<dyn Fn(JobContext) -> Result<(), BoxError> + Send + Sync>;

/// Script extensions accepted for external callback modules. A module path
/// is judged by its extension at registration time; whether the file can
/// actually be spawned is the worker runtime's problem.
const SCRIPT_EXTENSIONS: &[&str] = &["sh", "bash", "js", "cjs", "mjs", "py", "rb", "pl"];

/// What a job runs: either a function in this process, or a script module
/// run in an isolated child process (the worker runtime).
#[derive(Clone)]
pub enum Callback {
    InProcess(JobFn),
    External(PathBuf),
}

impl Callback {
    pub fn in_process<F>(f: F) -> Self
    where
        F: Fn(JobContext) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Callback::InProcess(Arc::new(f))
    }

    pub fn external(path: impl Into<PathBuf>) -> Self {
        Callback::External(path.into())
    }

    /// Registration-time validation: an external callback must end in a
    /// recognized script extension. A missing file surfaces later as a
    /// worker runtime error when the attempt tries to spawn it.
    pub(crate) fn validate(&self) -> Result<(), CreateJobError> {
        match self {
            Callback::InProcess(_) => Ok(()),
            Callback::External(path) => {
                let recognized = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| {
                        SCRIPT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
                    });
                if recognized {
                    Ok(())
                } else {
                    Err(CreateJobError::CallbackInvalid(format!(
                        "{} does not end in a recognized script extension",
                        path.display()
                    )))
                }
            }
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::InProcess(_) => f.write_str("Callback::InProcess"),
            Callback::External(path) => write!(f, "Callback::External({})", path.display()),
        }
    }
}

/// The structured handle a callback receives. For external callbacks this is
/// serialized as one JSON document on the child's stdin.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobContext {
    /// Job instance id.
    pub id: Uuid,
    /// Job name.
    pub name: String,
    pub worker: String,
    /// Source queue name; `None` for schedule jobs.
    pub queue: Option<String>,
    pub options: JobOptions,
    /// Attempt start, ms since epoch.
    pub handle_at: u64,
    pub message: MessageEnvelope,
    /// 1-based attempt counter.
    pub tried: u32,
}

/// Which descriptor family an instance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Queue,
    Schedule,
}

/// One live execution of a job. Retries reuse the instance; it is destroyed
/// when the attempt chain settles.
#[derive(Debug, Clone)]
pub(crate) struct JobInstance {
    pub id: Uuid,
    pub envelope: MessageEnvelope,
    pub tried: u32,
}

/// Queue-bound job descriptor, owned by a worker.
pub(crate) struct JobState {
    pub name: String,
    pub queue_id: Uuid,
    pub queue_name: String,
    pub callback: Callback,
    pub options: JobOptions,
    /// Accepted-but-not-yet-started envelopes, arrival order.
    pub working_message: VecDeque<MessageEnvelope>,
    pub instances: HashMap<Uuid, JobInstance>,
}

impl JobState {
    /// Whether this job can accept another routed message.
    pub fn eligible(&self) -> bool {
        self.working_message.len() < self.options.working_message_count
    }

    pub fn has_free_instance_slot(&self) -> bool {
        self.instances.len() < self.options.concurrency
    }
}

/// Time-triggered job descriptor: no queue, a cron pattern and a constant
/// sample payload instead.
pub(crate) struct ScheduleJobState {
    pub name: String,
    pub callback: Callback,
    pub pattern: CronPattern,
    pub timezone: chrono_tz::Tz,
    pub sample_data: Value,
    pub options: ScheduleJobOptions,
    pub instances: HashMap<Uuid, JobInstance>,
}

impl ScheduleJobState {
    /// Mint the synthetic envelope for one tick: fresh id, cloned sample.
    pub fn synthetic_envelope(&self, now: u64) -> MessageEnvelope {
        // The sample was validated at registration, so canonical_form holds.
        let (kind, raw) = canonical_form(&self.sample_data)
            .unwrap_or((crate::message::PayloadKind::Object, String::new()));
        MessageEnvelope {
            message: Message {
                id: Message::new_id(),
                size: raw.len() as u64,
                path: String::new(),
                created_at: now,
                failed_at: None,
                failed_count: 0,
                kind,
            },
            queue_id: None,
            value: self.sample_data.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn external_callback_requires_a_recognized_script_extension() {
        // The module need not exist yet; the extension decides.
        assert!(Callback::external("/jobs/not-written-yet/handler.py")
            .validate()
            .is_ok());
        assert!(Callback::external("/jobs/module.SH").validate().is_ok());

        for path in ["/tmp/data.csv", "/usr/bin/env", "/jobs/handler"] {
            assert!(
                matches!(
                    Callback::external(path).validate(),
                    Err(CreateJobError::CallbackInvalid(_))
                ),
                "{path} should be rejected"
            );
        }
    }

    #[test]
    fn job_context_serializes_camel_case() {
        let ctx = JobContext {
            id: Uuid::now_v7(),
            name: "send-mail".to_string(),
            worker: "mailer".to_string(),
            queue: Some("outbox".to_string()),
            options: JobOptions::default(),
            handle_at: 1_700_000_000_000,
            message: MessageEnvelope {
                message: Message {
                    id: Message::new_id(),
                    size: 2,
                    path: "msgs/x.knmbbq".to_string(),
                    created_at: 1,
                    failed_at: None,
                    failed_count: 0,
                    kind: crate::message::PayloadKind::String,
                },
                queue_id: Some(Uuid::now_v7()),
                value: json!("hi"),
            },
            tried: 1,
        };
        let raw = serde_json::to_string(&ctx).unwrap();
        assert!(raw.contains("\"handleAt\""));
        assert!(raw.contains("\"queueId\""));
        assert!(raw.contains("\"workingMessageCount\""));
    }

    #[test]
    fn synthetic_envelopes_are_fresh_per_tick() {
        let sched = ScheduleJobState {
            name: "tick".to_string(),
            callback: Callback::in_process(|_| Ok(())),
            pattern: CronPattern::parse("minutely").unwrap(),
            timezone: chrono_tz::UTC,
            sample_data: json!({"k": 1}),
            options: ScheduleJobOptions::default(),
            instances: HashMap::new(),
        };
        let a = sched.synthetic_envelope(10);
        let b = sched.synthetic_envelope(20);
        assert_ne!(a.message.id, b.message.id);
        assert_eq!(a.value, json!({"k": 1}));
        assert_eq!(a.queue_id, None);
    }
}
