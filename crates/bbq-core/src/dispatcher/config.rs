use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::queue::QueueOptions;

/// Top-level dispatcher configuration. Unknown keys are rejected rather than
/// silently ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct DispatcherConfig {
    /// Root directory for persistence.
    pub path: PathBuf,
    /// Gate info-level lifecycle logging.
    pub log: bool,
    /// Defaults applied to queues created without explicit options.
    pub queue_option: QueueOptions,
    /// Bound on the inbound command channel.
    pub command_channel_capacity: usize,
    /// How long the scheduler parks waiting for a command when no timer is
    /// due sooner, in milliseconds.
    pub idle_timeout_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("bbq"),
            log: false,
            queue_option: QueueOptions::default(),
            command_channel_capacity: 10_000,
            idle_timeout_ms: 100,
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct WorkerOptions {
    pub log: bool,
    /// Routing precedence: higher priority workers are offered messages
    /// first. Ties keep registration order.
    pub priority: i32,
    /// Period of the legacy interval dispatch pass, in milliseconds. Each
    /// tick re-kicks every job's concurrency loop.
    pub interval_run_job: u64,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            log: false,
            priority: 1,
            interval_run_job: 2000,
        }
    }
}

/// Per-job configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct JobOptions {
    pub log: bool,
    /// Additional attempts after the first failure (`retry + 1` total).
    pub retry: u32,
    /// Per-attempt timeout in milliseconds.
    pub timeout: u64,
    /// Delay before a retry attempt, in milliseconds.
    pub retry_after: u64,
    /// Compatibility knob carried from the original options surface; the
    /// scheduler does not fan out per-listener state.
    pub max_listeners: u32,
    /// Cap on concurrently live instances of this job.
    pub concurrency: usize,
    /// Cap on accepted-but-not-yet-started messages.
    pub working_message_count: usize,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            log: false,
            retry: 0,
            timeout: 60_000,
            retry_after: 30_000,
            max_listeners: 100,
            concurrency: 20,
            working_message_count: 100,
        }
    }
}

/// Schedule-job configuration: the job surface minus the working-message cap
/// (schedule jobs have no inbound queue), plus a timezone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct ScheduleJobOptions {
    pub log: bool,
    pub retry: u32,
    pub timeout: u64,
    pub retry_after: u64,
    pub max_listeners: u32,
    pub concurrency: usize,
    /// IANA timezone name the cron pattern is evaluated in.
    pub timezone: String,
}

impl Default for ScheduleJobOptions {
    fn default() -> Self {
        Self {
            log: false,
            retry: 0,
            timeout: 60_000,
            retry_after: 30_000,
            max_listeners: 100,
            concurrency: 20,
            timezone: "UTC".to_string(),
        }
    }
}

impl ScheduleJobOptions {
    /// The job-shaped view handed to callbacks.
    pub fn as_job_options(&self) -> JobOptions {
        JobOptions {
            log: self.log,
            retry: self.retry,
            timeout: self.timeout,
            retry_after: self.retry_after,
            max_listeners: self.max_listeners,
            concurrency: self.concurrency,
            working_message_count: 0,
        }
    }
}

/// Dispatcher metadata snapshot (`metabbq.json`). `secret` records whether
/// the configured queue defaults carry a key; queue options serialize without
/// their key either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherMeta {
    pub queues: Vec<QueueDescriptor>,
    pub created_at: u64,
    pub path: String,
    pub secret: bool,
    pub log: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueDescriptor {
    pub id: Uuid,
    pub name: String,
    pub path: String,
    pub options: QueueOptions,
}
