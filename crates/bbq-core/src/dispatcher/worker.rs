//! Worker descriptor: the registry of jobs and schedule jobs, plus the
//! per-queue observer flags that drive routing and back-pressure.

use std::collections::HashMap;

use uuid::Uuid;

use super::config::WorkerOptions;
use super::job::{JobState, ScheduleJobState};

pub(crate) struct WorkerState {
    pub name: String,
    pub options: WorkerOptions,
    /// Registration order is load-bearing: least-loaded selection breaks
    /// ties by first match.
    pub jobs: Vec<JobState>,
    pub schedule_jobs: Vec<ScheduleJobState>,
    /// queue id → accepting. `false` marks a paused (saturated) queue.
    pub observer_queue: HashMap<Uuid, bool>,
}

impl WorkerState {
    pub fn new(name: String, options: WorkerOptions) -> Self {
        Self {
            name,
            options,
            jobs: Vec::new(),
            schedule_jobs: Vec::new(),
            observer_queue: HashMap::new(),
        }
    }

    /// True iff this worker listens to the queue and is not paused.
    pub fn exist_observer_queue(&self, queue_id: Uuid) -> bool {
        self.observer_queue.get(&queue_id).copied().unwrap_or(false)
    }

    /// Pick the eligible job bound to this queue with the smallest working
    /// backlog; ties go to the earliest registered.
    pub fn select_job(&self, queue_id: Uuid) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (idx, job) in self.jobs.iter().enumerate() {
            if job.queue_id != queue_id || !job.eligible() {
                continue;
            }
            let load = job.working_message.len();
            match best {
                Some((_, best_load)) if best_load <= load => {}
                _ => best = Some((idx, load)),
            }
        }
        best.map(|(idx, _)| idx)
    }

    pub fn job_mut(&mut self, name: &str) -> Option<&mut JobState> {
        self.jobs.iter_mut().find(|j| j.name == name)
    }

    pub fn schedule_job_mut(&mut self, name: &str) -> Option<&mut ScheduleJobState> {
        self.schedule_jobs.iter_mut().find(|j| j.name == name)
    }

    /// Job names are unique across both descriptor families.
    pub fn has_job_name(&self, name: &str) -> bool {
        self.jobs.iter().any(|j| j.name == name)
            || self.schedule_jobs.iter().any(|j| j.name == name)
    }
}
