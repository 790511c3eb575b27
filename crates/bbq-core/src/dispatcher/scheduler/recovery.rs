use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::dispatcher::config::{DispatcherMeta, QueueDescriptor};
use crate::error::StorageResult;
use crate::queue::{QueueOptions, QueueState};
use crate::storage::paths;

use super::timers::TimerEvent;
use super::{now_ms, Scheduler};

impl Scheduler {
    /// Recover state after a restart.
    ///
    /// The dispatcher metadata is read *before* the fresh snapshot is
    /// written, so a crash mid-setup never loses the previous registry.
    /// Each restored queue runs its own setup: restore pipeline/fails from
    /// `metaq.json`, re-arm expiration timers, write a fresh snapshot, and
    /// rebroadcast everything (fails included) so in-flight work resumes.
    pub(super) fn recover(&mut self) -> StorageResult<()> {
        self.storage.ensure_dir(&self.root)?;

        let meta_path = self.root.join(paths::DISPATCHER_META_FILE);
        match self.storage.get_dispatcher_meta(&meta_path) {
            Ok(Some(meta)) => {
                self.created_at = meta.created_at;
                let count = meta.queues.len();
                for descriptor in meta.queues {
                    let name = descriptor.name.clone();
                    if let Err(e) = self.apply_queue(descriptor) {
                        warn!(queue = %name, error = %e, "failed to restore queue, skipping");
                    }
                }
                info!(queue_count = count, "recovery: queues restored");
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to read dispatcher metadata, starting fresh"),
        }

        self.write_dispatcher_meta();
        Ok(())
    }

    /// Re-register a persisted queue, re-using its id and path. Secret keys
    /// are never persisted, so the configured key is re-injected.
    fn apply_queue(&mut self, descriptor: QueueDescriptor) -> StorageResult<()> {
        let mut options = descriptor.options;
        options.secret_key = self.config.queue_option.secret_key.clone();
        self.setup_queue(
            descriptor.id,
            &descriptor.name,
            PathBuf::from(descriptor.path),
            options,
        )?;
        Ok(())
    }

    /// Queue.setup: ensure the directory, restore from an existing snapshot
    /// (reading before the fresh write), re-arm deletion timers relative to
    /// now, snapshot, and rebroadcast with fails. Returns the effective queue
    /// id — a persisted snapshot keeps its original identity.
    pub(super) fn setup_queue(
        &mut self,
        id: Uuid,
        name: &str,
        dir: PathBuf,
        options: QueueOptions,
    ) -> StorageResult<Uuid> {
        self.storage.ensure_dir(&dir)?;
        self.storage.ensure_dir(&dir.join(paths::MSG_DIR))?;

        let mut queue = QueueState::new(
            id,
            name.to_string(),
            dir,
            options,
            Arc::clone(&self.storage),
            now_ms(),
        );
        if let Some(meta) = queue.read_meta()? {
            queue.id = meta.id;
            queue.restore(meta);
        }
        queue.write_meta()?;

        // Re-arm expiration relative to now, clamped to at least 1 ms.
        let now = now_ms();
        let expire_ms = queue.options.expire.saturating_mul(1000);
        let mut pending = Vec::new();
        if expire_ms > 0 {
            let ids: Vec<(Uuid, u64)> = queue
                .pipeline
                .iter()
                .chain(queue.fails.iter())
                .map(|m| (m.id, m.created_at))
                .collect();
            for (msg_id, created_at) in ids {
                let remaining = expire_ms
                    .saturating_sub(now.saturating_sub(created_at))
                    .max(1);
                let gen = queue.arm_delete_timer(msg_id);
                pending.push((msg_id, remaining, gen));
            }
        }

        let queue_id = queue.id;
        self.queue_ids.insert(queue.name.clone(), queue_id);
        self.queues.insert(queue_id, queue);

        for (msg_id, remaining, gen) in pending {
            self.timers.arm(
                Duration::from_millis(remaining),
                TimerEvent::ExpireMessage {
                    queue_id,
                    msg_id,
                    gen,
                },
            );
        }

        // Resume in-flight work; unreadable payloads are logged and skipped.
        if let Err(e) = self.rebroadcast_queue(queue_id, true) {
            warn!(queue = %name, error = %e, "rebroadcast after setup failed");
        }
        Ok(queue_id)
    }

    /// Write the dispatcher metadata snapshot. IO failures are logged, not
    /// propagated — the next snapshot overwrites.
    pub(super) fn write_dispatcher_meta(&self) {
        let mut queues: Vec<QueueDescriptor> = self
            .queues
            .values()
            .map(|q| QueueDescriptor {
                id: q.id,
                name: q.name.clone(),
                path: q.dir.to_string_lossy().into_owned(),
                options: q.options.clone(),
            })
            .collect();
        queues.sort_by(|a, b| a.name.cmp(&b.name));

        let meta = DispatcherMeta {
            queues,
            created_at: self.created_at,
            path: self.root.to_string_lossy().into_owned(),
            secret: !self.config.queue_option.secret_key.is_empty(),
            log: self.config.log,
        };
        let meta_path = self.root.join(paths::DISPATCHER_META_FILE);
        if let Err(e) = self.storage.put_dispatcher_meta(&meta_path, &meta) {
            warn!(error = %e, "failed to write dispatcher metadata snapshot");
        }
    }
}
