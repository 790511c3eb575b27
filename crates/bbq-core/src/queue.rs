//! Durable named mailbox: the live pipeline, the fails list, payload
//! persistence with optional encryption, and metadata snapshots.
//!
//! `QueueState` owns its on-disk directory and all in-memory message
//! bookkeeping. Timer scheduling (expiration, deferred deletion, snapshot
//! debounce) lives in the scheduler; the queue tracks the generation counters
//! that invalidate superseded timers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::crypto::PayloadCipher;
use crate::error::{AddMessageError, StorageResult};
use crate::message::{canonical_form, decode_payload, Message, MessageEnvelope};
use crate::storage::{paths, Storage};

/// Per-queue configuration. Defaults mirror the dispatcher-level
/// `queueOption` defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct QueueOptions {
    /// Maximum serialized payload size in bytes.
    pub size: u64,
    /// Per-message lifetime in seconds; 0 disables expiration.
    pub expire: u64,
    /// Pipeline length cap; 0 disables the cap.
    pub limit: usize,
    /// Metadata snapshot debounce in milliseconds, floored at 1000.
    pub update_meta_time: u64,
    /// Delay before a message is re-emitted under back-pressure, in ms.
    pub rebroadcast_time: u64,
    /// Payload encryption key; empty disables encryption at rest.
    /// Never written to metadata snapshots.
    #[serde(skip_serializing)]
    pub secret_key: String,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            size: 2048,
            expire: 0,
            limit: 0,
            update_meta_time: 3000,
            rebroadcast_time: 2000,
            secret_key: String::new(),
        }
    }
}

/// Queue metadata snapshot (`metaq.json`). `secret` records whether a key is
/// configured, never the key itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMeta {
    pub id: Uuid,
    pub name: String,
    pub path: String,
    pub created_at: u64,
    pub size: u64,
    pub expire: u64,
    pub limit: usize,
    pub secret: bool,
    pub pipeline: Vec<Message>,
    pub fails: Vec<Message>,
}

/// Depth view returned by `queue_stats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub id: Uuid,
    pub name: String,
    pub pipeline: usize,
    pub fails: usize,
}

pub(crate) struct QueueState {
    pub id: Uuid,
    pub name: String,
    pub dir: PathBuf,
    pub created_at: u64,
    pub options: QueueOptions,
    /// Live messages, sorted by `created_at` ascending.
    pub pipeline: Vec<Message>,
    /// Failed messages awaiting operator action, same ordering.
    pub fails: Vec<Message>,
    storage: Arc<dyn Storage>,
    cipher: Option<PayloadCipher>,
    /// Pending deletion timer generation per message id. A fired timer whose
    /// generation no longer matches has been superseded and must not act.
    delete_gen: HashMap<Uuid, u64>,
    /// Debounced metadata writer generation, same invalidation scheme.
    meta_gen: u64,
    next_gen: u64,
}

impl QueueState {
    pub fn new(
        id: Uuid,
        name: String,
        dir: PathBuf,
        options: QueueOptions,
        storage: Arc<dyn Storage>,
        created_at: u64,
    ) -> Self {
        let cipher = PayloadCipher::from_secret(&options.secret_key);
        Self {
            id,
            name,
            dir,
            created_at,
            options,
            pipeline: Vec::new(),
            fails: Vec::new(),
            storage,
            cipher,
            delete_gen: HashMap::new(),
            meta_gen: 0,
            next_gen: 0,
        }
    }

    pub fn encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// Validate, persist, and append a new message. Returns the broadcast
    /// envelope carrying the plaintext value. On any validation or IO error
    /// the queue is left untouched.
    pub fn add_message(&mut self, value: &Value, now: u64) -> Result<MessageEnvelope, AddMessageError> {
        let (kind, raw) = canonical_form(value)?;

        if self.options.limit > 0 && self.pipeline.len() + 1 > self.options.limit {
            return Err(AddMessageError::QueueFull {
                limit: self.options.limit,
            });
        }

        let size = raw.len() as u64;
        if size > self.options.size {
            return Err(AddMessageError::MessageTooLarge {
                size,
                limit: self.options.size,
            });
        }

        let id = Message::new_id();
        let rel_path = paths::message_rel_path(&id);
        let contents = match &self.cipher {
            Some(cipher) => cipher.encrypt(&raw),
            None => raw,
        };
        self.storage
            .put_payload(&paths::message_file(&self.dir, &rel_path), &contents)
            .map_err(AddMessageError::Storage)?;

        let message = Message {
            id,
            size,
            path: rel_path,
            created_at: now,
            failed_at: None,
            failed_count: 0,
            kind,
        };
        insert_sorted(&mut self.pipeline, message.clone());

        Ok(MessageEnvelope {
            message,
            queue_id: Some(self.id),
            value: value.clone(),
        })
    }

    /// Move a message from the pipeline to the fails list. A message already
    /// in fails is returned unchanged; unknown ids return `None`.
    pub fn mark_failed(&mut self, msg_id: Uuid, now: u64) -> Option<Message> {
        if let Some(existing) = self.fails.iter().find(|m| m.id == msg_id) {
            return Some(existing.clone());
        }
        let idx = self.pipeline.iter().position(|m| m.id == msg_id)?;
        let mut message = self.pipeline.remove(idx);
        message.failed_at = Some(now);
        message.failed_count += 1;
        insert_sorted(&mut self.fails, message.clone());
        Some(message)
    }

    /// Remove a message from the fails list and hand its decrypted envelope
    /// to the caller, deleting the payload file. `None` if absent.
    pub fn take_fail(&mut self, msg_id: Uuid) -> StorageResult<Option<MessageEnvelope>> {
        let Some(idx) = self.fails.iter().position(|m| m.id == msg_id) else {
            return Ok(None);
        };
        let message = self.fails.remove(idx);
        let envelope = self.read_envelope(&message)?;
        self.storage
            .delete_payload(&paths::message_file(&self.dir, &message.path))?;
        self.delete_gen.remove(&msg_id);
        Ok(Some(envelope))
    }

    /// Remove a message from whichever list holds it and delete its payload
    /// file. Returns whether anything was removed.
    pub fn remove_message(&mut self, msg_id: Uuid) -> StorageResult<bool> {
        let message = if let Some(idx) = self.pipeline.iter().position(|m| m.id == msg_id) {
            self.pipeline.remove(idx)
        } else if let Some(idx) = self.fails.iter().position(|m| m.id == msg_id) {
            self.fails.remove(idx)
        } else {
            return Ok(false);
        };
        self.storage
            .delete_payload(&paths::message_file(&self.dir, &message.path))?;
        self.delete_gen.remove(&msg_id);
        Ok(true)
    }

    /// Read and decrypt a message payload from disk, producing a broadcast
    /// envelope.
    pub fn read_envelope(&self, message: &Message) -> StorageResult<MessageEnvelope> {
        let contents = self
            .storage
            .get_payload(&paths::message_file(&self.dir, &message.path))?;
        let raw = match &self.cipher {
            Some(cipher) => cipher.decrypt(&contents)?,
            None => contents,
        };
        let value = decode_payload(message.kind, &raw)?;
        Ok(MessageEnvelope {
            message: message.clone(),
            queue_id: Some(self.id),
            value,
        })
    }

    pub fn find(&self, msg_id: Uuid) -> Option<&Message> {
        self.pipeline
            .iter()
            .chain(self.fails.iter())
            .find(|m| m.id == msg_id)
    }

    /// Arm (or re-arm, cancelling the previous) a deletion timer for a
    /// message. Returns the generation the timer event must carry.
    pub fn arm_delete_timer(&mut self, msg_id: Uuid) -> u64 {
        self.next_gen += 1;
        self.delete_gen.insert(msg_id, self.next_gen);
        self.next_gen
    }

    /// Whether a fired deletion timer is still current.
    pub fn delete_timer_current(&self, msg_id: Uuid, gen: u64) -> bool {
        self.delete_gen.get(&msg_id) == Some(&gen)
    }

    /// Invalidate any pending metadata writer and return the generation for
    /// the re-armed debounce timer.
    pub fn bump_meta_gen(&mut self) -> u64 {
        self.meta_gen += 1;
        self.meta_gen
    }

    pub fn meta_gen_current(&self, gen: u64) -> bool {
        self.meta_gen == gen
    }

    /// Snapshot debounce delay, floored at one second.
    pub fn meta_debounce_ms(&self) -> u64 {
        self.options.update_meta_time.max(1000)
    }

    pub fn snapshot(&self) -> QueueMeta {
        QueueMeta {
            id: self.id,
            name: self.name.clone(),
            path: self.dir.to_string_lossy().into_owned(),
            created_at: self.created_at,
            size: self.options.size,
            expire: self.options.expire,
            limit: self.options.limit,
            secret: self.encrypted(),
            pipeline: self.pipeline.clone(),
            fails: self.fails.clone(),
        }
    }

    /// Write the metadata snapshot now.
    pub fn write_meta(&self) -> StorageResult<()> {
        self.storage
            .put_queue_meta(&self.dir.join(paths::QUEUE_META_FILE), &self.snapshot())
    }

    /// Read a previously persisted snapshot, if any.
    pub fn read_meta(&self) -> StorageResult<Option<QueueMeta>> {
        self.storage
            .get_queue_meta(&self.dir.join(paths::QUEUE_META_FILE))
    }

    /// Restore pipeline and fails from a snapshot, re-sorting both. Messages
    /// whose payload file has gone missing are dropped with a warning.
    pub fn restore(&mut self, meta: QueueMeta) {
        self.created_at = meta.created_at;
        let storage = Arc::clone(&self.storage);
        let dir = self.dir.clone();
        let name = self.name.clone();
        let keep = move |m: &Message| {
            let exists = storage.payload_exists(&paths::message_file(&dir, &m.path));
            if !exists {
                tracing::warn!(queue = %name, msg_id = %m.id, "dropping message with missing payload file");
            }
            exists
        };
        self.pipeline = meta.pipeline.into_iter().filter(|m| keep(m)).collect();
        self.fails = meta.fails.into_iter().filter(|m| keep(m)).collect();
        self.pipeline.sort_by_key(|m| m.created_at);
        self.fails.sort_by_key(|m| m.created_at);
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            id: self.id,
            name: self.name.clone(),
            pipeline: self.pipeline.len(),
            fails: self.fails.len(),
        }
    }
}

/// Insert preserving `created_at` ascending order; equal timestamps keep
/// insertion order.
fn insert_sorted(list: &mut Vec<Message>, message: Message) {
    let pos = list.partition_point(|m| m.created_at <= message.created_at);
    list.insert(pos, message);
}
