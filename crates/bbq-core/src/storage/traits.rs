use std::path::Path;

use crate::dispatcher::config::DispatcherMeta;
use crate::error::StorageResult;
use crate::queue::QueueMeta;

/// Storage trait for all persistence operations. Implementations must be
/// thread-safe.
///
/// All methods return `StorageResult` — only infrastructure errors (IO,
/// serialization) are possible. Domain errors (queue not found, etc.) are
/// handled at the scheduler layer.
pub trait Storage: Send + Sync {
    // --- Directories ---

    /// Create a directory and its parents if missing.
    fn ensure_dir(&self, path: &Path) -> StorageResult<()>;

    /// Recursively remove a directory. Missing directories are not an error.
    fn remove_dir(&self, path: &Path) -> StorageResult<()>;

    // --- Payload files ---

    /// Write a payload file (plaintext or hex ciphertext, always UTF-8).
    fn put_payload(&self, path: &Path, contents: &str) -> StorageResult<()>;

    /// Read a payload file.
    fn get_payload(&self, path: &Path) -> StorageResult<String>;

    /// Delete a payload file. Missing files are not an error — deletion races
    /// after done/expire are harmless.
    fn delete_payload(&self, path: &Path) -> StorageResult<()>;

    /// Whether a payload file currently exists.
    fn payload_exists(&self, path: &Path) -> bool;

    // --- Metadata snapshots ---

    /// Write a queue metadata snapshot (`metaq.json`).
    fn put_queue_meta(&self, path: &Path, meta: &QueueMeta) -> StorageResult<()>;

    /// Read a queue metadata snapshot, `None` if the file does not exist.
    fn get_queue_meta(&self, path: &Path) -> StorageResult<Option<QueueMeta>>;

    /// Write the dispatcher metadata snapshot (`metabbq.json`).
    fn put_dispatcher_meta(&self, path: &Path, meta: &DispatcherMeta) -> StorageResult<()>;

    /// Read the dispatcher metadata snapshot, `None` if the file does not exist.
    fn get_dispatcher_meta(&self, path: &Path) -> StorageResult<Option<DispatcherMeta>>;
}
