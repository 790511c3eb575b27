use std::fs;
use std::path::Path;

use crate::dispatcher::config::DispatcherMeta;
use crate::error::StorageResult;
use crate::queue::QueueMeta;

use super::Storage;

/// Filesystem-backed storage. All state lives under the dispatcher root
/// directory; snapshots are plain JSON files.
#[derive(Debug, Default)]
pub struct FsStorage;

impl FsStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Storage for FsStorage {
    fn ensure_dir(&self, path: &Path) -> StorageResult<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn remove_dir(&self, path: &Path) -> StorageResult<()> {
        match fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn put_payload(&self, path: &Path, contents: &str) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    fn get_payload(&self, path: &Path) -> StorageResult<String> {
        Ok(fs::read_to_string(path)?)
    }

    fn delete_payload(&self, path: &Path) -> StorageResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn payload_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn put_queue_meta(&self, path: &Path, meta: &QueueMeta) -> StorageResult<()> {
        let raw = serde_json::to_vec_pretty(meta)?;
        fs::write(path, raw)?;
        Ok(())
    }

    fn get_queue_meta(&self, path: &Path) -> StorageResult<Option<QueueMeta>> {
        match fs::read(path) {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put_dispatcher_meta(&self, path: &Path, meta: &DispatcherMeta) -> StorageResult<()> {
        let raw = serde_json::to_vec_pretty(meta)?;
        fs::write(path, raw)?;
        Ok(())
    }

    fn get_dispatcher_meta(&self, path: &Path) -> StorageResult<Option<DispatcherMeta>> {
        match fs::read(path) {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
