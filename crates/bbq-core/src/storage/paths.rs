//! On-disk layout derivation.
//!
//! ```text
//! <root>/metabbq.json                    dispatcher metadata
//! <root>/<md5(name)>/metaq.json          queue metadata
//! <root>/<md5(name)>/msgs/<md5(id)>.knmbbq   one payload file per message
//! ```

use std::path::{Path, PathBuf};

use uuid::Uuid;

pub const DISPATCHER_META_FILE: &str = "metabbq.json";
pub const QUEUE_META_FILE: &str = "metaq.json";
pub const MSG_DIR: &str = "msgs";
pub const MSG_EXT: &str = "knmbbq";

/// Deterministic queue directory under the dispatcher root.
pub fn queue_dir(root: &Path, queue_name: &str) -> PathBuf {
    root.join(format!("{:x}", md5::compute(queue_name)))
}

/// Relative payload path stored in the message record.
pub fn message_rel_path(msg_id: &Uuid) -> String {
    format!("{MSG_DIR}/{:x}.{MSG_EXT}", md5::compute(msg_id.to_string()))
}

/// Absolute payload path for a message within a queue directory.
pub fn message_file(queue_dir: &Path, rel_path: &str) -> PathBuf {
    queue_dir.join(rel_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_dir_is_deterministic_and_name_scoped() {
        let root = Path::new("/data/bbq");
        assert_eq!(queue_dir(root, "orders"), queue_dir(root, "orders"));
        assert_ne!(queue_dir(root, "orders"), queue_dir(root, "mail"));
        // md5 hex, not the raw name
        assert!(!queue_dir(root, "orders").to_string_lossy().contains("orders"));
    }

    #[test]
    fn message_rel_path_shape() {
        let rel = message_rel_path(&Uuid::now_v7());
        assert!(rel.starts_with("msgs/"));
        assert!(rel.ends_with(".knmbbq"));
        // md5 hex digest is 32 chars
        assert_eq!(rel.len(), "msgs/".len() + 32 + ".knmbbq".len());
    }
}
