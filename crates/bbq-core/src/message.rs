use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AddMessageError;

/// Payload type detected at enqueue time. Strings and numbers are stored in
/// their natural textual form; everything else is stored as JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    String,
    Number,
    Object,
}

/// Core message record. This is what lives in a queue's pipeline/fails lists
/// and in the `metaq.json` snapshot — the payload itself is a separate file
/// under `msgs/`, referenced by `path`.
///
/// Field names serialize in camelCase for on-disk snapshot compatibility.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    /// Byte length of the canonical serialized payload.
    pub size: u64,
    /// Relative on-disk location of the payload file, e.g. `msgs/<md5>.knmbbq`.
    pub path: String,
    pub created_at: u64,
    pub failed_at: Option<u64>,
    pub failed_count: u32,
    #[serde(rename = "type")]
    pub kind: PayloadKind,
}

impl Message {
    /// Generate a new UUIDv7 message ID.
    pub fn new_id() -> Uuid {
        Uuid::now_v7()
    }
}

/// The shape handed to job callbacks: the message record plus the id of the
/// source queue and the decoded plaintext payload.
///
/// Schedule jobs carry a synthetic envelope with no source queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    #[serde(flatten)]
    pub message: Message,
    pub queue_id: Option<Uuid>,
    pub value: Value,
}

/// Detect the payload kind and render the canonical serialized form:
/// identity for strings, decimal rendering for numbers, JSON for everything
/// else. `Null` is rejected — an undefined value is a caller error.
pub fn canonical_form(value: &Value) -> Result<(PayloadKind, String), AddMessageError> {
    match value {
        Value::Null => Err(AddMessageError::MessageUndefined),
        Value::String(s) => Ok((PayloadKind::String, s.clone())),
        Value::Number(n) => Ok((PayloadKind::Number, n.to_string())),
        other => {
            let raw = serde_json::to_string(other)
                .map_err(crate::error::StorageError::from)?;
            Ok((PayloadKind::Object, raw))
        }
    }
}

/// Decode a canonical serialized form back into a payload value.
pub fn decode_payload(kind: PayloadKind, raw: &str) -> Result<Value, serde_json::Error> {
    match kind {
        PayloadKind::String => Ok(Value::String(raw.to_string())),
        PayloadKind::Number | PayloadKind::Object => serde_json::from_str(raw),
    }
}
