/// Low-level storage errors (filesystem, serialization).
/// This is the error type for the `Storage` trait — storage operations can
/// only fail with infrastructure errors, never domain errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("crypto error: {0}")]
    Crypto(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<CryptoError> for StorageError {
    fn from(err: CryptoError) -> Self {
        StorageError::Crypto(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Payload cipher errors (hex decoding, block structure, padding, UTF-8).
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("ciphertext is not valid hex: {0}")]
    Hex(String),

    #[error("malformed ciphertext: {0}")]
    Malformed(String),

    #[error("decrypted payload is not valid UTF-8")]
    Utf8,
}

/// Cron pattern parse errors.
#[derive(Debug, thiserror::Error)]
pub enum CronError {
    #[error("cron pattern must have 5 fields, got {0}")]
    FieldCount(usize),

    #[error("invalid {field} token: {token:?}")]
    InvalidToken { field: &'static str, token: String },
}

/// Errors surfaced to the caller of `add_message`. Validation failures leave
/// the queue untouched: the message is not persisted and no broadcast occurs.
#[derive(Debug, thiserror::Error)]
pub enum AddMessageError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("message value is undefined")]
    MessageUndefined,

    #[error("message of {size} bytes exceeds the queue size limit of {limit}")]
    MessageTooLarge { size: u64, limit: u64 },

    #[error("queue is full ({limit} messages)")]
    QueueFull { limit: usize },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),
}

#[derive(Debug, thiserror::Error)]
pub enum CreateQueueError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteQueueError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),
}

/// Errors for queue-scoped operations that only need the queue to exist
/// (`get_fail`, `rebroadcast`, `queue_stats`).
#[derive(Debug, thiserror::Error)]
pub enum QueueOpError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),
}

#[derive(Debug, thiserror::Error)]
pub enum CreateWorkerError {
    #[error("worker name already registered: {0}")]
    NameDuplicate(String),

    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),
}

#[derive(Debug, thiserror::Error)]
pub enum CreateJobError {
    #[error("worker not found: {0}")]
    WorkerNotFound(String),

    #[error("job name already registered: {0}")]
    NameDuplicate(String),

    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("callback is invalid: {0}")]
    CallbackInvalid(String),

    #[error("sample data is undefined")]
    SampleUndefined,

    #[error(transparent)]
    Pattern(#[from] CronError),

    #[error("unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),
}

/// The outcome of a single job attempt, reported back to the scheduler by the
/// attempt thread.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error("callback timed out after {0} ms")]
    Timeout(u64),

    #[error("callback failed: {0}")]
    Callback(String),

    #[error("worker runtime error: {0}")]
    Runtime(String),
}

/// Dispatcher handle / scheduler lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    #[error("failed to spawn scheduler thread: {0}")]
    SchedulerSpawn(String),

    #[error("scheduler command channel is full")]
    ChannelFull,

    #[error("scheduler command channel is disconnected")]
    ChannelDisconnected,

    #[error("scheduler dropped the reply channel")]
    ReplyDropped,

    #[error("scheduler thread panicked")]
    SchedulerPanicked,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
