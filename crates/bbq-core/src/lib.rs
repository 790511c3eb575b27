pub mod cron;
pub mod crypto;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod queue;
pub mod storage;
pub mod telemetry;

pub use dispatcher::{
    BoxError, Callback, Dispatcher, DispatcherConfig, JobContext, JobFn, JobOptions,
    ScheduleJobOptions, WorkerOptions,
};
pub use error::{
    AddMessageError, AttemptError, CreateJobError, CreateQueueError, CreateWorkerError,
    CronError, CryptoError, DeleteQueueError, DispatcherError, QueueOpError, StorageError,
    StorageResult,
};
pub use message::{Message, MessageEnvelope, PayloadKind};
pub use queue::{QueueOptions, QueueStats};
pub use storage::{FsStorage, Storage};
