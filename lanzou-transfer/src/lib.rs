pub mod config;
pub mod error;
pub mod event;
pub mod paths;
pub mod plan;
pub mod queue;
pub mod task;
mod worker;

pub use config::QueueConfig;
pub use error::{QueueError, TaskError};
pub use event::{Subscription, TaskEvent};
pub use plan::{PlanError, plan_directory_upload, plan_uploads};
pub use queue::TransferQueue;
pub use task::{
    Direction, DownloadRequest, RemoteLocator, TaskId, TaskStatus, TransferRequest, TransferTask,
    UploadRequest,
};
