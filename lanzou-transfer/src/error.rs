use std::io;
use std::path::{Path, PathBuf};

use lanzou_core::ApiError;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::task::{TaskId, TaskStatus};

/// Rejections returned synchronously by [`crate::TransferQueue`] calls.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("invalid {field}: {value}")]
    InvalidConfig { field: &'static str, value: usize },
    #[error("transfer queue is closed")]
    QueueClosed,
    #[error(
        "{} would be stored {depth} folders deep, the drive allows {max}",
        .path.display()
    )]
    PathTooDeep {
        path: PathBuf,
        depth: usize,
        max: usize,
    },
    #[error("unknown task {0}")]
    UnknownTask(TaskId),
    #[error("task {0} is still active")]
    TaskStillActive(TaskId),
    #[error("task {0} is {1} and cannot be retried")]
    NotRetryable(TaskId, TaskStatus),
    #[error("transfer queue must be created inside a tokio runtime")]
    NoRuntime,
}

/// Why a transfer ended in `Failed`. Recorded on the task, never returned
/// from queue calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("{}: {message}", .path.display())]
    Io { path: PathBuf, message: String },
    #[error("transfer worker aborted: {0}")]
    Aborted(String),
}

impl TaskError {
    pub(crate) fn io(path: &Path, err: &io::Error) -> Self {
        TaskError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

impl Serialize for TaskError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
