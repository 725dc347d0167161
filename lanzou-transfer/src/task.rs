use std::fmt;
use std::path::{Path, PathBuf};

use lanzou_core::{DownloadSource, RemoteId, ShareLink};
use serde::Serialize;

use crate::error::TaskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Pending -> Running -> {Completed, Failed, Cancelled}; a pending task
    /// may also be cancelled before it ever runs.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Cancelled)
                | (
                    TaskStatus::Running,
                    TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
                )
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteLocator {
    Folder(RemoteId),
    File(RemoteId),
    Share(ShareLink),
}

impl fmt::Display for RemoteLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteLocator::Folder(id) => write!(f, "folder:{id}"),
            RemoteLocator::File(id) => write!(f, "file:{id}"),
            RemoteLocator::Share(link) => write!(f, "{}", link.url()),
        }
    }
}

/// One local file to store in the drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadRequest {
    pub local_path: PathBuf,
    /// Existing folder the upload starts from.
    pub folder: RemoteId,
    /// Depth of `folder` below the drive root; the root itself is 0.
    pub folder_depth: usize,
    /// Folders to find or create below `folder`, outermost first.
    pub create_dirs: Vec<String>,
    /// Extraction code applied to the stored file once it is uploaded.
    pub password: Option<String>,
    /// Description applied to the stored file once it is uploaded.
    pub description: Option<String>,
}

impl UploadRequest {
    pub fn new(local_path: impl Into<PathBuf>, folder: RemoteId) -> Self {
        Self {
            local_path: local_path.into(),
            folder,
            folder_depth: 0,
            create_dirs: Vec::new(),
            password: None,
            description: None,
        }
    }

    pub fn with_folder_depth(mut self, depth: usize) -> Self {
        self.folder_depth = depth;
        self
    }

    pub fn with_create_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.create_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Depth of the folder the file finally lands in.
    pub fn target_depth(&self) -> usize {
        self.folder_depth.saturating_add(self.create_dirs.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRequest {
    pub source: DownloadSource,
    /// Destination file; missing parent directories are created.
    pub local_path: PathBuf,
}

impl DownloadRequest {
    pub fn new(source: DownloadSource, local_path: impl Into<PathBuf>) -> Self {
        Self {
            source,
            local_path: local_path.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferRequest {
    Upload(UploadRequest),
    Download(DownloadRequest),
}

impl TransferRequest {
    pub fn direction(&self) -> Direction {
        match self {
            TransferRequest::Upload(_) => Direction::Upload,
            TransferRequest::Download(_) => Direction::Download,
        }
    }

    pub fn local_path(&self) -> &Path {
        match self {
            TransferRequest::Upload(request) => &request.local_path,
            TransferRequest::Download(request) => &request.local_path,
        }
    }

    pub fn locator(&self) -> RemoteLocator {
        match self {
            TransferRequest::Upload(request) => RemoteLocator::Folder(request.folder.clone()),
            TransferRequest::Download(request) => match &request.source {
                DownloadSource::File(id) => RemoteLocator::File(id.clone()),
                DownloadSource::Share(link) => RemoteLocator::Share(link.clone()),
            },
        }
    }
}

impl From<UploadRequest> for TransferRequest {
    fn from(request: UploadRequest) -> Self {
        TransferRequest::Upload(request)
    }
}

impl From<DownloadRequest> for TransferRequest {
    fn from(request: DownloadRequest) -> Self {
        TransferRequest::Download(request)
    }
}

/// Queue-side record of one transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferTask {
    pub id: TaskId,
    pub direction: Direction,
    pub local_path: PathBuf,
    pub remote: RemoteLocator,
    pub size: Option<u64>,
    pub progress: u64,
    pub status: TaskStatus,
    pub error: Option<TaskError>,
    /// Id of the stored file once an upload completed.
    pub remote_file: Option<RemoteId>,
}

impl TransferTask {
    pub(crate) fn new(id: TaskId, request: &TransferRequest) -> Self {
        Self {
            id,
            direction: request.direction(),
            local_path: request.local_path().to_path_buf(),
            remote: request.locator(),
            size: None,
            progress: 0,
            status: TaskStatus::Pending,
            error: None,
            remote_file: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn fraction(&self) -> Option<f64> {
        match self.size {
            Some(0) => Some(1.0),
            Some(size) => Some(self.progress as f64 / size as f64),
            None => None,
        }
    }

    /// Applies `next` if the status lattice allows it.
    pub(crate) fn transition(&mut self, next: TaskStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// Returns whether the size was taken. A size below the bytes already
    /// moved is dropped so progress never goes back.
    pub(crate) fn record_size(&mut self, size: u64) -> bool {
        if size < self.progress {
            return false;
        }
        self.size = Some(size);
        true
    }

    /// Returns whether the visible progress moved.
    pub(crate) fn record_progress(&mut self, transferred: u64) -> bool {
        if self.status != TaskStatus::Running {
            return false;
        }
        let capped = self.size.map_or(transferred, |size| transferred.min(size));
        if capped > self.progress {
            self.progress = capped;
            true
        } else {
            false
        }
    }
}
