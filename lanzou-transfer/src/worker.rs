use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use lanzou_core::{ApiError, EntryKind, EntryRef, RemoteApi, RemoteId, Session, UploadBody};
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::paths::{partial_path, upload_name};
use crate::task::{DownloadRequest, TransferRequest, UploadRequest};

/// Receives the byte counts a worker observes for its task.
pub(crate) trait ProgressSink: Clone + Send + Sync + 'static {
    fn size_known(&self, size: u64);
    /// `transferred` is the running total, not the chunk length.
    fn advanced(&self, transferred: u64);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Completed { remote_file: Option<RemoteId> },
    Cancelled,
}

/// Remote folders found or created by the queue's tasks, keyed by parent id
/// and name.
///
/// Uploads that share a folder wait on one lookup, so a directory sent with
/// several workers still ends up in a single remote folder.
#[derive(Default)]
pub(crate) struct FolderCache {
    slots: Mutex<HashMap<(RemoteId, String), Arc<OnceCell<RemoteId>>>>,
}

impl FolderCache {
    fn slot(&self, parent: &RemoteId, name: &str) -> Arc<OnceCell<RemoteId>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            slots
                .entry((parent.clone(), name.to_string()))
                .or_default(),
        )
    }
}

/// Everything one task needs from its slot.
pub(crate) struct Job<'a, A, S> {
    pub api: &'a A,
    pub session: &'a Session,
    pub cancel: &'a CancellationToken,
    pub folders: &'a FolderCache,
    pub chunk_size: usize,
    pub sink: S,
}

impl<A: RemoteApi, S: ProgressSink> Job<'_, A, S> {
    /// Runs one transfer from start to finish as a single byte stream.
    ///
    /// The cancellation token is honoured before the first request, at every
    /// chunk boundary and once more at the end; a cancelled task never reports
    /// completion.
    pub(crate) async fn run(self, request: &TransferRequest) -> Result<Outcome, TaskError> {
        if self.cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        let cancel = self.cancel.clone();
        let result = match request {
            TransferRequest::Upload(upload) => self.upload(upload).await,
            TransferRequest::Download(download) => self.download(download).await,
        };
        if cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        result
    }

    async fn upload(self, request: &UploadRequest) -> Result<Outcome, TaskError> {
        let path = &request.local_path;
        let name = upload_name(path).map_err(|err| TaskError::Io {
            path: path.clone(),
            message: err.to_string(),
        })?;
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|err| TaskError::io(path, &err))?;
        if !metadata.is_file() {
            return Err(TaskError::Io {
                path: path.clone(),
                message: "not a regular file".to_string(),
            });
        }
        let size = metadata.len();
        self.sink.size_known(size);

        let mut folder = request.folder.clone();
        for dir in &request.create_dirs {
            if self.cancel.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }
            folder = self.ensure_folder(&folder, dir).await?;
        }
        if self.cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|err| TaskError::io(path, &err))?;
        let body = progress_body(file, self.chunk_size, self.cancel.clone(), self.sink.clone());
        let id = self
            .api
            .upload(self.session, &folder, &name, size, body)
            .await?;
        self.apply_settings(request, &id).await;
        Ok(Outcome::Completed {
            remote_file: Some(id),
        })
    }

    /// Reuses a same-named folder under `parent` before creating one.
    ///
    /// Only one task resolves a given (parent, name) pair; the rest wait for
    /// its answer. A failed lookup leaves the pair open for the next task.
    async fn ensure_folder(&self, parent: &RemoteId, name: &str) -> Result<RemoteId, ApiError> {
        let slot = self.folders.slot(parent, name);
        let id = slot
            .get_or_try_init(|| async {
                let listing = self.api.list_folder(self.session, parent).await?;
                if let Some(existing) = listing.find_folder(name) {
                    return Ok(existing.id.clone());
                }
                self.api
                    .create_folder(self.session, parent, name, None)
                    .await
            })
            .await?;
        Ok(id.clone())
    }

    /// The file is already stored at this point, so a rejected setting is
    /// logged and the upload still counts as completed.
    async fn apply_settings(&self, request: &UploadRequest, id: &RemoteId) {
        let target = EntryRef {
            id: id.clone(),
            kind: EntryKind::File,
        };
        if let Some(password) = &request.password {
            if let Err(err) = self
                .api
                .set_password(self.session, &target, Some(password.as_str()))
                .await
            {
                tracing::warn!(file = %id, error = %err, "could not set extraction code");
            }
        }
        if let Some(description) = &request.description {
            if let Err(err) = self
                .api
                .set_description(self.session, &target, description)
                .await
            {
                tracing::warn!(file = %id, error = %err, "could not set description");
            }
        }
    }

    async fn download(self, request: &DownloadRequest) -> Result<Outcome, TaskError> {
        let target = &request.local_path;
        let mut download = self.api.download(self.session, &request.source).await?;
        if let Some(size) = download.size {
            self.sink.size_known(size);
        }

        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| TaskError::io(parent, &err))?;
        }
        let partial = partial_path(target);
        let mut file = tokio::fs::File::create(&partial)
            .await
            .map_err(|err| TaskError::io(&partial, &err))?;
        let mut written = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(Outcome::Cancelled),
                next = download.body.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|err| TaskError::io(&partial, &err))?;
            written += chunk.len() as u64;
            self.sink.advanced(written);
        }

        file.flush()
            .await
            .map_err(|err| TaskError::io(&partial, &err))?;
        file.sync_all()
            .await
            .map_err(|err| TaskError::io(&partial, &err))?;
        drop(file);

        if self.cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        tokio::fs::rename(&partial, target)
            .await
            .map_err(|err| TaskError::io(target, &err))?;
        Ok(Outcome::Completed { remote_file: None })
    }
}

/// Reads `file` in `chunk_size` pieces, reporting each one and refusing to
/// continue once `cancel` fires.
fn progress_body<S: ProgressSink>(
    file: tokio::fs::File,
    chunk_size: usize,
    cancel: CancellationToken,
    sink: S,
) -> UploadBody {
    let mut sent = 0u64;
    ReaderStream::with_capacity(file, chunk_size.max(1))
        .map(move |chunk| {
            if cancel.is_cancelled() {
                return Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "transfer cancelled",
                ));
            }
            let chunk = chunk?;
            sent += chunk.len() as u64;
            sink.advanced(sent);
            Ok(chunk)
        })
        .boxed()
}
