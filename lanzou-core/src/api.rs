use std::fmt;
use std::future::Future;
use std::io;

use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::error::ApiError;
use crate::session::Session;
use crate::share::ShareLink;
use crate::types::{DownloadSource, EntryKind, EntryRef, FolderListing, RemoteId, ShareInfo};

/// File contents fed to an upload, one chunk at a time.
pub type UploadBody = BoxStream<'static, io::Result<Bytes>>;

/// File contents produced by a download, one chunk at a time.
pub type DownloadStream = BoxStream<'static, Result<Bytes, ApiError>>;

pub struct Download {
    pub file_name: Option<String>,
    pub size: Option<u64>,
    pub body: DownloadStream,
}

impl fmt::Debug for Download {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Download")
            .field("file_name", &self.file_name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Operations the drive offers to a signed-in client.
///
/// Implementations own transport details (cookies, captcha workarounds,
/// retries). Every call receives the session it acts for.
pub trait RemoteApi: Send + Sync + 'static {
    fn list_folder(
        &self,
        session: &Session,
        folder: &RemoteId,
    ) -> impl Future<Output = Result<FolderListing, ApiError>> + Send;

    fn create_folder(
        &self,
        session: &Session,
        parent: &RemoteId,
        name: &str,
        description: Option<&str>,
    ) -> impl Future<Output = Result<RemoteId, ApiError>> + Send;

    fn rename(
        &self,
        session: &Session,
        target: &EntryRef,
        new_name: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn delete(
        &self,
        session: &Session,
        target: &EntryRef,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Sets the extraction code of a shared entry; `None` removes it.
    fn set_password(
        &self,
        session: &Session,
        target: &EntryRef,
        password: Option<&str>,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn set_description(
        &self,
        session: &Session,
        target: &EntryRef,
        description: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Moves a file or folder into `destination`.
    fn move_entry(
        &self,
        session: &Session,
        target: &EntryRef,
        destination: &RemoteId,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn resolve_share_link(
        &self,
        session: &Session,
        link: &ShareLink,
    ) -> impl Future<Output = Result<ShareInfo, ApiError>> + Send;

    /// Streams `body` into a new file named `file_name` inside `folder` and
    /// returns the id of the stored file. An error item from `body` aborts
    /// the upload.
    fn upload(
        &self,
        session: &Session,
        folder: &RemoteId,
        file_name: &str,
        size: u64,
        body: UploadBody,
    ) -> impl Future<Output = Result<RemoteId, ApiError>> + Send;

    fn download(
        &self,
        session: &Session,
        source: &DownloadSource,
    ) -> impl Future<Output = Result<Download, ApiError>> + Send;
}

/// Checks an extraction code against the drive's length rules: 2 to 6
/// characters on files, 2 to 12 on folders. An empty code removes the
/// protection and is always accepted.
pub fn check_password(kind: EntryKind, password: &str) -> Result<(), ApiError> {
    let max = kind.max_password_len();
    let len = password.chars().count();
    if len == 0 || (2..=max).contains(&len) {
        return Ok(());
    }
    let what = match kind {
        EntryKind::File => "file",
        EntryKind::Folder => "folder",
    };
    Err(ApiError::InvalidArgument(format!(
        "{what} extraction code must be 2 to {max} characters, got {len}"
    )))
}
