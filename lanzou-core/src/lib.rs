mod api;
mod error;
mod http;
mod session;
mod share;
mod types;

pub use api::{Download, DownloadStream, RemoteApi, UploadBody, check_password};
pub use error::ApiError;
pub use http::{DEFAULT_BASE_URL, HttpRemoteApi};
pub use session::Session;
pub use share::{SHARE_HOSTS, ShareLink, ShareLinkError, extract_share_links};
pub use types::{
    Crumb, DownloadSource, Entry, EntryKind, EntryRef, FolderListing, RemoteId, ShareInfo,
    TransferLink,
};
