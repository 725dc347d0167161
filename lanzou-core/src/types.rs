use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::share::ShareLink;

const ROOT_FOLDER_ID: &str = "-1";

/// Opaque file or folder identifier assigned by the drive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn root() -> Self {
        Self(ROOT_FOLDER_ID.to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_FOLDER_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemoteId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

impl EntryKind {
    /// Longest extraction code the drive accepts for this kind of entry.
    pub fn max_password_len(self) -> usize {
        match self {
            EntryKind::File => 6,
            EntryKind::Folder => 12,
        }
    }

    pub(crate) fn collection(self) -> &'static str {
        match self {
            EntryKind::File => "files",
            EntryKind::Folder => "folders",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: RemoteId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub has_password: bool,
}

impl Entry {
    pub fn entry_ref(&self) -> EntryRef {
        EntryRef {
            id: self.id.clone(),
            kind: self.kind,
        }
    }
}

/// Enough to address an entry for rename or delete.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryRef {
    pub id: RemoteId,
    pub kind: EntryKind,
}

impl EntryRef {
    pub fn file(id: impl Into<String>) -> Self {
        Self {
            id: RemoteId::new(id),
            kind: EntryKind::File,
        }
    }

    pub fn folder(id: impl Into<String>) -> Self {
        Self {
            id: RemoteId::new(id),
            kind: EntryKind::Folder,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crumb {
    pub id: RemoteId,
    pub name: String,
}

/// One page of a folder as the drive reports it.
///
/// `path` lists the folders from the root down to (and including) this
/// folder; the root itself is not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderListing {
    pub folder_id: RemoteId,
    #[serde(default)]
    pub path: Vec<Crumb>,
    #[serde(default)]
    pub items: Vec<Entry>,
}

impl FolderListing {
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    pub fn folders(&self) -> impl Iterator<Item = &Entry> {
        self.items
            .iter()
            .filter(|entry| entry.kind == EntryKind::Folder)
    }

    pub fn files(&self) -> impl Iterator<Item = &Entry> {
        self.items
            .iter()
            .filter(|entry| entry.kind == EntryKind::File)
    }

    pub fn find_folder(&self, name: &str) -> Option<&Entry> {
        self.folders().find(|entry| entry.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub uploaded: Option<String>,
    #[serde(default)]
    pub items: Vec<Entry>,
}

/// Where a download reads its bytes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadSource {
    File(RemoteId),
    Share(ShareLink),
}

impl fmt::Display for DownloadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadSource::File(id) => write!(f, "file:{id}"),
            DownloadSource::Share(link) => write!(f, "{}", link.url()),
        }
    }
}

/// Direct transfer location handed out by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLink {
    pub href: Url,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}
