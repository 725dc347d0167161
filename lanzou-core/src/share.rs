use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::types::EntryKind;

/// Hosts the drive serves share pages from. Subdomains are accepted too.
pub const SHARE_HOSTS: &[&str] = &["lanzous.com", "lanzoui.com", "lanzoux.com", "lanzouw.com"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShareLinkError {
    #[error("invalid share url: {0}")]
    Invalid(String),
    #[error("unsupported share host: {0}")]
    UnsupportedHost(String),
    #[error("share url has no share id: {0}")]
    MissingId(String),
}

/// Public link to a shared file or folder, plus its extraction code if any.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShareLink {
    url: Url,
    password: Option<String>,
    kind: EntryKind,
}

impl ShareLink {
    pub fn parse(raw: &str, password: Option<&str>) -> Result<Self, ShareLinkError> {
        let url = Url::parse(raw.trim()).map_err(|_| ShareLinkError::Invalid(raw.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ShareLinkError::Invalid(raw.to_string()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| ShareLinkError::Invalid(raw.to_string()))?;
        if !is_share_host(host) {
            return Err(ShareLinkError::UnsupportedHost(host.to_string()));
        }
        let id = url
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| ShareLinkError::MissingId(raw.to_string()))?;
        if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ShareLinkError::MissingId(raw.to_string()));
        }
        // Folder shares live under "/b…"; everything else is a single file.
        let kind = if id.starts_with('b') {
            EntryKind::Folder
        } else {
            EntryKind::File
        };
        let password = password
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        Ok(Self {
            url,
            password,
            kind,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    /// Last path segment of the link, used as a fallback file name.
    pub fn share_id(&self) -> &str {
        self.url
            .path_segments()
            .and_then(|mut segments| segments.next())
            .unwrap_or_default()
    }
}

impl fmt::Display for ShareLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.password {
            Some(password) => write!(f, "{} {password}", self.url),
            None => write!(f, "{}", self.url),
        }
    }
}

/// Share page URL on one of [`SHARE_HOSTS`] or a subdomain of it.
static SHARE_URL: LazyLock<Regex> = LazyLock::new(|| {
    let hosts = SHARE_HOSTS
        .iter()
        .map(|host| regex::escape(host))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"https?://(?:\w[-\w]*\.)*(?:{hosts})/[A-Za-z0-9]+"))
        .expect("share url pattern is valid")
});

/// Start of any link, which ends the text a code may be taken from.
static ANY_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://").expect("url pattern is valid"));

/// First run of code characters after a link.
static EXTRACTION_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^0-9a-z]*([0-9a-z]+)").expect("code pattern is valid"));

/// Finds share links in pasted free text.
///
/// A link may be followed by its extraction code, separated by arbitrary
/// non-code characters ("https://…/iAbc12 提取码:x9k2"). Links on foreign
/// hosts are skipped, and a code is never read past the next link.
pub fn extract_share_links(text: &str) -> Vec<ShareLink> {
    SHARE_URL
        .find_iter(text)
        .filter_map(|found| {
            let tail = &text[found.end()..];
            let tail = &tail[..ANY_URL.find(tail).map_or(tail.len(), |next| next.start())];
            let password = EXTRACTION_CODE
                .captures(tail)
                .and_then(|caps| caps.get(1))
                .map(|code| code.as_str());
            ShareLink::parse(found.as_str(), password).ok()
        })
        .collect()
}

fn is_share_host(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    SHARE_HOSTS.iter().any(|known| {
        host == *known
            || host
                .strip_suffix(known)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}
