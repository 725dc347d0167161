use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::error::QueueError;
use crate::task::TransferRequest;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("file name is empty")]
    Empty,
    #[error("path contains unsupported component: {0}")]
    UnsupportedComponent(String),
    #[error("path is not valid UTF-8: {0}")]
    NotUtf8(String),
}

/// Rejects uploads whose destination folder would exceed `max` levels.
pub fn check_depth(request: &TransferRequest, max: usize) -> Result<(), QueueError> {
    let TransferRequest::Upload(upload) = request else {
        return Ok(());
    };
    let depth = upload.target_depth();
    if depth > max {
        return Err(QueueError::PathTooDeep {
            path: upload.local_path.clone(),
            depth,
            max,
        });
    }
    Ok(())
}

/// Name the drive stores an uploaded file under.
pub fn upload_name(path: &Path) -> Result<String, PathError> {
    let name = path.file_name().ok_or(PathError::Empty)?;
    name.to_str()
        .map(str::to_string)
        .ok_or_else(|| PathError::NotUtf8(name.to_string_lossy().into_owned()))
}

/// Joins a remote file name under a local directory.
///
/// Remote names are untrusted; anything that is not a single plain file name
/// is refused.
pub fn download_target(dir: &Path, remote_name: &str) -> Result<PathBuf, PathError> {
    if remote_name.trim().is_empty() {
        return Err(PathError::Empty);
    }
    let mut components = Path::new(remote_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) => Ok(dir.join(part)),
        _ => Err(PathError::UnsupportedComponent(remote_name.to_string())),
    }
}

/// Folder names between `root` and `path`, outermost first.
pub fn relative_dirs(root: &Path, path: &Path) -> Result<Vec<String>, PathError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| PathError::UnsupportedComponent(path.display().to_string()))?;
    let mut out = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => out.push(
                part.to_str()
                    .ok_or_else(|| PathError::NotUtf8(part.to_string_lossy().into_owned()))?
                    .to_string(),
            ),
            Component::CurDir => continue,
            Component::RootDir | Component::ParentDir | Component::Prefix(_) => {
                return Err(PathError::UnsupportedComponent(
                    component.as_os_str().to_string_lossy().into_owned(),
                ));
            }
        }
    }
    Ok(out)
}

/// Where a download is written before it is complete.
pub fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}
