use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lanzou_core::RemoteId;
use thiserror::Error;

use crate::paths::{PathError, relative_dirs, upload_name};
use crate::task::{TransferRequest, UploadRequest};

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("path error: {0}")]
    Path(#[from] PathError),
}

/// Expands local files and directories into upload requests.
///
/// Files upload straight into `folder`; a directory is mirrored below
/// `folder` under its own name.
pub fn plan_uploads(
    paths: &[PathBuf],
    folder: &RemoteId,
    folder_depth: usize,
) -> Result<Vec<TransferRequest>, PlanError> {
    let mut requests = Vec::new();
    for path in paths {
        let metadata = fs::metadata(path).map_err(|source| PlanError::Io {
            path: path.clone(),
            source,
        })?;
        if metadata.is_dir() {
            requests.extend(
                plan_directory_upload(path, folder, folder_depth)?
                    .into_iter()
                    .map(TransferRequest::Upload),
            );
        } else {
            requests.push(TransferRequest::Upload(
                UploadRequest::new(path.clone(), folder.clone()).with_folder_depth(folder_depth),
            ));
        }
    }
    Ok(requests)
}

/// One request per regular file below `local_dir`, in a stable order.
///
/// Every request recreates the directory layout, starting with the name of
/// `local_dir` itself. Empty directories produce nothing.
pub fn plan_directory_upload(
    local_dir: &Path,
    folder: &RemoteId,
    folder_depth: usize,
) -> Result<Vec<UploadRequest>, PlanError> {
    let root_name = upload_name(local_dir)?;
    let mut files = Vec::new();
    collect_files(local_dir, &mut files)?;

    let mut requests = Vec::with_capacity(files.len());
    for file in files {
        let parent = file.parent().unwrap_or(local_dir);
        let mut dirs = vec![root_name.clone()];
        dirs.extend(relative_dirs(local_dir, parent)?);
        requests.push(
            UploadRequest::new(file, folder.clone())
                .with_folder_depth(folder_depth)
                .with_create_dirs(dirs),
        );
    }
    Ok(requests)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), PlanError> {
    let read_err = |source| PlanError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = fs::read_dir(dir)
        .map_err(read_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_err)?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut subdirs = Vec::new();
    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type().map_err(read_err)?;
        if file_type.is_dir() {
            subdirs.push(path);
        } else if file_type.is_file() {
            out.push(path);
        } else if file_type.is_symlink() && path.is_file() {
            // Linked files are uploaded; linked directories are not followed.
            out.push(path);
        }
    }
    for subdir in subdirs {
        collect_files(&subdir, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn mirrors_directory_layout() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("album");
        fs::create_dir_all(root.join("2024/summer")).unwrap();
        fs::create_dir_all(root.join("empty")).unwrap();
        fs::write(root.join("cover.jpg"), b"c").unwrap();
        fs::write(root.join("2024/summer/beach.jpg"), b"b").unwrap();

        let plan = plan_directory_upload(&root, &RemoteId::new("10"), 1).unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].local_path, root.join("cover.jpg"));
        assert_eq!(plan[0].create_dirs, vec!["album"]);
        assert_eq!(plan[1].create_dirs, vec!["album", "2024", "summer"]);
        assert_eq!(plan[1].target_depth(), 4);
    }

    #[test]
    fn plan_uploads_mixes_files_and_directories() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        fs::write(&file, b"n").unwrap();
        let sub = dir.path().join("docs");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("a.md"), b"a").unwrap();

        let plan = plan_uploads(&[file.clone(), sub], &RemoteId::root(), 0).unwrap();

        assert_eq!(plan.len(), 2);
        let TransferRequest::Upload(first) = &plan[0] else {
            panic!("expected upload");
        };
        assert_eq!(first.local_path, file);
        assert!(first.create_dirs.is_empty());
        let TransferRequest::Upload(second) = &plan[1] else {
            panic!("expected upload");
        };
        assert_eq!(second.create_dirs, vec!["docs"]);
    }

    #[test]
    fn missing_path_is_reported() {
        let dir = tempdir().unwrap();
        let err = plan_uploads(&[dir.path().join("nope")], &RemoteId::root(), 0).unwrap_err();
        assert!(matches!(err, PlanError::Io { .. }));
    }
}
