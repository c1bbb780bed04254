//! Local tree scanner
//!
//! Walks a directory recursively and maps every regular file to the remote
//! key it will be stored under. Symlinks to files are followed; symlinked
//! directories are not descended into. Any unreadable directory fails the
//! whole scan, since a partial map would make missing files look deleted.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use edgesync_core::domain::{
    errors::DomainError,
    newtypes::{KeyPrefix, ObjectKey},
    records::LocalFileRecord,
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Scan result: remote key -> local file
pub type LocalMap = BTreeMap<ObjectKey, LocalFileRecord>;

/// Errors that fail a scan
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot map {path} to an object key: {source}")]
    InvalidKey {
        path: PathBuf,
        #[source]
        source: DomainError,
    },
}

impl ScanError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Scan `root` and build keys under `prefix`
///
/// Blocking: call from `spawn_blocking`. The root is made absolute so that
/// record paths (and the hash-cache identities derived from them) are stable
/// regardless of the working directory.
#[instrument(skip(prefix), fields(prefix = %prefix))]
pub fn scan_directory(root: &Path, prefix: &KeyPrefix) -> Result<LocalMap, ScanError> {
    let root = std::fs::canonicalize(root).map_err(|e| ScanError::io(root, e))?;
    let meta = std::fs::metadata(&root).map_err(|e| ScanError::io(&root, e))?;
    if !meta.is_dir() {
        return Err(ScanError::NotADirectory(root));
    }

    info!(root = %root.display(), "Scanning directory");

    let mut files = LocalMap::new();
    let mut pending = vec![root.clone()];

    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| ScanError::io(&dir, e))?;

        for entry in entries {
            let entry = entry.map_err(|e| ScanError::io(&dir, e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| ScanError::io(&path, e))?;

            let size = if file_type.is_dir() {
                pending.push(path);
                continue;
            } else if file_type.is_file() {
                entry.metadata().map_err(|e| ScanError::io(&path, e))?.len()
            } else if file_type.is_symlink() {
                match std::fs::metadata(&path) {
                    Ok(target) if target.is_file() => target.len(),
                    Ok(_) => {
                        debug!(path = %path.display(), "Skipping symlink to non-file");
                        continue;
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping broken symlink");
                        continue;
                    }
                }
            } else {
                debug!(path = %path.display(), "Skipping special file");
                continue;
            };

            let relative = path
                .strip_prefix(&root)
                .map_err(|_| ScanError::InvalidKey {
                    path: path.clone(),
                    source: DomainError::PathNotInRoot(path.display().to_string()),
                })?;
            let key = prefix
                .key_for(relative)
                .map_err(|source| ScanError::InvalidKey {
                    path: path.clone(),
                    source,
                })?;

            files.insert(key.clone(), LocalFileRecord::new(key, path, size));
        }
    }

    info!(files = files.len(), "Local scan complete");
    Ok(files)
}
