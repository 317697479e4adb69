//! Local directory traversal
//!
//! Turns the mirrored root into a list of upload tasks, one per regular file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::key::key_for;

/// A single file to upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadTask {
    /// Path of the file on disk
    pub local_path: PathBuf,

    /// Destination object key
    pub key: String,

    /// Size at enumeration time
    pub size_bytes: u64,

    /// Modification time at enumeration time, full precision
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<jiff::Timestamp>,
}

/// Enumerate every regular file under `root` and compute its key
///
/// Directory symlinks are not followed. Symlinks pointing at regular files
/// are uploaded like the file itself; dangling symlinks still become tasks so
/// the upload reports them as vanished. Unreadable entries are logged and
/// skipped. The returned tasks are sorted by key for stable reporting.
pub fn collect_tasks(root: &Path, prefix: &str) -> Result<Vec<UploadTask>> {
    if !root.is_dir() {
        return Err(Error::LocalPathNotFound(root.to_path_buf()));
    }

    let mut tasks = Vec::new();

    for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("Skipping unreadable entry: {err}");
                continue;
            }
        };

        // std::fs::metadata follows symlinks, so linked files count as files
        let (size_bytes, modified) = match std::fs::metadata(entry.path()) {
            Ok(meta) if meta.is_file() => {
                let modified = meta
                    .modified()
                    .ok()
                    .and_then(|t| jiff::Timestamp::try_from(t).ok());
                (meta.len(), modified)
            }
            Ok(_) => continue,
            Err(err) if entry.path_is_symlink() && err.kind() == ErrorKind::NotFound => {
                tracing::debug!("Dangling symlink {}", entry.path().display());
                (0, None)
            }
            Err(err) => {
                tracing::warn!("Skipping {}: {err}", entry.path().display());
                continue;
            }
        };

        let key = match key_for(entry.path(), root, prefix) {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!("Skipping {}: {err}", entry.path().display());
                continue;
            }
        };

        tasks.push(UploadTask {
            local_path: entry.into_path(),
            key,
            size_bytes,
            modified,
        });
    }

    tasks.sort_by(|a, b| a.key.cmp(&b.key));
    tracing::debug!("Found {} file(s) under {}", tasks.len(), root.display());

    Ok(tasks)
}
