//! Change manifest
//!
//! Records what was last uploaded for each key so that repeated runs over an
//! unchanged tree can skip files. A file counts as unchanged when its size
//! and modification time match the recorded entry and that modification time
//! is safely older than the upload. Filesystem clocks tick coarsely, so a
//! rewrite landing in the same tick as the recorded mtime keeps the old
//! mtime; entries written within [`RACY_WINDOW`] of their upload are never
//! trusted for that reason.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::walk::UploadTask;

/// Current manifest format version
pub const MANIFEST_VERSION: u32 = 2;

/// Minimum gap between a file's mtime and its upload start for the entry to
/// be trusted (covers 2 s FAT timestamps)
pub const RACY_WINDOW: jiff::SignedDuration = jiff::SignedDuration::from_secs(2);

/// What was uploaded for one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub size_bytes: u64,

    /// Local modification time seen when the task was enumerated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<jiff::Timestamp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// When the upload started, before any of the file was read
    pub started_at: jiff::Timestamp,
}

impl ManifestEntry {
    /// Entry for a task whose upload began at `started_at` and succeeded
    pub fn for_task(task: &UploadTask, etag: Option<String>, started_at: jiff::Timestamp) -> Self {
        Self {
            size_bytes: task.size_bytes,
            modified: task.modified,
            etag,
            started_at,
        }
    }

    /// Whether the recorded mtime is old enough to identify the uploaded content
    fn is_settled(&self) -> bool {
        self.modified
            .is_some_and(|m| self.started_at.duration_since(m) >= RACY_WINDOW)
    }
}

/// Manifest for one bucket/prefix destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub bucket: String,
    pub prefix: String,
    #[serde(default)]
    pub entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            bucket: bucket.into(),
            prefix: prefix.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Load a manifest, or start an empty one if the file does not exist
    ///
    /// A manifest written for another bucket/prefix is discarded.
    pub fn load(path: &Path, bucket: &str, prefix: &str) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new(bucket, prefix));
        }

        let content = std::fs::read_to_string(path)?;
        let manifest: Self = serde_json::from_str(&content)?;

        if manifest.version > MANIFEST_VERSION {
            return Err(Error::Config(format!(
                "Manifest {} has version {}, newer than supported version {}",
                path.display(),
                manifest.version,
                MANIFEST_VERSION
            )));
        }

        if manifest.bucket != bucket || manifest.prefix != prefix {
            tracing::warn!(
                "Manifest {} was written for s3://{}/{}, starting fresh",
                path.display(),
                manifest.bucket,
                manifest.prefix
            );
            return Ok(Self::new(bucket, prefix));
        }

        Ok(manifest)
    }

    /// Save the manifest, creating parent directories if needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Whether the task matches what was last uploaded for its key
    pub fn is_unchanged(&self, task: &UploadTask) -> bool {
        match self.entries.get(&task.key) {
            Some(entry) => {
                entry.is_settled()
                    && entry.size_bytes == task.size_bytes
                    && entry.modified == task.modified
            }
            None => false,
        }
    }

    pub fn record(&mut self, key: impl Into<String>, entry: ManifestEntry) {
        self.entries.insert(key.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
