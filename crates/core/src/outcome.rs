//! Per-file outcomes and the run report
//!
//! Every task of a run ends up as exactly one [`Outcome`]. Run-wide failures
//! (missing root, missing credentials) are reported as a single fatal outcome
//! without a key.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::Error;

/// Classified cause of a failed upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The mirrored root does not exist
    LocalPathNotFound,
    /// The file disappeared between enumeration and upload
    LocalFileVanished,
    /// No usable credentials could be resolved
    CredentialsMissing,
    /// The store returned an error
    RemoteRejected,
}

impl FailureKind {
    /// Classify an upload error
    pub fn classify(error: &Error) -> Self {
        match error {
            Error::LocalPathNotFound(_) => Self::LocalPathNotFound,
            Error::Auth(_) => Self::CredentialsMissing,
            e if e.is_local_not_found() => Self::LocalFileVanished,
            _ => Self::RemoteRejected,
        }
    }

    /// Fatal kinds stop the whole run
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::LocalPathNotFound | Self::CredentialsMissing)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocalPathNotFound => "local path not found",
            Self::LocalFileVanished => "local file vanished",
            Self::CredentialsMissing => "credentials missing",
            Self::RemoteRejected => "remote rejected",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of processing one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Object written to the store
    Uploaded {
        size_bytes: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        etag: Option<String>,
    },
    /// Skipped because the manifest says the file has not changed
    Unchanged,
    /// Dry run: would have been uploaded
    Planned,
    /// Upload failed
    Failed { kind: FailureKind, message: String },
}

/// Outcome record for a single file, or for the run as a whole
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub local_path: PathBuf,

    /// Destination key; `None` for run-wide failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl Outcome {
    pub fn uploaded(
        local_path: impl Into<PathBuf>,
        key: impl Into<String>,
        size_bytes: u64,
        etag: Option<String>,
    ) -> Self {
        Self {
            local_path: local_path.into(),
            key: Some(key.into()),
            status: OutcomeStatus::Uploaded { size_bytes, etag },
        }
    }

    pub fn unchanged(local_path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            key: Some(key.into()),
            status: OutcomeStatus::Unchanged,
        }
    }

    pub fn planned(local_path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            key: Some(key.into()),
            status: OutcomeStatus::Planned,
        }
    }

    pub fn failed(
        local_path: impl Into<PathBuf>,
        key: Option<String>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            local_path: local_path.into(),
            key,
            status: OutcomeStatus::Failed {
                kind,
                message: message.into(),
            },
        }
    }

    /// Failure kind, if this outcome is a failure
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.status {
            OutcomeStatus::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure_kind().is_some()
    }
}

/// Collected outcomes of one mirror run
#[derive(Debug, Clone, Default, Serialize)]
pub struct MirrorReport {
    pub bucket: String,
    pub prefix: String,
    pub outcomes: Vec<Outcome>,
}

impl MirrorReport {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            outcomes: Vec::new(),
        }
    }

    /// Report holding a single run-wide failure
    pub fn fatal(
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        local_path: impl Into<PathBuf>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        let mut report = Self::new(bucket, prefix);
        report
            .outcomes
            .push(Outcome::failed(local_path, None, kind, message));
        report
    }

    fn count(&self, pred: impl Fn(&OutcomeStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub fn uploaded(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Uploaded { .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Unchanged))
    }

    pub fn planned(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Planned))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Failed { .. }))
    }

    /// Total bytes written to the store
    pub fn bytes_uploaded(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| match o.status {
                OutcomeStatus::Uploaded { size_bytes, .. } => size_bytes,
                _ => 0,
            })
            .sum()
    }

    /// True when no outcome is a failure
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// The run-wide failure, if the run was stopped by one
    pub fn fatal_outcome(&self) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|o| o.failure_kind().is_some_and(FailureKind::is_fatal))
    }

    /// The failure kind that best describes the run
    ///
    /// Fatal kinds win over per-file ones; `None` when everything succeeded.
    pub fn exit_kind(&self) -> Option<FailureKind> {
        if let Some(fatal) = self.fatal_outcome() {
            return fatal.failure_kind();
        }
        self.outcomes.iter().find_map(Outcome::failure_kind)
    }
}
