//! s3push-core: Core library for the s3push directory uploader
//!
//! This crate provides the core functionality of s3push, including:
//! - Settings file and run configuration
//! - Object key derivation from local paths
//! - Local directory traversal
//! - The ObjectStore trait for uploads
//! - The mirror engine and its per-file outcome report
//! - The change manifest used to skip unchanged files
//!
//! This crate is independent of any specific S3 SDK, so the engine can be
//! tested against in-memory stores.

pub mod config;
pub mod error;
pub mod key;
pub mod manifest;
pub mod mirror;
pub mod outcome;
pub mod traits;
pub mod walk;

pub use config::{
    MirrorConfig, RetryConfig, Settings, SettingsManager, StoreConfig, TimeoutConfig,
};
pub use error::{Error, Result};
pub use key::{key_for, normalize_prefix, object_key, relative_key};
pub use manifest::{Manifest, ManifestEntry};
pub use mirror::Mirror;
pub use outcome::{FailureKind, MirrorReport, Outcome, OutcomeStatus};
pub use traits::{ObjectInfo, ObjectStore};
pub use walk::{UploadTask, collect_tasks};
