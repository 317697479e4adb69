//! Exit code definitions for the s3push CLI
//!
//! Scripts rely on these values; changing one is a breaking change.

use s3push_core::{Error, FailureKind, MirrorReport};

/// Exit codes for the s3push CLI application.
///
/// These codes follow a consistent convention to allow scripts and automation
/// to handle different error scenarios appropriately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Every file was uploaded, unchanged, or planned
    Success = 0,

    /// At least one file failed to upload
    GeneralError = 1,

    /// User input error: invalid arguments, bad settings file, etc.
    UsageError = 2,

    /// Retryable network error: timeout, connection reset, 503, etc.
    NetworkError = 3,

    /// No usable credentials
    AuthError = 4,

    /// Local root or bucket does not exist
    NotFound = 5,

    /// Backend or configuration asks for an unsupported feature
    UnsupportedFeature = 7,

    /// Operation was interrupted (e.g., Ctrl+C)
    Interrupted = 130,
}

impl ExitCode {
    /// Convert exit code to i32 for use with std::process::exit
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Create exit code from i32 value
    ///
    /// Returns None if the value doesn't correspond to a known exit code.
    pub const fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::GeneralError),
            2 => Some(Self::UsageError),
            3 => Some(Self::NetworkError),
            4 => Some(Self::AuthError),
            5 => Some(Self::NotFound),
            7 => Some(Self::UnsupportedFeature),
            130 => Some(Self::Interrupted),
            _ => None,
        }
    }

    /// Exit code for a library error
    pub fn from_error(error: &Error) -> Self {
        Self::from_i32(error.exit_code()).unwrap_or(Self::GeneralError)
    }

    /// Exit code for a finished run
    pub fn from_report(report: &MirrorReport) -> Self {
        match report.exit_kind() {
            None => Self::Success,
            Some(FailureKind::LocalPathNotFound) => Self::NotFound,
            Some(FailureKind::CredentialsMissing) => Self::AuthError,
            Some(FailureKind::LocalFileVanished | FailureKind::RemoteRejected) => {
                Self::GeneralError
            }
        }
    }
}
