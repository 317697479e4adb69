//! Error types for s3push-core
//!
//! Provides a unified error type that can be converted to appropriate exit codes.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for s3push-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for s3push-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Settings file or run configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Path cannot be turned into an object key
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The directory to mirror does not exist or is not a directory
    #[error("Local folder '{}' not found", .0.display())]
    LocalPathNotFound(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// No usable credentials could be resolved
    #[error("Credentials not found: {0}")]
    Auth(String),

    /// Local file or remote resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network error (retryable)
    #[error("Network error: {0}")]
    Network(String),

    /// The store answered with an error response
    #[error("{code}: {message}")]
    Remote { code: String, message: String },

    /// Feature not supported by backend
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Get the appropriate exit code for this error
    pub const fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidPath(_) | Error::InvalidUrl(_) => 2,       // UsageError
            Error::Config(_) => 2,                                   // UsageError
            Error::TomlParse(_) => 2,                                // UsageError
            Error::Network(_) => 3,                                  // NetworkError
            Error::Auth(_) => 4,                                     // AuthError
            Error::NotFound(_) | Error::LocalPathNotFound(_) => 5,   // NotFound
            Error::UnsupportedFeature(_) => 7,                       // UnsupportedFeature
            _ => 1,                                                  // GeneralError
        }
    }

    /// Whether this error means a local file disappeared before it could be read
    pub fn is_local_not_found(&self) -> bool {
        match self {
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            Error::NotFound(_) => true,
            _ => false,
        }
    }
}
