//! Configuration management
//!
//! Two layers feed a run. The optional settings file (TOML, at
//! ~/.config/s3push/config.toml) carries defaults for the store connection and
//! upload behaviour. Command-line flags and environment variables override it.
//! The result is an immutable [`MirrorConfig`] plus [`StoreConfig`] handed to
//! the uploader at construction.
//!
//! Credentials are never read from or written to the settings file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Current settings schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Default number of uploads in flight
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Upper bound for `concurrency`
pub const MAX_CONCURRENCY: usize = 256;

/// Region used when none is configured; MinIO expects this one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Retry configuration for store requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff duration in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    100
}

fn default_max_backoff() -> u64 {
    10000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

/// Timeout configuration for store requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_ms: u64,

    /// Read timeout in milliseconds
    #[serde(default = "default_read_timeout")]
    pub read_ms: u64,
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_read_timeout() -> u64 {
    30000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_timeout(),
            read_ms: default_read_timeout(),
        }
    }
}

/// Connection settings for the object store
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Custom endpoint URL; `None` uses the AWS default endpoint
    pub endpoint: Option<String>,

    /// Access key ID; with `secret_key`, selects static credentials
    pub access_key: Option<String>,

    /// Secret access key
    pub secret_key: Option<String>,

    /// Signing region
    pub region: String,

    /// Signature version; only "v4" is supported
    pub signature: String,

    /// Bucket lookup style: "auto", "path", or "dns"
    pub bucket_lookup: String,

    pub retry: RetryConfig,

    pub timeout: TimeoutConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            access_key: None,
            secret_key: None,
            region: DEFAULT_REGION.to_string(),
            signature: "v4".to_string(),
            bucket_lookup: "auto".to_string(),
            retry: RetryConfig::default(),
            timeout: TimeoutConfig::default(),
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("region", &self.region)
            .field("signature", &self.signature)
            .field("bucket_lookup", &self.bucket_lookup)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl StoreConfig {
    /// Static credentials, if both keys are set
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (&self.access_key, &self.secret_key) {
            (Some(access), Some(secret)) => Some((access.as_str(), secret.as_str())),
            _ => None,
        }
    }

    /// Whether requests should use path-style addressing
    ///
    /// "auto" picks path style for custom endpoints (MinIO and friends) and
    /// virtual-hosted style for AWS.
    pub fn force_path_style(&self) -> bool {
        match self.bucket_lookup.as_str() {
            "path" => true,
            "dns" => false,
            _ => self.endpoint.is_some(),
        }
    }

    /// Check the settings for obvious mistakes before building a client
    pub fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.endpoint {
            let url = url::Url::parse(endpoint)?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(Error::Config(format!(
                    "Endpoint must be http or https: {endpoint}"
                )));
            }
        }

        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(Error::Config(
                "Access key and secret key must be given together".into(),
            ));
        }

        if self.region.is_empty() {
            return Err(Error::Config("Region cannot be empty".into()));
        }

        match self.signature.as_str() {
            "v4" | "s3v4" => {}
            other => {
                return Err(Error::UnsupportedFeature(format!(
                    "Signature version '{other}' is not supported, use v4"
                )));
            }
        }

        match self.bucket_lookup.as_str() {
            "auto" | "path" | "dns" => {}
            other => {
                return Err(Error::Config(format!(
                    "Invalid bucket lookup '{other}', expected auto, path or dns"
                )));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::Config("Retry max_attempts must be at least 1".into()));
        }

        Ok(())
    }
}

/// What to mirror and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    /// Root directory to mirror
    pub local_root: PathBuf,

    /// Target bucket
    pub bucket: String,

    /// Key prefix prepended to every relative path
    pub prefix: String,

    /// Maximum number of uploads in flight
    pub concurrency: usize,

    /// Change manifest used to skip unchanged files
    pub manifest: Option<PathBuf>,

    /// Plan only, upload nothing
    pub dry_run: bool,
}

impl MirrorConfig {
    pub fn new(local_root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            local_root: local_root.into(),
            bucket: bucket.into(),
            prefix: String::new(),
            concurrency: DEFAULT_CONCURRENCY,
            manifest: None,
            dry_run: false,
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.clamp(1, MAX_CONCURRENCY);
        self
    }

    pub fn manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest = Some(path.into());
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(Error::Config("Bucket name cannot be empty".into()));
        }
        Ok(())
    }
}

/// Settings file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    pub schema_version: u32,

    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub upload: UploadSettings,
}

/// Store connection defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_lookup: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutConfig>,
}

/// Upload behaviour defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            store: StoreSettings::default(),
            upload: UploadSettings::default(),
        }
    }
}

impl Settings {
    /// Store configuration with file defaults applied over built-in ones
    pub fn store_config(&self) -> StoreConfig {
        let base = StoreConfig::default();
        StoreConfig {
            endpoint: self.store.endpoint.clone(),
            region: self.store.region.clone().unwrap_or(base.region),
            signature: self.store.signature.clone().unwrap_or(base.signature),
            bucket_lookup: self
                .store
                .bucket_lookup
                .clone()
                .unwrap_or(base.bucket_lookup),
            retry: self.store.retry.clone().unwrap_or_default(),
            timeout: self.store.timeout.clone().unwrap_or_default(),
            ..base
        }
    }
}

/// Settings manager handles locating and loading the settings file
#[derive(Debug)]
pub struct SettingsManager {
    config_path: PathBuf,
}

impl SettingsManager {
    /// Create a new SettingsManager with the default path
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".into()))?;
        let config_path = config_dir.join("s3push").join("config.toml");
        Ok(Self { config_path })
    }

    /// Create a SettingsManager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the settings file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load settings from disk
    ///
    /// A missing file yields the default settings.
    pub fn load(&self) -> Result<Settings> {
        if !self.config_path.exists() {
            tracing::debug!(
                "No settings file at {}, using defaults",
                self.config_path.display()
            );
            return Ok(Settings::default());
        }

        let content = std::fs::read_to_string(&self.config_path)?;
        let mut settings: Settings = toml::from_str(&content)?;

        if settings.schema_version > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "Settings file version {} is newer than supported version {}. Please upgrade s3push.",
                settings.schema_version, SCHEMA_VERSION
            )));
        }
        settings.schema_version = SCHEMA_VERSION;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_settings_manager() -> (SettingsManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let manager = SettingsManager::with_path(config_path);
        (manager, temp_dir)
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.schema_version, SCHEMA_VERSION);
        let store = settings.store_config();
        assert_eq!(store.region, "us-east-1");
        assert_eq!(store.signature, "v4");
        assert_eq!(store.bucket_lookup, "auto");
        assert!(store.endpoint.is_none());
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let (manager, _temp_dir) = temp_settings_manager();
        let settings = manager.load().unwrap();
        assert_eq!(settings.schema_version, SCHEMA_VERSION);
        assert!(settings.upload.concurrency.is_none());
    }

    #[test]
    fn test_load_full_file() {
        let (manager, _temp_dir) = temp_settings_manager();
        std::fs::write(
            manager.config_path(),
            r#"
schema_version = 1

[store]
endpoint = "http://localhost:9000"

[store.retry]
max_attempts = 5
initial_backoff_ms = 100
max_backoff_ms = 10000

[upload]
concurrency = 8
"#,
        )
        .unwrap();

        let loaded = manager.load().unwrap();

        assert_eq!(loaded.upload.concurrency, Some(8));
        let store = loaded.store_config();
        assert_eq!(store.endpoint.as_deref(), Some("http://localhost:9000"));
        assert_eq!(store.retry.max_attempts, 5);
        assert_eq!(store.retry.initial_backoff_ms, 100);
    }

    #[test]
    fn test_partial_file() {
        let (manager, _temp_dir) = temp_settings_manager();
        std::fs::write(
            manager.config_path(),
            r#"
            schema_version = 1

            [store]
            region = "eu-west-1"

            [store.timeout]
            connect_ms = 1000
            "#,
        )
        .unwrap();

        let store = manager.load().unwrap().store_config();
        assert_eq!(store.region, "eu-west-1");
        assert_eq!(store.timeout.connect_ms, 1000);
        assert_eq!(store.timeout.read_ms, 30000);
    }

    #[test]
    fn test_schema_version_too_new() {
        let (manager, _temp_dir) = temp_settings_manager();

        let content = format!(
            r#"
            schema_version = {}
            "#,
            SCHEMA_VERSION + 1
        );
        std::fs::write(manager.config_path(), content).unwrap();

        let result = manager.load();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("newer than supported")
        );
    }

    #[test]
    fn test_store_validate() {
        let store = StoreConfig {
            endpoint: Some("http://localhost:9000".into()),
            access_key: Some("minio".into()),
            secret_key: Some("minio".into()),
            ..Default::default()
        };
        assert!(store.validate().is_ok());
        assert_eq!(store.static_credentials(), Some(("minio", "minio")));

        let half_keys = StoreConfig {
            access_key: Some("minio".into()),
            ..Default::default()
        };
        assert!(matches!(half_keys.validate(), Err(Error::Config(_))));

        let bad_url = StoreConfig {
            endpoint: Some("not a url".into()),
            ..Default::default()
        };
        assert!(matches!(bad_url.validate(), Err(Error::InvalidUrl(_))));

        let v2 = StoreConfig {
            signature: "v2".into(),
            ..Default::default()
        };
        assert!(matches!(v2.validate(), Err(Error::UnsupportedFeature(_))));
    }

    #[test]
    fn test_force_path_style() {
        let aws = StoreConfig::default();
        assert!(!aws.force_path_style());

        let minio = StoreConfig {
            endpoint: Some("http://localhost:9000".into()),
            ..Default::default()
        };
        assert!(minio.force_path_style());

        let dns = StoreConfig {
            bucket_lookup: "dns".into(),
            ..minio.clone()
        };
        assert!(!dns.force_path_style());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let store = StoreConfig {
            access_key: Some("AKIA".into()),
            secret_key: Some("hunter2".into()),
            ..Default::default()
        };
        let debug = format!("{store:?}");
        assert!(debug.contains("AKIA"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_mirror_config_builder() {
        let config = MirrorConfig::new("./models", "models")
            .prefix("llama318b")
            .concurrency(0)
            .dry_run(true);
        assert_eq!(config.prefix, "llama318b");
        assert_eq!(config.concurrency, 1);
        assert!(config.dry_run);
        assert!(config.manifest.is_none());
        assert!(config.validate().is_ok());

        assert!(MirrorConfig::new("./models", "").validate().is_err());
        assert_eq!(
            MirrorConfig::new(".", "b").concurrency(10_000).concurrency,
            MAX_CONCURRENCY
        );
    }
}
