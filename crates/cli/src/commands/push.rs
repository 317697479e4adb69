//! push - mirror a local directory into a bucket
//!
//! Resolves the run configuration from flags, environment and the settings
//! file, builds the S3 client and drives the mirror engine, printing one line
//! per file.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Args;
use s3push_core::{
    MirrorConfig, ObjectStore as _, Settings, SettingsManager, StoreConfig,
    config::DEFAULT_CONCURRENCY,
};
use s3push_s3::{MultipartConfig, S3Client};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, ProgressBar};

/// Mirror a local directory into a bucket
#[derive(Args, Debug, Clone)]
pub struct PushArgs {
    /// Local directory to mirror
    #[arg(env = "LOCAL_DIR", value_name = "LOCAL_DIR")]
    pub local_dir: PathBuf,

    /// Target bucket
    #[arg(short, long, env = "BUCKET")]
    pub bucket: String,

    /// Key prefix prepended to every relative path
    #[arg(short, long, env = "PREFIX", default_value = "")]
    pub prefix: String,

    /// S3 endpoint URL (e.g., "http://localhost:9000"); AWS when omitted
    #[arg(long, env = "ENDPOINT")]
    pub endpoint: Option<String>,

    /// Access key ID
    #[arg(long, env = "ACCESS_KEY", requires = "secret_key")]
    pub access_key: Option<String>,

    /// Secret access key
    #[arg(long, env = "SECRET_KEY", hide_env_values = true, requires = "access_key")]
    pub secret_key: Option<String>,

    /// Signing region (default: us-east-1)
    #[arg(long, env = "REGION")]
    pub region: Option<String>,

    /// Bucket lookup style: auto, path, or dns (default: auto)
    #[arg(long)]
    pub bucket_lookup: Option<String>,

    /// Maximum number of uploads in flight (default: 4)
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Upload files of at least this many MiB in parts of this size
    #[arg(long, value_name = "MIB")]
    pub part_size: Option<u64>,

    /// Manifest file used to skip files unchanged since the last run
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Only show what would be uploaded
    #[arg(long)]
    pub dry_run: bool,

    /// Fail before uploading if the bucket does not exist
    #[arg(long)]
    pub check_bucket: bool,

    /// Settings file (default: ~/.config/s3push/config.toml)
    #[arg(long, env = "S3PUSH_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Execute the push command
pub async fn execute(args: PushArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config.clone());

    let settings = match load_settings(args.config.clone()) {
        Ok(s) => s,
        Err(e) => {
            formatter.error(&format!("Failed to load settings: {e}"));
            return ExitCode::from_error(&e);
        }
    };

    let (mirror_config, store_config) = match resolve(&args, &settings) {
        Ok(resolved) => resolved,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return ExitCode::UsageError;
        }
    };
    tracing::debug!("Resolved {mirror_config:?} with {store_config:?}");

    let mut client = match S3Client::new(store_config).await {
        Ok(c) => c,
        Err(e) => {
            formatter.error(&format!("Failed to create S3 client: {e}"));
            return ExitCode::from_error(&e);
        }
    };
    if let Some(mib) = args.part_size {
        let bytes = mib.saturating_mul(1024 * 1024);
        client = client.with_multipart(MultipartConfig::new().part_size(bytes).threshold(bytes));
    }

    if args.check_bucket && !mirror_config.dry_run {
        match client.bucket_exists(&mirror_config.bucket).await {
            Ok(true) => {}
            Ok(false) => {
                formatter.error(&format!("Bucket '{}' not found", mirror_config.bucket));
                return ExitCode::NotFound;
            }
            Err(e) => {
                formatter.error(&format!("Failed to check bucket: {e}"));
                return ExitCode::from_error(&e);
            }
        }
    }

    let bucket = mirror_config.bucket.clone();
    let mirror = s3push_core::Mirror::new(mirror_config, client);

    let total = mirror.plan().map(|tasks| tasks.len() as u64).unwrap_or(0);
    let progress = ProgressBar::new(&output_config, total);

    let hook_formatter = formatter.clone();
    let hook_progress = progress.clone();
    let mirror = mirror.on_outcome(move |outcome| {
        if let Some(key) = &outcome.key {
            hook_progress.set_message(key);
        }
        hook_progress.inc(1);
        if !hook_formatter.is_json() {
            hook_progress.suspend(|| hook_formatter.outcome(&bucket, outcome));
        }
    });

    let report = tokio::select! {
        report = mirror.run() => report,
        _ = tokio::signal::ctrl_c() => {
            progress.finish_and_clear();
            formatter.error("Interrupted");
            return ExitCode::Interrupted;
        }
    };
    progress.finish_and_clear();

    formatter.report(&report);
    ExitCode::from_report(&report)
}

fn load_settings(path: Option<PathBuf>) -> s3push_core::Result<Settings> {
    let manager = match path {
        Some(path) => SettingsManager::with_path(path),
        None => SettingsManager::new()?,
    };
    tracing::debug!("Loading settings from {}", manager.config_path().display());
    manager.load()
}

/// Merge flags and environment over the settings file
fn resolve(args: &PushArgs, settings: &Settings) -> anyhow::Result<(MirrorConfig, StoreConfig)> {
    if args.bucket.trim().is_empty() {
        bail!("Bucket name cannot be empty");
    }

    let mut store = settings.store_config();
    if let Some(endpoint) = &args.endpoint {
        store.endpoint = Some(endpoint.clone());
    }
    if let Some(region) = &args.region {
        store.region = region.clone();
    }
    if let Some(lookup) = &args.bucket_lookup {
        store.bucket_lookup = lookup.clone();
    }
    store.access_key = args.access_key.clone();
    store.secret_key = args.secret_key.clone();
    store.validate().context("Invalid store configuration")?;

    let concurrency = args
        .concurrency
        .or(settings.upload.concurrency)
        .unwrap_or(DEFAULT_CONCURRENCY);
    if concurrency == 0 {
        bail!("Concurrency must be at least 1");
    }

    let mut mirror = MirrorConfig::new(&args.local_dir, args.bucket.trim())
        .prefix(&args.prefix)
        .concurrency(concurrency)
        .dry_run(args.dry_run);
    if let Some(manifest) = args.manifest.as_ref().or(settings.upload.manifest.as_ref()) {
        mirror = mirror.manifest(manifest);
    }
    mirror.validate().context("Invalid run configuration")?;

    Ok((mirror, store))
}
