//! Directory mirror engine
//!
//! Walks the local root, skips files the manifest marks as unchanged, and
//! uploads the rest through an [`ObjectStore`] with a bounded number of
//! uploads in flight. Every file gets an [`Outcome`]; one file failing never
//! stops its siblings. Missing credentials stop the run and are reported once.

use std::sync::atomic::{AtomicBool, Ordering};

use futures::stream::{self, StreamExt};

use crate::config::MirrorConfig;
use crate::error::Result;
use crate::key::normalize_prefix;
use crate::manifest::{Manifest, ManifestEntry};
use crate::outcome::{FailureKind, MirrorReport, Outcome};
use crate::traits::{ObjectInfo, ObjectStore};
use crate::walk::{UploadTask, collect_tasks};

type OutcomeHook = Box<dyn Fn(&Outcome) + Send + Sync>;

/// Mirrors one local directory into one bucket/prefix
pub struct Mirror<S> {
    config: MirrorConfig,
    store: S,
    on_outcome: Option<OutcomeHook>,
}

impl<S: ObjectStore> Mirror<S> {
    pub fn new(config: MirrorConfig, store: S) -> Self {
        Self {
            config,
            store,
            on_outcome: None,
        }
    }

    /// Call `hook` for every outcome as soon as it is known
    pub fn on_outcome(mut self, hook: impl Fn(&Outcome) + Send + Sync + 'static) -> Self {
        self.on_outcome = Some(Box::new(hook));
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// List the tasks a run would process, without touching the store
    pub fn plan(&self) -> Result<Vec<UploadTask>> {
        collect_tasks(&self.config.local_root, &self.config.prefix)
    }

    /// Run the mirror and collect one outcome per file
    pub async fn run(&self) -> MirrorReport {
        let config = &self.config;
        let prefix = normalize_prefix(&config.prefix);
        let mut report = MirrorReport::new(&config.bucket, &prefix);

        let tasks = match self.plan() {
            Ok(tasks) => tasks,
            Err(err) => {
                tracing::error!("{err}");
                let fatal = MirrorReport::fatal(
                    &config.bucket,
                    &prefix,
                    &config.local_root,
                    FailureKind::LocalPathNotFound,
                    err.to_string(),
                );
                self.notify_all(&fatal);
                return fatal;
            }
        };

        tracing::info!(
            "Mirroring {} file(s) from {} to s3://{}/{}",
            tasks.len(),
            config.local_root.display(),
            config.bucket,
            prefix
        );

        let mut manifest = self.load_manifest(&prefix);

        let mut pending = Vec::with_capacity(tasks.len());
        for task in tasks {
            if manifest.as_ref().is_some_and(|m| m.is_unchanged(&task)) {
                tracing::debug!("Unchanged: {}", task.key);
                self.push(&mut report, Outcome::unchanged(task.local_path, task.key));
            } else if config.dry_run {
                self.push(&mut report, Outcome::planned(task.local_path, task.key));
            } else {
                pending.push(task);
            }
        }

        if !pending.is_empty() {
            self.upload_all(pending, &mut report, manifest.as_mut()).await;
        }

        if let (Some(manifest), Some(path)) = (&manifest, &config.manifest) {
            if !config.dry_run {
                match manifest.save(path) {
                    Ok(()) => tracing::debug!("Saved manifest {}", path.display()),
                    Err(err) => {
                        tracing::error!("Failed to save manifest {}: {err}", path.display())
                    }
                }
            }
        }

        report
    }

    async fn upload_all(
        &self,
        pending: Vec<UploadTask>,
        report: &mut MirrorReport,
        mut manifest: Option<&mut Manifest>,
    ) {
        let halted = AtomicBool::new(false);
        let store = &self.store;
        let bucket = self.config.bucket.as_str();

        let mut uploads = stream::iter(pending)
            .map(|task| {
                let halted = &halted;
                async move {
                    if halted.load(Ordering::SeqCst) {
                        return (task, None);
                    }

                    let content_type = mime_guess::from_path(&task.local_path)
                        .first()
                        .map(|m| m.essence_str().to_string());
                    let started = jiff::Timestamp::now();
                    let result = store
                        .put_object(&task.local_path, bucket, &task.key, content_type)
                        .await;

                    if let Err(err) = &result {
                        if FailureKind::classify(err) == FailureKind::CredentialsMissing {
                            halted.store(true, Ordering::SeqCst);
                        }
                    }

                    (task, Some((started, result)))
                }
            })
            .buffer_unordered(self.config.concurrency);

        let mut credentials_error: Option<String> = None;
        let mut not_attempted = 0usize;

        while let Some((task, result)) = uploads.next().await {
            match result {
                None => not_attempted += 1,
                Some((started, Ok(info))) => {
                    tracing::info!(
                        "Uploaded '{}' to 's3://{}/{}'",
                        task.local_path.display(),
                        bucket,
                        task.key
                    );
                    let ObjectInfo {
                        size_bytes, etag, ..
                    } = info;
                    if let Some(manifest) = manifest.as_deref_mut() {
                        manifest.record(
                            &task.key,
                            ManifestEntry::for_task(&task, etag.clone(), started),
                        );
                    }
                    self.push(
                        report,
                        Outcome::uploaded(task.local_path, task.key, size_bytes, etag),
                    );
                }
                Some((_, Err(err))) => {
                    let kind = FailureKind::classify(&err);
                    if kind == FailureKind::CredentialsMissing {
                        credentials_error.get_or_insert_with(|| err.to_string());
                        continue;
                    }

                    tracing::warn!(
                        "Error uploading '{}': {kind}: {err}",
                        task.local_path.display()
                    );
                    self.push(
                        report,
                        Outcome::failed(task.local_path, Some(task.key), kind, err.to_string()),
                    );
                }
            }
        }

        if let Some(message) = credentials_error {
            tracing::error!(
                "Credentials not found, stopping ({not_attempted} file(s) not attempted)"
            );
            self.push(
                report,
                Outcome::failed(
                    &self.config.local_root,
                    None,
                    FailureKind::CredentialsMissing,
                    message,
                ),
            );
        }
    }

    fn load_manifest(&self, prefix: &str) -> Option<Manifest> {
        let path = self.config.manifest.as_ref()?;
        match Manifest::load(path, &self.config.bucket, prefix) {
            Ok(manifest) => {
                tracing::debug!(
                    "Loaded manifest {} with {} entr(ies)",
                    path.display(),
                    manifest.len()
                );
                Some(manifest)
            }
            Err(err) => {
                tracing::warn!(
                    "Ignoring unreadable manifest {}: {err}",
                    path.display()
                );
                Some(Manifest::new(&self.config.bucket, prefix))
            }
        }
    }

    fn push(&self, report: &mut MirrorReport, outcome: Outcome) {
        if let Some(hook) = &self.on_outcome {
            hook(&outcome);
        }
        report.outcomes.push(outcome);
    }

    fn notify_all(&self, report: &MirrorReport) {
        if let Some(hook) = &self.on_outcome {
            report.outcomes.iter().for_each(|o| hook(o));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::outcome::OutcomeStatus;
    use crate::traits::MockObjectStore;
    use async_trait::async_trait;
    use std::collections::{BTreeSet, HashSet};
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    /// In-memory store recording every put
    #[derive(Default)]
    struct RecordingStore {
        puts: Mutex<Vec<String>>,
        fail_remote: HashSet<String>,
        no_credentials: bool,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl RecordingStore {
        fn failing(keys: &[&str]) -> Self {
            Self {
                fail_remote: keys.iter().map(|k| k.to_string()).collect(),
                ..Default::default()
            }
        }

        fn without_credentials() -> Self {
            Self {
                no_credentials: true,
                ..Default::default()
            }
        }

        fn put_count(&self) -> usize {
            self.puts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        async fn put_object(
            &self,
            local_path: &Path,
            _bucket: &str,
            key: &str,
            _content_type: Option<String>,
        ) -> Result<ObjectInfo> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.puts.lock().unwrap().push(key.to_string());

            if self.no_credentials {
                return Err(Error::Auth("no credentials in the provider chain".into()));
            }
            if self.fail_remote.contains(key) {
                return Err(Error::Remote {
                    code: "AccessDenied".into(),
                    message: "Access Denied".into(),
                });
            }

            let size = std::fs::metadata(local_path)?.len();
            Ok(ObjectInfo::file(key, size))
        }

        async fn bucket_exists(&self, _bucket: &str) -> Result<bool> {
            Ok(true)
        }
    }

    fn tree(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for file in files {
            let path = dir.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, file.as_bytes()).unwrap();
        }
        dir
    }

    /// Move every file's mtime a minute into the past
    fn backdate(dir: &Path) {
        let past = std::time::SystemTime::now() - std::time::Duration::from_secs(60);
        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry.unwrap();
            if entry.file_type().is_file() {
                std::fs::File::options()
                    .write(true)
                    .open(entry.path())
                    .unwrap()
                    .set_modified(past)
                    .unwrap();
            }
        }
    }

    fn keys_with(report: &MirrorReport, pred: impl Fn(&OutcomeStatus) -> bool) -> BTreeSet<String> {
        report
            .outcomes
            .iter()
            .filter(|o| pred(&o.status))
            .filter_map(|o| o.key.clone())
            .collect()
    }

    fn uploaded_keys(report: &MirrorReport) -> BTreeSet<String> {
        keys_with(report, |s| matches!(s, OutcomeStatus::Uploaded { .. }))
    }

    #[tokio::test]
    async fn test_uploads_every_file_with_prefix() {
        let dir = tree(&["config.json", "weights/part1.bin"]);
        let config = MirrorConfig::new(dir.path(), "models").prefix("llama318b");
        let mirror = Mirror::new(config, RecordingStore::default());

        let report = mirror.run().await;

        assert!(report.is_success());
        assert_eq!(report.uploaded(), 2);
        assert_eq!(
            uploaded_keys(&report),
            BTreeSet::from([
                "llama318b/config.json".to_string(),
                "llama318b/weights/part1.bin".to_string(),
            ])
        );
        assert_eq!(
            report.bytes_uploaded(),
            ("config.json".len() + "weights/part1.bin".len()) as u64
        );
    }

    #[tokio::test]
    async fn test_empty_prefix_has_no_leading_slash() {
        let dir = tree(&["weights/part1.bin"]);
        let mirror = Mirror::new(
            MirrorConfig::new(dir.path(), "models"),
            RecordingStore::default(),
        );

        let report = mirror.run().await;
        assert_eq!(
            uploaded_keys(&report),
            BTreeSet::from(["weights/part1.bin".to_string()])
        );
    }

    #[tokio::test]
    async fn test_missing_root_is_single_fatal_outcome() {
        let dir = TempDir::new().unwrap();
        let mut store = MockObjectStore::new();
        store.expect_put_object().never();

        let config = MirrorConfig::new(dir.path().join("missing"), "models");
        let report = Mirror::new(config, store).run().await;

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.exit_kind(), Some(FailureKind::LocalPathNotFound));
        assert!(report.outcomes[0].key.is_none());
    }

    #[tokio::test]
    async fn test_single_failure_does_not_stop_siblings() {
        let dir = tree(&["a.txt", "sub/b.txt"]);
        let mirror = Mirror::new(
            MirrorConfig::new(dir.path(), "models").concurrency(1),
            RecordingStore::failing(&["a.txt"]),
        );

        let report = mirror.run().await;

        assert_eq!(mirror.store().put_count(), 2);
        assert_eq!(
            uploaded_keys(&report),
            BTreeSet::from(["sub/b.txt".to_string()])
        );
        let failed: Vec<&Outcome> = report.outcomes.iter().filter(|o| o.is_failure()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].key.as_deref(), Some("a.txt"));
        assert_eq!(
            failed[0].status,
            OutcomeStatus::Failed {
                kind: FailureKind::RemoteRejected,
                message: "AccessDenied: Access Denied".into(),
            }
        );
        assert_eq!(report.exit_kind(), Some(FailureKind::RemoteRejected));
    }

    #[tokio::test]
    async fn test_store_reports_vanished_file() {
        let dir = tree(&["a.txt", "b.txt"]);
        let mut store = MockObjectStore::new();
        store.expect_put_object().returning(|_, _, key, _| {
            if key == "a.txt" {
                Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "No such file or directory",
                )))
            } else {
                Ok(ObjectInfo::file(key, 5))
            }
        });

        let report = Mirror::new(MirrorConfig::new(dir.path(), "b"), store)
            .run()
            .await;

        assert_eq!(report.uploaded(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.exit_kind(), Some(FailureKind::LocalFileVanished));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dangling_symlink_is_reported_vanished() {
        let dir = tree(&["a.txt"]);
        std::os::unix::fs::symlink(dir.path().join("gone.txt"), dir.path().join("broken.txt"))
            .unwrap();

        let report = Mirror::new(MirrorConfig::new(dir.path(), "b"), RecordingStore::default())
            .run()
            .await;

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(uploaded_keys(&report), BTreeSet::from(["a.txt".to_string()]));
        let broken = report
            .outcomes
            .iter()
            .find(|o| o.key.as_deref() == Some("broken.txt"))
            .unwrap();
        assert_eq!(broken.failure_kind(), Some(FailureKind::LocalFileVanished));
        assert_eq!(report.exit_kind(), Some(FailureKind::LocalFileVanished));
    }

    #[tokio::test]
    async fn test_missing_credentials_short_circuit() {
        let dir = tree(&["a.txt", "b.txt", "c/d.txt"]);
        let mirror = Mirror::new(
            MirrorConfig::new(dir.path(), "models").concurrency(1),
            RecordingStore::without_credentials(),
        );

        let report = mirror.run().await;

        assert_eq!(mirror.store().put_count(), 1);
        assert_eq!(report.outcomes.len(), 1);
        let fatal = report.fatal_outcome().unwrap();
        assert_eq!(fatal.failure_kind(), Some(FailureKind::CredentialsMissing));
        assert!(fatal.key.is_none());
        assert_eq!(report.exit_kind(), Some(FailureKind::CredentialsMissing));
    }

    #[tokio::test]
    async fn test_missing_credentials_reported_once_when_concurrent() {
        let dir = tree(&["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"]);
        let mirror = Mirror::new(
            MirrorConfig::new(dir.path(), "models").concurrency(4),
            RecordingStore::without_credentials(),
        );

        let report = mirror.run().await;

        assert!(mirror.store().put_count() < 5);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.exit_kind(), Some(FailureKind::CredentialsMissing));
    }

    #[tokio::test]
    async fn test_concurrency_limit() {
        let files: Vec<String> = (0..12).map(|i| format!("f{i}.bin")).collect();
        let refs: Vec<&str> = files.iter().map(String::as_str).collect();
        let dir = tree(&refs);

        let mirror = Mirror::new(
            MirrorConfig::new(dir.path(), "models").concurrency(3),
            RecordingStore::default(),
        );
        let report = mirror.run().await;

        assert_eq!(report.uploaded(), 12);
        let max = mirror.store().max_in_flight.load(Ordering::SeqCst);
        assert!(max >= 1 && max <= 3, "max in flight was {max}");
    }

    #[tokio::test]
    async fn test_run_twice_is_idempotent() {
        let dir = tree(&["a.txt", "sub/b.txt"]);
        let mirror = Mirror::new(
            MirrorConfig::new(dir.path(), "models").prefix("p"),
            RecordingStore::default(),
        );

        let first = mirror.run().await;
        let second = mirror.run().await;

        assert!(first.is_success() && second.is_success());
        assert_eq!(uploaded_keys(&first), uploaded_keys(&second));
        assert_eq!(mirror.store().put_count(), 4);
    }

    #[tokio::test]
    async fn test_manifest_skips_unchanged() {
        let dir = tree(&["a.txt", "sub/b.txt"]);
        backdate(dir.path());
        let state = TempDir::new().unwrap();
        let manifest_path = state.path().join("manifest.json");

        let config = MirrorConfig::new(dir.path(), "models")
            .prefix("p")
            .manifest(&manifest_path);
        let mirror = Mirror::new(config, RecordingStore::default());

        let first = mirror.run().await;
        assert_eq!(first.uploaded(), 2);
        assert!(manifest_path.exists());

        let second = mirror.run().await;
        assert_eq!(second.uploaded(), 0);
        assert_eq!(second.unchanged(), 2);
        assert_eq!(
            keys_with(&second, |s| matches!(s, OutcomeStatus::Unchanged)),
            uploaded_keys(&first)
        );
        assert_eq!(mirror.store().put_count(), 2);
    }

    #[tokio::test]
    async fn test_manifest_reuploads_same_size_rewrite() {
        let dir = tree(&["a.txt"]);
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"AAAA").unwrap();
        let state = TempDir::new().unwrap();
        let manifest_path = state.path().join("manifest.json");

        let config = MirrorConfig::new(dir.path(), "models").manifest(&manifest_path);
        let mirror = Mirror::new(config, RecordingStore::default());

        let first = mirror.run().await;
        assert_eq!(first.uploaded(), 1);

        std::fs::write(&path, b"BBBB").unwrap();
        let second = mirror.run().await;
        assert_eq!(second.uploaded(), 1);
        assert_eq!(second.unchanged(), 0);
        assert_eq!(mirror.store().put_count(), 2);
    }

    #[tokio::test]
    async fn test_manifest_does_not_record_failures() {
        let dir = tree(&["a.txt", "b.txt"]);
        let state = TempDir::new().unwrap();
        let manifest_path = state.path().join("manifest.json");

        let config = MirrorConfig::new(dir.path(), "models").manifest(&manifest_path);
        let report = Mirror::new(config, RecordingStore::failing(&["a.txt"]))
            .run()
            .await;
        assert_eq!(report.failed(), 1);

        let manifest = Manifest::load(&manifest_path, "models", "").unwrap();
        assert_eq!(manifest.len(), 1);
        assert!(manifest.entries.contains_key("b.txt"));
    }

    #[tokio::test]
    async fn test_dry_run_uploads_nothing() {
        let dir = tree(&["a.txt", "sub/b.txt"]);
        let mut store = MockObjectStore::new();
        store.expect_put_object().never();

        let config = MirrorConfig::new(dir.path(), "models")
            .prefix("models/")
            .dry_run(true);
        let report = Mirror::new(config, store).run().await;

        assert_eq!(report.planned(), 2);
        assert_eq!(report.prefix, "models");
        assert_eq!(
            keys_with(&report, |s| matches!(s, OutcomeStatus::Planned)),
            BTreeSet::from(["models/a.txt".to_string(), "models/sub/b.txt".to_string()])
        );
    }

    #[tokio::test]
    async fn test_content_type_is_guessed() {
        let dir = tree(&["config.json"]);
        let mut store = MockObjectStore::new();
        store
            .expect_put_object()
            .withf(|_, bucket, key, content_type| {
                bucket == "models"
                    && key == "config.json"
                    && content_type.as_deref() == Some("application/json")
            })
            .times(1)
            .returning(|_, _, key, _| Ok(ObjectInfo::file(key, 11)));

        let report = Mirror::new(MirrorConfig::new(dir.path(), "models"), store)
            .run()
            .await;
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_outcome_hook_sees_every_outcome() {
        let dir = tree(&["a.txt", "b.txt", "c.txt"]);
        let seen = std::sync::Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();

        let mirror = Mirror::new(
            MirrorConfig::new(dir.path(), "models"),
            RecordingStore::failing(&["b.txt"]),
        )
        .on_outcome(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let report = mirror.run().await;
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
