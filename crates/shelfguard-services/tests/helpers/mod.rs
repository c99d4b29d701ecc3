#![allow(dead_code)]

pub mod fixtures;

use shelfguard_core::{Config, NewUpload, UploadRecord, UploadStatus};
use shelfguard_db::{InMemoryUploadRepository, UploadRepository};
use shelfguard_services::{LocalFileStore, QuarantineLifecycle, StaticDiskProbe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

pub const GIB: u64 = 1024 * 1024 * 1024;

/// Lifecycle wired to an in-memory record store, the local filesystem under a
/// temporary directory and a disk probe the test controls.
pub struct TestEnv {
    pub lifecycle: QuarantineLifecycle,
    pub repo: Arc<InMemoryUploadRepository>,
    pub probe: Arc<StaticDiskProbe>,
    pub _dir: TempDir,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = Config::rooted_at(dir.path());
        adjust(&mut config);

        let repo = Arc::new(InMemoryUploadRepository::new());
        let probe = Arc::new(StaticDiskProbe::new(100 * GIB, 50 * GIB));
        let lifecycle = QuarantineLifecycle::new(
            config,
            repo.clone(),
            Arc::new(LocalFileStore::default()),
            probe.clone(),
        );
        lifecycle.ensure_directories().await.expect("create directories");

        Self {
            lifecycle,
            repo,
            probe,
            _dir: dir,
        }
    }

    pub fn config(&self) -> &Config {
        self.lifecycle.config()
    }

    pub fn destination_dir(&self) -> PathBuf {
        self.config().paths.destination_dir()
    }

    /// Write `body` into quarantine and record it with `status`.
    pub async fn upload(&self, name: &str, body: &[u8], status: UploadStatus) -> UploadRecord {
        let path = self.write_quarantine(name, body);
        self.insert(NewUpload::new(name, body.len() as u64, path).with_status(status))
            .await
    }

    pub async fn upload_with_metadata(
        &self,
        name: &str,
        body: &[u8],
        title: &str,
        author: &str,
    ) -> UploadRecord {
        self.insert(
            NewUpload::new(name, body.len() as u64, self.write_quarantine(name, body))
                .with_status(UploadStatus::MetadataVerified)
                .with_metadata(title, author),
        )
        .await
    }

    pub async fn insert(&self, upload: NewUpload) -> UploadRecord {
        self.repo.insert(upload).await.expect("insert upload")
    }

    pub async fn record(&self, id: Uuid) -> UploadRecord {
        self.repo.get(id).await.expect("get upload").expect("upload exists")
    }

    fn write_quarantine(&self, name: &str, body: &[u8]) -> PathBuf {
        let path = self
            .config()
            .paths
            .quarantine_dir
            .join(format!("{}_{}", Uuid::new_v4().simple(), name));
        std::fs::write(&path, body).expect("write quarantine file");
        path
    }
}

/// Names of all entries directly inside `dir`, hidden ones included.
pub fn entries_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
