use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use shelfguard_core::{
    Config, ContentHash, NewUpload, StatusUpdate, UploadRecord, UploadStatus,
};
use shelfguard_db::{InMemoryUploadRepository, UploadRepository};
use shelfguard_storage::LocalFileStore;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

use super::{EmergencyReclaimer, Evictor, RetentionSweeper};
use crate::claims::ClaimRegistry;

pub(crate) struct Fixture {
    pub _dir: TempDir,
    pub config: Arc<Config>,
    pub repo: Arc<InMemoryUploadRepository>,
    pub files: Arc<LocalFileStore>,
    pub claims: ClaimRegistry,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::rooted_at(dir.path());
        adjust(&mut config);
        std::fs::create_dir_all(&config.paths.quarantine_dir).unwrap();
        Self {
            _dir: dir,
            config: Arc::new(config),
            repo: Arc::new(InMemoryUploadRepository::new()),
            files: Arc::new(LocalFileStore::default()),
            claims: ClaimRegistry::new(),
        }
    }

    pub fn evictor(&self) -> Evictor {
        Evictor::new(
            self.config.clone(),
            self.repo.clone(),
            self.files.clone(),
            self.claims.clone(),
        )
    }

    pub fn sweeper(&self) -> RetentionSweeper {
        RetentionSweeper::new(self.config.clone(), self.evictor())
    }

    /// Sweeper whose record store refuses every query.
    pub fn offline_sweeper(&self) -> RetentionSweeper {
        let evictor = Evictor::new(
            self.config.clone(),
            Arc::new(OfflineRepository),
            self.files.clone(),
            self.claims.clone(),
        );
        RetentionSweeper::new(self.config.clone(), evictor)
    }

    pub fn reclaimer(&self) -> EmergencyReclaimer {
        EmergencyReclaimer::new(self.evictor())
    }

    /// Write `size` bytes into quarantine and record them `age_hours` old.
    pub async fn upload(
        &self,
        name: &str,
        size: u64,
        age_hours: i64,
        status: UploadStatus,
    ) -> UploadRecord {
        let path = self
            .config
            .paths
            .quarantine_dir
            .join(format!("{}_{}", Uuid::new_v4().simple(), name));
        std::fs::write(&path, vec![7u8; size as usize]).unwrap();
        self.upload_at(name, size, age_hours, status, &path).await
    }

    pub async fn upload_at(
        &self,
        name: &str,
        size: u64,
        age_hours: i64,
        status: UploadStatus,
        path: &Path,
    ) -> UploadRecord {
        self.repo
            .insert(
                NewUpload::new(name, size, path)
                    .with_status(status)
                    .created_at(Utc::now() - Duration::hours(age_hours) - Duration::minutes(1)),
            )
            .await
            .unwrap()
    }

    pub async fn status(&self, id: Uuid) -> UploadStatus {
        self.repo.get(id).await.unwrap().unwrap().status
    }

    pub async fn file_exists(&self, record: &UploadRecord) -> bool {
        record.quarantine_path.as_ref().is_some_and(|p| p.exists())
    }
}

/// Record store that is unreachable.
pub(crate) struct OfflineRepository;

#[async_trait]
impl UploadRepository for OfflineRepository {
    async fn insert(&self, _upload: NewUpload) -> Result<UploadRecord> {
        bail!("record store offline")
    }

    async fn get(&self, _id: Uuid) -> Result<Option<UploadRecord>> {
        bail!("record store offline")
    }

    async fn get_by_hash(&self, _hash: &ContentHash) -> Result<Option<UploadRecord>> {
        bail!("record store offline")
    }

    async fn list_by_status_older_than(
        &self,
        _statuses: &[UploadStatus],
        _cutoff: DateTime<Utc>,
    ) -> Result<Vec<UploadRecord>> {
        bail!("record store offline")
    }

    async fn list_by_status(&self, _statuses: &[UploadStatus]) -> Result<Vec<UploadRecord>> {
        bail!("record store offline")
    }

    async fn update_status(
        &self,
        _id: Uuid,
        _from: UploadStatus,
        _to: UploadStatus,
        _update: StatusUpdate,
    ) -> Result<bool> {
        bail!("record store offline")
    }

    async fn set_content_hash(&self, _id: Uuid, _hash: &ContentHash) -> Result<bool> {
        bail!("record store offline")
    }

    async fn total_size_by_status(&self, _statuses: &[UploadStatus]) -> Result<u64> {
        bail!("record store offline")
    }

    async fn find_by_title_author(
        &self,
        _title: &str,
        _author: &str,
        _statuses: &[UploadStatus],
        _exclude: Uuid,
    ) -> Result<Option<UploadRecord>> {
        bail!("record store offline")
    }

    async fn count_by_status(&self) -> Result<BTreeMap<UploadStatus, u64>> {
        bail!("record store offline")
    }
}
