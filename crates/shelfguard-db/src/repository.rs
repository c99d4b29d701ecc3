use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shelfguard_core::{ContentHash, NewUpload, StatusUpdate, UploadRecord, UploadStatus};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Read/write contract over upload records.
///
/// `update_status` is the per-record guard: it only applies when the stored
/// status still equals `from`, and reports whether it did.
#[async_trait]
pub trait UploadRepository: Send + Sync {
    async fn insert(&self, upload: NewUpload) -> Result<UploadRecord>;

    async fn get(&self, id: Uuid) -> Result<Option<UploadRecord>>;

    /// The `moved` record holding `hash`, if any.
    async fn get_by_hash(&self, hash: &ContentHash) -> Result<Option<UploadRecord>>;

    /// Records in `statuses` created before `cutoff`, oldest first.
    async fn list_by_status_older_than(
        &self,
        statuses: &[UploadStatus],
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<UploadRecord>>;

    /// Records in `statuses`, oldest first.
    async fn list_by_status(&self, statuses: &[UploadStatus]) -> Result<Vec<UploadRecord>>;

    /// Compare-and-swap on status. Returns `false` when the record is missing
    /// or no longer in `from`. Illegal transitions are errors.
    async fn update_status(
        &self,
        id: Uuid,
        from: UploadStatus,
        to: UploadStatus,
        update: StatusUpdate,
    ) -> Result<bool>;

    /// Set the content hash if none is recorded yet.
    async fn set_content_hash(&self, id: Uuid, hash: &ContentHash) -> Result<bool>;

    /// Sum of `size_bytes` over records in `statuses`.
    async fn total_size_by_status(&self, statuses: &[UploadStatus]) -> Result<u64>;

    /// Oldest record in `statuses`, other than `exclude`, whose normalized
    /// title and author equal the given (already normalized) values.
    async fn find_by_title_author(
        &self,
        title: &str,
        author: &str,
        statuses: &[UploadStatus],
        exclude: Uuid,
    ) -> Result<Option<UploadRecord>>;

    async fn count_by_status(&self) -> Result<BTreeMap<UploadStatus, u64>>;
}

/// Refuse non-monotonic transitions before they reach storage.
pub fn ensure_transition(from: UploadStatus, to: UploadStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Invalid status transition: {} -> {}", from, to))
    }
}
