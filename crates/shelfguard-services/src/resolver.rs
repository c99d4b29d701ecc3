use anyhow::{anyhow, Result};
use shelfguard_core::{
    normalize_metadata, Config, ContentHash, Decision, DuplicateSource, UploadRecord,
    UploadStatus,
};
use shelfguard_db::UploadRepository;
use shelfguard_storage::FileStore;
use std::sync::Arc;

pub const REASON_INDEX_MATCH: &str = "hash match in index";
pub const REASON_DISK_MATCH: &str = "hash match on disk";

/// Decides whether a verified upload duplicates something already accepted.
///
/// Phases run in order and stop at the first match: the record store's hash
/// index, a hash scan of the library and unsorted trees, then a normalized
/// title/author comparison against accepted records.
#[derive(Clone)]
pub struct DuplicateResolver {
    config: Arc<Config>,
    repository: Arc<dyn UploadRepository>,
    files: Arc<dyn FileStore>,
}

impl DuplicateResolver {
    pub fn new(
        config: Arc<Config>,
        repository: Arc<dyn UploadRepository>,
        files: Arc<dyn FileStore>,
    ) -> Self {
        Self {
            config,
            repository,
            files,
        }
    }

    /// Recorded hash, or hash the quarantine file and record it (outside
    /// dry-run).
    pub async fn content_hash_of(&self, upload: &UploadRecord) -> Result<ContentHash> {
        if let Some(hash) = &upload.content_hash {
            return Ok(hash.clone());
        }
        let path = upload
            .quarantine_path
            .as_ref()
            .ok_or_else(|| anyhow!("Upload {} has no quarantine file", upload.id))?;
        let hash = self.files.hash(path).await?;
        if !self.config.moving.dry_run {
            self.repository.set_content_hash(upload.id, &hash).await?;
        }
        Ok(hash)
    }

    #[tracing::instrument(skip(self, upload), fields(upload_id = %upload.id))]
    pub async fn resolve(&self, upload: &UploadRecord) -> Result<Decision> {
        let hash = self.content_hash_of(upload).await?;

        if let Some(existing) = self.repository.get_by_hash(&hash).await? {
            if existing.id != upload.id {
                tracing::info!(
                    duplicate_of = %existing.id,
                    hash = %hash.short(),
                    "Duplicate found in index"
                );
                return Ok(Decision::ExactDuplicate {
                    of_id: Some(existing.id),
                    source: DuplicateSource::Index,
                    reason: REASON_INDEX_MATCH.to_string(),
                });
            }
        }

        if let Some(decision) = self.scan_filesystem(upload, &hash).await? {
            return Ok(decision);
        }

        if let (Some(title), Some(author)) = (
            normalize_metadata(upload.title.as_deref()),
            normalize_metadata(upload.author.as_deref()),
        ) {
            if let Some(existing) = self
                .repository
                .find_by_title_author(&title, &author, &[UploadStatus::Moved], upload.id)
                .await?
            {
                tracing::info!(conflicts_with = %existing.id, "Title/author conflict");
                return Ok(Decision::NameConflict { of_id: existing.id });
            }
        }

        Ok(Decision::Unique)
    }

    /// Hash files in the destination trees whose size equals the upload's.
    async fn scan_filesystem(
        &self,
        upload: &UploadRecord,
        hash: &ContentHash,
    ) -> Result<Option<Decision>> {
        let size = match &upload.quarantine_path {
            Some(path) => self.files.size(path).await.unwrap_or(upload.size_bytes),
            None => upload.size_bytes,
        };

        let candidates = self.files.walk_files(&self.config.paths.scan_roots()).await?;
        let mut hashed = 0usize;
        for entry in candidates.iter().filter(|e| e.size_bytes == size) {
            if upload.quarantine_path.as_deref() == Some(entry.path.as_path()) {
                continue;
            }
            hashed += 1;
            match self.files.hash(&entry.path).await {
                Ok(existing) if &existing == hash => {
                    tracing::info!(path = %entry.path.display(), "Duplicate found on disk");
                    return Ok(Some(Decision::ExactDuplicate {
                        of_id: None,
                        source: DuplicateSource::Disk {
                            path: entry.path.clone(),
                        },
                        reason: REASON_DISK_MATCH.to_string(),
                    }));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        path = %entry.path.display(),
                        "Failed to hash file during duplicate scan"
                    );
                }
            }
        }

        tracing::debug!(scanned = candidates.len(), hashed, "No duplicate on disk");
        Ok(None)
    }
}
