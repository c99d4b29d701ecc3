use anyhow::Result;
use shelfguard_core::{Config, StatusUpdate, UploadRecord, UploadStatus};
use shelfguard_db::UploadRepository;
use shelfguard_storage::{guard_path, FileStore};
use std::sync::Arc;

use crate::claims::ClaimRegistry;

/// Status changes by the scanning collaborator can race a deletion; retry
/// the status write this many times while the record stays deletable.
const STATUS_WRITE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionKind {
    Retention { max_age_hours: u64 },
    Emergency,
}

impl EvictionKind {
    fn target_status(&self) -> UploadStatus {
        match self {
            EvictionKind::Retention { .. } => UploadStatus::AutoDeleted,
            EvictionKind::Emergency => UploadStatus::EmergencyDeleted,
        }
    }

    fn message(&self) -> String {
        match self {
            EvictionKind::Retention { max_age_hours } => {
                format!("Auto-deleted after {} hours", max_age_hours)
            }
            EvictionKind::Emergency => "Deleted during emergency disk cleanup".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictionResult {
    Deleted { bytes_freed: u64 },
    /// Another operation holds the record.
    Claimed,
    /// Left untouched; the reason is logged.
    Skipped(String),
}

/// Deletes one quarantine file and retires its record.
///
/// The file is removed before the status write, so an interrupted eviction
/// leaves a deletable record whose file is already gone; the next pass
/// finishes it.
#[derive(Clone)]
pub struct Evictor {
    config: Arc<Config>,
    repository: Arc<dyn UploadRepository>,
    files: Arc<dyn FileStore>,
    claims: ClaimRegistry,
}

impl Evictor {
    pub fn new(
        config: Arc<Config>,
        repository: Arc<dyn UploadRepository>,
        files: Arc<dyn FileStore>,
        claims: ClaimRegistry,
    ) -> Self {
        Self {
            config,
            repository,
            files,
            claims,
        }
    }

    pub fn repository(&self) -> &Arc<dyn UploadRepository> {
        &self.repository
    }

    #[tracing::instrument(
        skip(self, candidate, kind),
        fields(upload_id = %candidate.id, kind = ?kind)
    )]
    pub async fn evict(
        &self,
        candidate: &UploadRecord,
        kind: EvictionKind,
    ) -> Result<EvictionResult> {
        let Some(_claim) = self.claims.try_claim(candidate.id) else {
            tracing::debug!("Record claimed by another operation, skipping");
            return Ok(EvictionResult::Claimed);
        };

        let Some(mut current) = self.repository.get(candidate.id).await? else {
            return Ok(EvictionResult::Skipped("record disappeared".to_string()));
        };
        if !current.status.is_safe_to_delete() {
            tracing::debug!(status = %current.status, "Status left the deletable set, skipping");
            return Ok(EvictionResult::Skipped(format!("status is {}", current.status)));
        }

        let bytes_freed = match &current.quarantine_path {
            Some(path) => {
                let path = match guard_path(&self.config.paths.quarantine_dir, path) {
                    Ok(path) => path,
                    Err(e) => {
                        tracing::error!(error = %e, "Refusing to delete file outside quarantine");
                        return Ok(EvictionResult::Skipped(e.to_string()));
                    }
                };
                match self.files.remove(&path).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            path = %path.display(),
                            "Failed to delete quarantine file"
                        );
                        return Ok(EvictionResult::Skipped(e.to_string()));
                    }
                }
            }
            None => 0,
        };

        let to = kind.target_status();
        for _ in 0..STATUS_WRITE_ATTEMPTS {
            let update = StatusUpdate::new()
                .clear_quarantine_path()
                .error_message(kind.message());
            if self
                .repository
                .update_status(current.id, current.status, to, update)
                .await?
            {
                tracing::info!(
                    bytes_freed,
                    original_filename = %current.original_filename,
                    status = %to,
                    "Quarantine file deleted"
                );
                return Ok(EvictionResult::Deleted { bytes_freed });
            }

            match self.repository.get(current.id).await? {
                Some(latest) if latest.status.is_safe_to_delete() => current = latest,
                latest => {
                    tracing::warn!(
                        status = ?latest.map(|r| r.status),
                        "Record changed state after its file was deleted"
                    );
                    return Ok(EvictionResult::Skipped(
                        "status changed during eviction".to_string(),
                    ));
                }
            }
        }

        tracing::warn!("Status kept changing during eviction, leaving for next pass");
        Ok(EvictionResult::Skipped("status write contention".to_string()))
    }
}
