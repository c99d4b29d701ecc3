use anyhow::Result;
use shelfguard_core::constants::REASON_NAME_CONFLICT_RENAMED;
use shelfguard_core::{
    Config, ContentHash, DiscardOutcome, FailureKind, ManifestAction, ManifestEntry,
    PromoteOutcome, QuarantineError, StatusUpdate, UploadRecord, UploadStatus,
};
use shelfguard_db::UploadRepository;
use shelfguard_infra::ClaimRegistry;
use shelfguard_storage::{
    guard_path, hidden_temp_name, numbered_destination, FileStore, StorageError, StorageResult,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::manifest::AuditManifest;

pub const REASON_INTEGRITY_MISMATCH: &str = "integrity mismatch";

/// Names claimed by someone else between the free-name check and the link.
const MAX_LINK_ATTEMPTS: u32 = 100;

/// How the bytes reached the destination directory.
enum Staged {
    /// Hard link at the final path; the quarantine copy is untouched.
    Linked(PathBuf),
    /// Hidden temporary copy that still has to be published.
    Copied(PathBuf),
}

impl Staged {
    fn path(&self) -> &Path {
        match self {
            Staged::Linked(p) | Staged::Copied(p) => p,
        }
    }
}

/// Moves verified uploads out of quarantine, or discards duplicates.
///
/// The quarantine copy stays in place until the destination has been
/// verified and the record reads `moved`; any failure before that point
/// removes what was written at the destination.
#[derive(Clone)]
pub struct Promoter {
    config: Arc<Config>,
    repository: Arc<dyn UploadRepository>,
    files: Arc<dyn FileStore>,
    manifest: Arc<AuditManifest>,
    claims: ClaimRegistry,
}

impl Promoter {
    pub fn new(
        config: Arc<Config>,
        repository: Arc<dyn UploadRepository>,
        files: Arc<dyn FileStore>,
        manifest: Arc<AuditManifest>,
        claims: ClaimRegistry,
    ) -> Self {
        Self {
            config,
            repository,
            files,
            manifest,
            claims,
        }
    }

    /// Promote `upload_id` to `destination`. An existing file at
    /// `destination` is never replaced; a `_N` suffix is added instead.
    #[tracing::instrument(skip(self), fields(promote.operation = "promote"))]
    pub async fn promote(
        &self,
        upload_id: Uuid,
        destination: &Path,
        renamed: bool,
    ) -> Result<PromoteOutcome> {
        let Some(_claim) = self.claims.try_claim(upload_id) else {
            return Ok(PromoteOutcome::failed(
                FailureKind::RecordClaimConflict,
                "record is being processed by another operation",
            ));
        };

        let Some(record) = self.repository.get(upload_id).await? else {
            return Ok(PromoteOutcome::failed(FailureKind::NotFound, "upload not found"));
        };
        if !record.status.is_promotable() {
            return Ok(PromoteOutcome::failed(
                FailureKind::InvalidState,
                format!("cannot promote from status {}", record.status),
            ));
        }
        let source = match &record.quarantine_path {
            Some(path) if self.files.exists(path).await => path.clone(),
            _ => {
                return Ok(PromoteOutcome::failed(
                    FailureKind::SourceMissing,
                    "quarantine file is missing",
                ))
            }
        };

        let expected = match &record.content_hash {
            Some(hash) => hash.clone(),
            None => match self.files.hash(&source).await {
                Ok(hash) => {
                    if !self.config.moving.dry_run {
                        self.repository.set_content_hash(record.id, &hash).await?;
                    }
                    hash
                }
                Err(e) => {
                    let reason = format!("hashing quarantine file: {}", e);
                    return self.fail_io(&record, reason).await;
                }
            },
        };

        let dest_dir = destination
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.paths.destination_dir());
        let file_name = destination
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| crate::rename::safe_file_name(&record));
        let (_, planned) = self.free_destination(&dest_dir, &file_name, 0).await;
        let action = if renamed {
            ManifestAction::Renamed
        } else {
            ManifestAction::Moved
        };

        if self.config.moving.dry_run {
            tracing::info!(
                source = %source.display(),
                destination = %planned.display(),
                action = %action,
                "Dry run: would promote"
            );
            return Ok(PromoteOutcome::DryRun {
                source,
                destination: planned,
                action,
            });
        }

        if let Err(e) = self.files.ensure_dir(&dest_dir).await {
            let reason = format!("creating {}: {}", dest_dir.display(), e);
            return self.fail_io(&record, reason).await;
        }

        let staged = match self.stage(&source, &dest_dir, &file_name, &planned).await {
            Ok(staged) => staged,
            Err(e) => return self.fail_io(&record, format!("staging copy: {}", e)).await,
        };

        if self.config.moving.verify_integrity_post_move {
            match self.files.hash(staged.path()).await {
                Ok(actual) if actual == expected => {}
                Ok(actual) => {
                    return self.rollback_mismatch(&record, &staged, &expected, &actual).await
                }
                Err(e) => {
                    self.remove_quietly(staged.path()).await;
                    let reason = format!("verifying destination: {}", e);
                    return self.fail_io(&record, reason).await;
                }
            }
        }

        let final_path = match staged {
            Staged::Linked(path) => path,
            Staged::Copied(temp) => match self.publish(&temp, &dest_dir, &file_name).await {
                Ok(path) => path,
                Err(e) => {
                    self.remove_quietly(&temp).await;
                    let reason = format!("publishing {}: {}", planned.display(), e);
                    return self.fail_io(&record, reason).await;
                }
            },
        };

        if let Err(e) = self
            .files
            .set_permissions(&final_path, self.config.moving.file_permissions_mode)
            .await
        {
            tracing::warn!(
                error = %e,
                path = %final_path.display(),
                "Failed to set file permissions"
            );
        }

        let mut update = StatusUpdate::new()
            .final_path(final_path.clone())
            .content_hash(expected.clone())
            .clear_quarantine_path();
        if renamed {
            update = update.duplicate(None, REASON_NAME_CONFLICT_RENAMED);
        }

        let swapped = match self
            .repository
            .update_status(record.id, record.status, UploadStatus::Moved, update)
            .await
        {
            Ok(swapped) => swapped,
            Err(e) => {
                self.remove_quietly(&final_path).await;
                return Err(e);
            }
        };
        if !swapped {
            self.remove_quietly(&final_path).await;
            tracing::warn!(
                upload_id = %record.id,
                "Record changed while promoting, destination removed"
            );
            return Ok(PromoteOutcome::failed(
                FailureKind::RecordClaimConflict,
                "record status changed during promotion",
            ));
        }

        if let Err(e) = self.files.remove(&source).await {
            tracing::error!(
                alert = true,
                error = %e,
                upload_id = %record.id,
                path = %source.display(),
                "Promoted but failed to remove quarantine copy"
            );
        }

        let mut promoted = record.clone();
        promoted.content_hash = Some(expected);
        let entry = ManifestEntry::for_record(
            &promoted,
            action,
            Some(final_path.clone()),
            renamed.then(|| REASON_NAME_CONFLICT_RENAMED.to_string()),
        );
        self.append_manifest(&entry, record.id).await;

        tracing::info!(
            upload_id = %record.id,
            final_path = %final_path.display(),
            action = %action,
            "Upload promoted"
        );
        Ok(PromoteOutcome::Moved {
            final_path,
            renamed,
        })
    }

    /// First unoccupied of `name`, `stem_N.ext`, … counting from `start`.
    async fn free_destination(&self, dir: &Path, file_name: &str, start: u32) -> (u32, PathBuf) {
        let mut n = start;
        loop {
            let candidate = numbered_destination(dir, file_name, n);
            if !self.files.exists(&candidate).await {
                return (n, candidate);
            }
            n += 1;
        }
    }

    /// Hard-link `src` under the first free numbered name, stepping past
    /// names that turn out to be taken. `Ok(None)` when links are refused.
    async fn link_unique(
        &self,
        src: &Path,
        dir: &Path,
        file_name: &str,
    ) -> StorageResult<Option<PathBuf>> {
        let mut start = 0;
        for _ in 0..MAX_LINK_ATTEMPTS {
            let (n, candidate) = self.free_destination(dir, file_name, start).await;
            match self.files.link(src, &candidate).await {
                Ok(()) => return Ok(Some(candidate)),
                Err(StorageError::AlreadyExists(_)) => start = n + 1,
                Err(e) => {
                    tracing::debug!(error = %e, "Hard link unavailable");
                    return Ok(None);
                }
            }
        }
        Err(StorageError::AlreadyExists(dir.join(file_name).display().to_string()))
    }

    /// Put the bytes next to their final name. Same filesystem with atomic
    /// operations enabled publishes a hard link directly; everything else
    /// goes through a hidden temporary copy.
    async fn stage(
        &self,
        source: &Path,
        dest_dir: &Path,
        file_name: &str,
        planned: &Path,
    ) -> StorageResult<Staged> {
        let same_fs = self.config.moving.atomic_operations
            && self
                .files
                .same_filesystem(source, dest_dir)
                .await
                .unwrap_or(false);

        if same_fs {
            if let Some(path) = self.link_unique(source, dest_dir, file_name).await? {
                return Ok(Staged::Linked(path));
            }
        }

        let temp = hidden_temp_name(planned);
        match self.files.copy_to(source, &temp).await {
            Ok(_) => Ok(Staged::Copied(temp)),
            Err(e) => {
                self.remove_quietly(&temp).await;
                Err(e)
            }
        }
    }

    /// Give a verified temporary copy its final name. Linking never
    /// overwrites; rename is the fallback where links are refused.
    async fn publish(&self, temp: &Path, dir: &Path, file_name: &str) -> StorageResult<PathBuf> {
        if let Some(path) = self.link_unique(temp, dir, file_name).await? {
            self.remove_quietly(temp).await;
            return Ok(path);
        }
        let (_, path) = self.free_destination(dir, file_name, 0).await;
        self.files.rename(temp, &path).await?;
        Ok(path)
    }

    async fn rollback_mismatch(
        &self,
        record: &UploadRecord,
        staged: &Staged,
        expected: &ContentHash,
        actual: &ContentHash,
    ) -> Result<PromoteOutcome> {
        self.remove_quietly(staged.path()).await;
        QuarantineError::IntegrityMismatch {
            upload_id: record.id.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
        .log();
        self.mark_failed(record, REASON_INTEGRITY_MISMATCH).await?;
        Ok(PromoteOutcome::failed(
            FailureKind::IntegrityMismatch,
            REASON_INTEGRITY_MISMATCH,
        ))
    }

    async fn fail_io(&self, record: &UploadRecord, reason: String) -> Result<PromoteOutcome> {
        QuarantineError::IoFailure(reason.clone()).log();
        self.mark_failed(record, &reason).await?;
        Ok(PromoteOutcome::failed(FailureKind::IoFailure, reason))
    }

    /// `move_failed` keeps `quarantine_path` so the retained copy can be found.
    async fn mark_failed(&self, record: &UploadRecord, reason: &str) -> Result<()> {
        let swapped = self
            .repository
            .update_status(
                record.id,
                record.status,
                UploadStatus::MoveFailed,
                StatusUpdate::new().error_message(reason),
            )
            .await?;
        if !swapped {
            tracing::warn!(
                upload_id = %record.id,
                "Record changed before it could be marked move_failed"
            );
        }
        Ok(())
    }

    async fn remove_quietly(&self, path: &Path) {
        if let Err(e) = self.files.remove(path).await {
            tracing::error!(
                alert = true,
                error = %e,
                path = %path.display(),
                "Failed to remove partial destination file"
            );
        }
    }

    async fn append_manifest(&self, entry: &ManifestEntry, upload_id: Uuid) {
        if let Err(e) = self.manifest.append(entry).await {
            tracing::error!(
                alert = true,
                error = %e,
                upload_id = %upload_id,
                "Failed to write manifest entry"
            );
        }
    }

    /// Delete a duplicate's quarantine file and retire its record.
    #[tracing::instrument(skip(self, reason), fields(promote.operation = "discard"))]
    pub async fn discard(
        &self,
        upload_id: Uuid,
        duplicate_of: Option<Uuid>,
        reason: &str,
    ) -> Result<DiscardOutcome> {
        let Some(_claim) = self.claims.try_claim(upload_id) else {
            return Ok(DiscardOutcome::failed(
                FailureKind::RecordClaimConflict,
                "record is being processed by another operation",
            ));
        };

        let Some(record) = self.repository.get(upload_id).await? else {
            return Ok(DiscardOutcome::failed(FailureKind::NotFound, "upload not found"));
        };
        if !record.status.is_promotable() {
            return Ok(DiscardOutcome::failed(
                FailureKind::InvalidState,
                format!("cannot discard from status {}", record.status),
            ));
        }

        if self.config.moving.dry_run {
            let source = record.quarantine_path.clone().unwrap_or_default();
            tracing::info!(source = %source.display(), reason, "Dry run: would discard");
            return Ok(DiscardOutcome::DryRun {
                source,
                reason: reason.to_string(),
            });
        }

        let bytes_freed = match &record.quarantine_path {
            Some(path) => {
                let path = match guard_path(&self.config.paths.quarantine_dir, path) {
                    Ok(path) => path,
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            upload_id = %record.id,
                            "Refusing to delete file outside quarantine"
                        );
                        return Ok(DiscardOutcome::failed(
                            FailureKind::InvalidState,
                            e.to_string(),
                        ));
                    }
                };
                match self.files.remove(&path).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::error!(
                            alert = true,
                            error = %e,
                            upload_id = %record.id,
                            "Failed to delete duplicate"
                        );
                        return Ok(DiscardOutcome::failed(FailureKind::IoFailure, e.to_string()));
                    }
                }
            }
            None => 0,
        };

        let swapped = self
            .repository
            .update_status(
                record.id,
                record.status,
                UploadStatus::DuplicateDiscarded,
                StatusUpdate::new()
                    .clear_quarantine_path()
                    .duplicate(duplicate_of, reason),
            )
            .await?;
        if !swapped {
            tracing::warn!(upload_id = %record.id, "Record changed while discarding");
            return Ok(DiscardOutcome::failed(
                FailureKind::RecordClaimConflict,
                "record status changed during discard",
            ));
        }

        let entry = ManifestEntry::for_record(
            &record,
            ManifestAction::Discarded,
            None,
            Some(reason.to_string()),
        );
        self.append_manifest(&entry, record.id).await;

        tracing::info!(upload_id = %record.id, reason, ?duplicate_of, "Duplicate discarded");
        Ok(DiscardOutcome::Discarded { bytes_freed })
    }
}
