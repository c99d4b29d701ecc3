use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use shelfguard_core::{Config, SweepReport, SAFE_TO_DELETE};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::evict::{EvictionKind, EvictionResult, Evictor};

/// Larger ages are clamped; chrono durations are bounded.
const MAX_AGE_HOURS: u64 = 1_000_000;

/// Parameters of one retention pass.
#[derive(Debug, Clone, Default)]
pub struct SweepOptions {
    /// Age threshold; `None` uses `auto_cleanup_age_hours`. 0 disables.
    pub max_age_hours: Option<u64>,
    /// Stop once this many bytes have been freed.
    pub target_bytes: Option<u64>,
    /// Wall-clock budget, checked between records.
    pub deadline: Option<Instant>,
}

impl SweepOptions {
    pub fn with_target(mut self, bytes: u64) -> Self {
        self.target_bytes = Some(bytes);
        self
    }

    pub fn with_max_age_hours(mut self, hours: u64) -> Self {
        self.max_age_hours = Some(hours);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Deletes aged quarantine files in deletable states, oldest first.
#[derive(Clone)]
pub struct RetentionSweeper {
    config: Arc<Config>,
    evictor: Evictor,
}

impl RetentionSweeper {
    pub fn new(config: Arc<Config>, evictor: Evictor) -> Self {
        Self { config, evictor }
    }

    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.config.disk.cleanup_interval_minutes.max(1) * 60)
    }

    #[tracing::instrument(skip(self, cancel), fields(cleanup.operation = "retention"))]
    pub async fn sweep(
        &self,
        options: SweepOptions,
        cancel: &CancellationToken,
    ) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let max_age_hours = options
            .max_age_hours
            .unwrap_or(self.config.disk.auto_cleanup_age_hours);
        if max_age_hours == 0 {
            tracing::debug!("Age-based cleanup disabled");
            return Ok(report);
        }

        let hours = max_age_hours.min(MAX_AGE_HOURS) as i64;
        let cutoff = Utc::now() - ChronoDuration::hours(hours);
        let candidates = self
            .evictor
            .repository()
            .list_by_status_older_than(&SAFE_TO_DELETE, cutoff)
            .await?;

        tracing::info!(
            candidates = candidates.len(),
            max_age_hours,
            target_bytes = ?options.target_bytes,
            "Starting retention sweep"
        );

        let kind = EvictionKind::Retention { max_age_hours };
        for record in &candidates {
            if options.target_bytes.is_some_and(|target| report.bytes_freed >= target) {
                break;
            }
            if cancel.is_cancelled() || options.deadline.is_some_and(|d| Instant::now() >= d) {
                report.interrupted = true;
                break;
            }

            report.records_processed += 1;
            match self.evictor.evict(record, kind).await {
                Ok(EvictionResult::Deleted { bytes_freed }) => {
                    report.bytes_freed += bytes_freed;
                    report.files_deleted += 1;
                }
                Ok(EvictionResult::Claimed) => report.skipped_claimed += 1,
                Ok(EvictionResult::Skipped(_)) => {}
                Err(e) => {
                    tracing::error!(error = %e, upload_id = %record.id, "Failed to evict record");
                }
            }
        }

        tracing::info!(
            bytes_freed = report.bytes_freed,
            files_deleted = report.files_deleted,
            skipped_claimed = report.skipped_claimed,
            interrupted = report.interrupted,
            "Retention sweep completed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanup::test_support::Fixture;
    use shelfguard_core::UploadStatus;
    use shelfguard_db::UploadRepository;

    #[tokio::test]
    async fn deletes_only_aged_deletable_records() {
        let fx = Fixture::new();
        let old = fx.upload("old.epub", 100, 80, UploadStatus::Quarantined).await;
        let fresh = fx.upload("fresh.epub", 100, 1, UploadStatus::Quarantined).await;
        let reviewed = fx.upload("safe.epub", 100, 200, UploadStatus::Safe).await;
        let verified = fx.upload("verified.epub", 100, 200, UploadStatus::MetadataVerified).await;

        let report = fx
            .sweeper()
            .sweep(SweepOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.bytes_freed, 100);
        assert_eq!(report.files_deleted, 1);
        assert_eq!(fx.status(old.id).await, UploadStatus::AutoDeleted);
        assert_eq!(fx.status(fresh.id).await, UploadStatus::Quarantined);
        assert_eq!(fx.status(reviewed.id).await, UploadStatus::Safe);
        assert_eq!(fx.status(verified.id).await, UploadStatus::MetadataVerified);
        assert!(!fx.file_exists(&old).await);
        assert!(fx.file_exists(&reviewed).await);

        let stored = fx.repo.get(old.id).await.unwrap().unwrap();
        assert!(stored.quarantine_path.is_none());
        assert_eq!(stored.error_message.as_deref(), Some("Auto-deleted after 72 hours"));
    }

    #[tokio::test]
    async fn second_sweep_frees_nothing() {
        let fx = Fixture::new();
        fx.upload("a.pdf", 10, 100, UploadStatus::ScanFailed).await;
        fx.upload("b.pdf", 20, 100, UploadStatus::Infected).await;

        let sweeper = fx.sweeper();
        let cancel = CancellationToken::new();
        let first = sweeper.sweep(SweepOptions::default(), &cancel).await.unwrap();
        let second = sweeper.sweep(SweepOptions::default(), &cancel).await.unwrap();

        assert_eq!(first.bytes_freed, 30);
        assert_eq!(second.bytes_freed, 0);
        assert_eq!(second.files_deleted, 0);
    }

    #[tokio::test]
    async fn stops_once_target_is_met() {
        let fx = Fixture::new();
        let a = fx.upload("a", 50, 300, UploadStatus::Quarantined).await;
        let b = fx.upload("b", 50, 200, UploadStatus::Quarantined).await;
        let c = fx.upload("c", 50, 100, UploadStatus::Quarantined).await;

        let report = fx
            .sweeper()
            .sweep(SweepOptions::default().with_target(60), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.bytes_freed, 100);
        assert_eq!(fx.status(a.id).await, UploadStatus::AutoDeleted);
        assert_eq!(fx.status(b.id).await, UploadStatus::AutoDeleted);
        assert_eq!(fx.status(c.id).await, UploadStatus::Quarantined);
    }

    #[tokio::test]
    async fn zero_age_disables_sweeping() {
        let fx = Fixture::new();
        let a = fx.upload("a", 50, 1000, UploadStatus::Quarantined).await;

        let report = fx
            .sweeper()
            .sweep(SweepOptions::default().with_max_age_hours(0), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report, SweepReport::default());
        assert_eq!(fx.status(a.id).await, UploadStatus::Quarantined);
    }

    #[tokio::test]
    async fn missing_file_still_retires_record() {
        let fx = Fixture::new();
        let a = fx.upload("a", 50, 100, UploadStatus::Quarantined).await;
        std::fs::remove_file(a.quarantine_path.as_ref().unwrap()).unwrap();

        let report = fx
            .sweeper()
            .sweep(SweepOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.bytes_freed, 0);
        assert_eq!(report.files_deleted, 1);
        assert_eq!(fx.status(a.id).await, UploadStatus::AutoDeleted);
    }

    #[tokio::test]
    async fn claimed_records_are_left_alone() {
        let fx = Fixture::new();
        let a = fx.upload("a", 50, 100, UploadStatus::Quarantined).await;
        let _claim = fx.claims.try_claim(a.id).unwrap();

        let report = fx
            .sweeper()
            .sweep(SweepOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.skipped_claimed, 1);
        assert_eq!(fx.status(a.id).await, UploadStatus::Quarantined);
        assert!(fx.file_exists(&a).await);
    }

    #[tokio::test]
    async fn cancellation_stops_between_records() {
        let fx = Fixture::new();
        let a = fx.upload("a", 50, 100, UploadStatus::Quarantined).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = fx.sweeper().sweep(SweepOptions::default(), &cancel).await.unwrap();

        assert!(report.interrupted);
        assert_eq!(report.records_processed, 0);
        assert_eq!(fx.status(a.id).await, UploadStatus::Quarantined);
    }

    #[tokio::test]
    async fn expired_deadline_stops_before_first_record() {
        let fx = Fixture::new();
        let a = fx.upload("a", 50, 100, UploadStatus::Quarantined).await;
        let deadline = Instant::now();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let report = fx
            .sweeper()
            .sweep(SweepOptions::default().with_deadline(deadline), &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.interrupted);
        assert_eq!(report.files_deleted, 0);
        assert_eq!(fx.status(a.id).await, UploadStatus::Quarantined);
        assert!(fx.file_exists(&a).await);
    }

    #[tokio::test]
    async fn paths_outside_quarantine_are_never_deleted() {
        let fx = Fixture::new();
        let outside = tempfile::tempdir().unwrap();
        let foreign = outside.path().join("precious.epub");
        std::fs::write(&foreign, b"keep me").unwrap();
        let record = fx
            .upload_at("precious.epub", 7, 100, UploadStatus::Quarantined, &foreign)
            .await;

        let report = fx
            .sweeper()
            .sweep(SweepOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.files_deleted, 0);
        assert!(foreign.exists());
        assert_eq!(fx.status(record.id).await, UploadStatus::Quarantined);
    }
}
