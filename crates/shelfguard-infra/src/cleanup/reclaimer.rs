use anyhow::Result;
use shelfguard_core::{SweepReport, SAFE_TO_DELETE};
use tokio_util::sync::CancellationToken;

use super::evict::{EvictionKind, EvictionResult, Evictor};

/// Age-agnostic cleanup used when free space falls below the emergency
/// threshold. Files in `safe`, `metadata_verified` or `moved` are never
/// candidates.
#[derive(Clone)]
pub struct EmergencyReclaimer {
    evictor: Evictor,
}

impl EmergencyReclaimer {
    pub fn new(evictor: Evictor) -> Self {
        Self { evictor }
    }

    /// Delete deletable quarantine files, oldest first, until `target_bytes`
    /// have been freed or no candidates remain.
    #[tracing::instrument(skip(self, cancel), fields(cleanup.operation = "emergency"))]
    pub async fn reclaim_to(
        &self,
        target_bytes: u64,
        cancel: &CancellationToken,
    ) -> Result<SweepReport> {
        let candidates = self.evictor.repository().list_by_status(&SAFE_TO_DELETE).await?;

        tracing::error!(
            alert = true,
            target_bytes,
            candidates = candidates.len(),
            "Emergency disk cleanup started"
        );

        let mut report = SweepReport::default();
        for record in &candidates {
            if report.bytes_freed >= target_bytes {
                break;
            }
            if cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }

            report.records_processed += 1;
            match self.evictor.evict(record, EvictionKind::Emergency).await {
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

        if report.bytes_freed < target_bytes {
            tracing::error!(
                alert = true,
                bytes_freed = report.bytes_freed,
                target_bytes,
                "Emergency disk cleanup could not reach its target"
            );
        } else {
            tracing::warn!(
                bytes_freed = report.bytes_freed,
                files_deleted = report.files_deleted,
                "Emergency disk cleanup completed"
            );
        }
        Ok(report)
    }
}
