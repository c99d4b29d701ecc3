use anyhow::Result;
use chrono::Utc;
use shelfguard_core::{
    Admission, Config, DiskStatus, DiskUsage, ProtectionSettings, QuarantineError,
    QuarantineUsage, RejectionKind, SweepReport, SAFE_TO_DELETE,
};
use shelfguard_db::UploadRepository;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::probe::DiskProbe;
use crate::cleanup::{EmergencyReclaimer, RetentionSweeper, SweepOptions};

/// Decides whether a file of a given size may enter quarantine.
///
/// Checks run in this order and all must pass: free disk space after the
/// write, the per-file cap, then the quarantine cap. Only the last may
/// trigger a synchronous age-based sweep. Every call also checks for
/// emergency pressure and reclaims inline when free space is critical.
#[derive(Clone)]
pub struct CapacityGate {
    config: Arc<Config>,
    repository: Arc<dyn UploadRepository>,
    probe: Arc<dyn DiskProbe>,
    sweeper: RetentionSweeper,
    reclaimer: EmergencyReclaimer,
    cancel: CancellationToken,
}

impl CapacityGate {
    pub fn new(
        config: Arc<Config>,
        repository: Arc<dyn UploadRepository>,
        probe: Arc<dyn DiskProbe>,
        sweeper: RetentionSweeper,
        reclaimer: EmergencyReclaimer,
    ) -> Self {
        Self {
            config,
            repository,
            probe,
            sweeper,
            reclaimer,
            cancel: CancellationToken::new(),
        }
    }

    /// Interrupt inline sweeps and reclaims once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    async fn disk_usage(&self) -> Result<DiskUsage> {
        self.probe.usage(&self.config.paths.quarantine_dir).await
    }

    /// Refusals are logged at their own level; a failing probe or record
    /// store is logged and returned as an error.
    #[tracing::instrument(skip(self), fields(capacity.operation = "admit"))]
    pub async fn admit(&self, candidate_size_bytes: u64) -> Result<Admission> {
        match self.evaluate(candidate_size_bytes).await {
            Ok(admission) => {
                if let Err(refusal) = admission.clone().into_result() {
                    refusal.log();
                }
                Ok(admission)
            }
            Err(e) => {
                let err = QuarantineError::from(e);
                err.log();
                Err(err.into())
            }
        }
    }

    async fn evaluate(&self, candidate_size_bytes: u64) -> Result<Admission> {
        let disk = &self.config.disk;
        if !disk.enabled {
            return Ok(Admission::Admitted { reclaimed_bytes: 0 });
        }

        let mut reclaimed = SweepReport::default();
        let mut usage = self.disk_usage().await?;

        if usage.free_percent() < disk.emergency_cleanup_threshold_percent {
            let target = usage
                .deficit_to_percent(disk.alert_threshold_percent)
                .saturating_add(candidate_size_bytes);
            tracing::error!(
                alert = true,
                free_percent = usage.free_percent(),
                threshold_percent = disk.emergency_cleanup_threshold_percent,
                target_bytes = target,
                "Free space below emergency threshold"
            );
            let report = self.reclaimer.reclaim_to(target, &self.cancel).await?;
            reclaimed.merge(&report);
            usage = self.disk_usage().await?;
        }

        if let Some(rejection) = self.check_disk_space(usage, candidate_size_bytes) {
            return Ok(rejection);
        }

        if let Some(rejection) = self.check_single_file(candidate_size_bytes) {
            return Ok(rejection);
        }

        let limit = disk.max_quarantine_size_bytes;
        if limit > 0 {
            let mut current = self.repository.total_size_by_status(&SAFE_TO_DELETE).await?;

            if current.saturating_add(candidate_size_bytes) > limit
                && disk.auto_cleanup_enabled
                && disk.auto_cleanup_age_hours > 0
            {
                tracing::info!(
                    current_bytes = current,
                    candidate_size_bytes,
                    limit_bytes = limit,
                    "Quarantine cap reached, attempting cleanup"
                );
                let report = self
                    .sweeper
                    .sweep(
                        SweepOptions::default().with_target(candidate_size_bytes),
                        &self.cancel,
                    )
                    .await?;
                reclaimed.merge(&report);
                current = self.repository.total_size_by_status(&SAFE_TO_DELETE).await?;
            }

            if current.saturating_add(candidate_size_bytes) > limit {
                let reason = format!(
                    "Quarantine capacity exceeded: {} bytes in quarantine + {} bytes \
                     requested exceeds limit of {} bytes",
                    current, candidate_size_bytes, limit
                );
                return Ok(Admission::Rejected {
                    kind: RejectionKind::QuarantineCapacityExceeded {
                        current,
                        requested: candidate_size_bytes,
                        limit,
                    },
                    reason,
                });
            }
        }

        if reclaimed.interrupted {
            tracing::warn!(bytes_freed = reclaimed.bytes_freed, "Inline cleanup was interrupted");
        }
        Ok(Admission::Admitted {
            reclaimed_bytes: reclaimed.bytes_freed,
        })
    }

    /// Free-space check. The percentage comparison uses integer basis points
    /// so a result landing exactly on the minimum is refused.
    fn check_disk_space(&self, usage: DiskUsage, candidate_size_bytes: u64) -> Option<Admission> {
        let disk = &self.config.disk;
        let free_after = usage.free_bytes.saturating_sub(candidate_size_bytes);
        let min_basis_points = (disk.min_free_space_percent * 100.0).round().max(0.0) as u128;
        let reject = |reason: String| {
            tracing::debug!(
                free_bytes = usage.free_bytes,
                total_bytes = usage.total_bytes,
                candidate_size_bytes,
                "Free space check failed"
            );
            Some(Admission::Rejected {
                kind: RejectionKind::InsufficientSpace {
                    free_after,
                    total: usage.total_bytes,
                },
                reason,
            })
        };

        if candidate_size_bytes > usage.free_bytes {
            return reject(format!(
                "Insufficient disk space: {} bytes requested, {} bytes free",
                candidate_size_bytes, usage.free_bytes
            ));
        }

        if (free_after as u128) * 10_000 <= min_basis_points * (usage.total_bytes as u128) {
            let percent_after = if usage.total_bytes == 0 {
                0.0
            } else {
                free_after as f64 / usage.total_bytes as f64 * 100.0
            };
            return reject(format!(
                "Insufficient disk space: {:.2}% free after upload, more than {:.2}% required",
                percent_after, disk.min_free_space_percent
            ));
        }

        if free_after < disk.reserve_space_bytes {
            return reject(format!(
                "Insufficient disk space: {} bytes free after upload, reserve of {} bytes required",
                free_after, disk.reserve_space_bytes
            ));
        }

        None
    }

    fn check_single_file(&self, candidate_size_bytes: u64) -> Option<Admission> {
        let limit = self.config.disk.max_single_upload_bytes();
        if candidate_size_bytes <= limit {
            return None;
        }
        let reason = format!(
            "File too large: {} bytes exceeds limit of {} bytes",
            candidate_size_bytes, limit
        );
        Some(Admission::Rejected {
            kind: RejectionKind::SingleFileTooLarge {
                size: candidate_size_bytes,
                limit,
            },
            reason,
        })
    }

    /// Snapshot of disk and quarantine state for operators.
    #[tracing::instrument(skip(self))]
    pub async fn disk_status(&self) -> Result<DiskStatus> {
        let disk = &self.config.disk;
        let usage = self.disk_usage().await?;
        let quarantine_total = self.repository.total_size_by_status(&SAFE_TO_DELETE).await?;
        let counts_by_status = self.repository.count_by_status().await?;
        let free_percent = usage.free_percent();

        let mut warnings = Vec::new();
        if free_percent < disk.emergency_cleanup_threshold_percent {
            warnings.push(format!(
                "CRITICAL: free space {:.2}% is below emergency threshold {:.2}%",
                free_percent, disk.emergency_cleanup_threshold_percent
            ));
        } else if free_percent < disk.alert_threshold_percent {
            warnings.push(format!(
                "WARNING: free space {:.2}% is below alert threshold {:.2}%",
                free_percent, disk.alert_threshold_percent
            ));
        }

        let percent_used = if disk.max_quarantine_size_bytes == 0 {
            0.0
        } else {
            quarantine_total as f64 / disk.max_quarantine_size_bytes as f64 * 100.0
        };
        if percent_used >= 90.0 {
            warnings.push(format!("WARNING: quarantine is {:.1}% full", percent_used));
        }

        Ok(DiskStatus {
            generated_at: Utc::now(),
            disk: usage,
            free_percent,
            quarantine: QuarantineUsage {
                total_bytes: quarantine_total,
                max_bytes: disk.max_quarantine_size_bytes,
                percent_used,
            },
            counts_by_status,
            protection: ProtectionSettings {
                enabled: disk.enabled,
                min_free_space_percent: disk.min_free_space_percent,
                reserve_space_bytes: disk.reserve_space_bytes,
                max_single_upload_bytes: disk.max_single_upload_bytes(),
                auto_cleanup_enabled: disk.auto_cleanup_enabled,
                auto_cleanup_age_hours: disk.auto_cleanup_age_hours,
                emergency_cleanup_threshold_percent: disk.emergency_cleanup_threshold_percent,
                alert_threshold_percent: disk.alert_threshold_percent,
            },
            warnings,
        })
    }
}
