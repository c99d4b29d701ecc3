use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use shelfguard_core::constants::REASON_NAME_CONFLICT_RENAME_DISABLED;
use shelfguard_core::{
    Admission, Config, Decision, DiscardOutcome, DiskStatus, FailureKind, PromoteOutcome,
    SweepReport, UploadRecord,
};
use shelfguard_db::UploadRepository;
use shelfguard_infra::cleanup::Evictor;
use shelfguard_infra::{
    CapacityGate, ClaimRegistry, DiskProbe, EmergencyReclaimer, RetentionSweeper, SweepOptions,
    SweepScheduler,
};
use shelfguard_storage::FileStore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::manifest::AuditManifest;
use crate::promoter::Promoter;
use crate::rename::{render_rename, safe_file_name};
use crate::resolver::DuplicateResolver;

/// What `promote_verified` did after resolving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "result", rename_all = "snake_case")]
pub enum LifecycleAction {
    Promoted(PromoteOutcome),
    Discarded(DiscardOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessOutcome {
    pub decision: Decision,
    pub action: LifecycleAction,
}

/// Entry point for the calling layer. Built once from a [`Config`]; every
/// component shares the same record store, file store and claim registry.
pub struct QuarantineLifecycle {
    config: Arc<Config>,
    repository: Arc<dyn UploadRepository>,
    files: Arc<dyn FileStore>,
    gate: CapacityGate,
    sweeper: RetentionSweeper,
    reclaimer: EmergencyReclaimer,
    resolver: DuplicateResolver,
    promoter: Promoter,
    manifest: Arc<AuditManifest>,
    scheduler: Arc<SweepScheduler>,
    cancel: CancellationToken,
}

impl QuarantineLifecycle {
    pub fn new(
        config: Config,
        repository: Arc<dyn UploadRepository>,
        files: Arc<dyn FileStore>,
        probe: Arc<dyn DiskProbe>,
    ) -> Self {
        let config = Arc::new(config);
        let claims = ClaimRegistry::new();

        let cancel = CancellationToken::new();

        let evictor = Evictor::new(
            config.clone(),
            repository.clone(),
            files.clone(),
            claims.clone(),
        );
        let sweeper = RetentionSweeper::new(config.clone(), evictor.clone());
        let reclaimer = EmergencyReclaimer::new(evictor);
        let gate = CapacityGate::new(
            config.clone(),
            repository.clone(),
            probe,
            sweeper.clone(),
            reclaimer.clone(),
        )
        .with_cancel(cancel.child_token());
        let manifest = Arc::new(AuditManifest::from_config(&config.moving));
        let resolver = DuplicateResolver::new(config.clone(), repository.clone(), files.clone());
        let promoter = Promoter::new(
            config.clone(),
            repository.clone(),
            files.clone(),
            manifest.clone(),
            claims,
        );
        let scheduler = Arc::new(SweepScheduler::new(sweeper.clone()));

        Self {
            config,
            repository,
            files,
            gate,
            sweeper,
            reclaimer,
            resolver,
            promoter,
            manifest,
            scheduler,
            cancel,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn UploadRepository> {
        &self.repository
    }

    pub fn manifest(&self) -> &AuditManifest {
        &self.manifest
    }

    /// Create the quarantine, unsorted and promotion directories.
    pub async fn ensure_directories(&self) -> Result<()> {
        let paths = &self.config.paths;
        for dir in [
            &paths.quarantine_dir,
            &paths.unsorted_dir,
            &paths.destination_dir(),
        ] {
            self.files
                .ensure_dir(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    pub async fn admit(&self, candidate_size_bytes: u64) -> Result<Admission> {
        self.gate.admit(candidate_size_bytes).await
    }

    async fn load(&self, upload_id: Uuid) -> Result<Option<UploadRecord>> {
        self.repository.get(upload_id).await
    }

    /// Classify an upload without acting on it. `None` when the id is unknown.
    pub async fn resolve(&self, upload_id: Uuid) -> Result<Option<Decision>> {
        match self.load(upload_id).await? {
            Some(record) => Ok(Some(self.resolver.resolve(&record).await?)),
            None => Ok(None),
        }
    }

    /// Resolve a verified upload and carry out the resulting decision.
    #[tracing::instrument(skip(self))]
    pub async fn promote_verified(&self, upload_id: Uuid) -> Result<ProcessOutcome> {
        let Some(record) = self.load(upload_id).await? else {
            return Ok(ProcessOutcome {
                decision: Decision::Unique,
                action: LifecycleAction::Promoted(PromoteOutcome::failed(
                    FailureKind::NotFound,
                    "upload not found",
                )),
            });
        };
        if !record.status.is_promotable() {
            return Ok(ProcessOutcome {
                decision: Decision::Unique,
                action: LifecycleAction::Promoted(PromoteOutcome::failed(
                    FailureKind::InvalidState,
                    format!("cannot promote from status {}", record.status),
                )),
            });
        }

        let source_present = match &record.quarantine_path {
            Some(path) => self.files.exists(path).await,
            None => false,
        };
        if !source_present {
            return Ok(ProcessOutcome {
                decision: Decision::Unique,
                action: LifecycleAction::Promoted(PromoteOutcome::failed(
                    FailureKind::SourceMissing,
                    "quarantine file is missing",
                )),
            });
        }

        let decision = self.resolver.resolve(&record).await?;
        let destination_dir = self.config.paths.destination_dir();

        let action = match &decision {
            Decision::ExactDuplicate { of_id, .. } => {
                let reason = decision.reason_code().unwrap_or_default();
                LifecycleAction::Discarded(self.promoter.discard(record.id, *of_id, reason).await?)
            }
            Decision::NameConflict { of_id } if !self.config.moving.rename_on_name_conflict => {
                LifecycleAction::Discarded(
                    self.promoter
                        .discard(record.id, Some(*of_id), REASON_NAME_CONFLICT_RENAME_DISABLED)
                        .await?,
                )
            }
            Decision::NameConflict { .. } => {
                let name = render_rename(&self.config.moving.rename_pattern, &record, Utc::now());
                LifecycleAction::Promoted(
                    self.promoter
                        .promote(record.id, &destination_dir.join(name), true)
                        .await?,
                )
            }
            Decision::Unique => {
                let destination = destination_dir.join(safe_file_name(&record));
                LifecycleAction::Promoted(
                    self.promoter.promote(record.id, &destination, false).await?,
                )
            }
        };

        Ok(ProcessOutcome { decision, action })
    }

    /// Discard an upload outside the resolver, e.g. on operator request.
    pub async fn discard(&self, upload_id: Uuid, reason: &str) -> Result<DiscardOutcome> {
        self.promoter.discard(upload_id, None, reason).await
    }

    pub async fn sweep(&self, options: SweepOptions) -> Result<SweepReport> {
        self.sweeper.sweep(options, &self.cancel).await
    }

    pub async fn reclaim_to(&self, target_bytes: u64) -> Result<SweepReport> {
        self.reclaimer.reclaim_to(target_bytes, &self.cancel).await
    }

    pub async fn disk_status(&self) -> Result<DiskStatus> {
        self.gate.disk_status().await
    }

    pub fn scheduler(&self) -> Arc<SweepScheduler> {
        self.scheduler.clone()
    }

    /// Start periodic sweeps; stop them with `scheduler().shutdown()`.
    pub fn start_scheduler(&self) -> JoinHandle<()> {
        self.scheduler.clone().start()
    }

    /// Interrupt in-flight sweeps, including those started by the capacity
    /// gate, and stop the scheduler.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.scheduler.shutdown();
    }
}
