use shelfguard_core::SweepReport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::sweeper::{RetentionSweeper, SweepOptions};

/// Runs the retention sweeper on a fixed interval until shut down.
///
/// Ticks never overlap: a tick that finds the previous pass still running
/// is skipped.
pub struct SweepScheduler {
    sweeper: RetentionSweeper,
    period: Duration,
    cancel: CancellationToken,
    pass: Mutex<()>,
}

impl SweepScheduler {
    pub fn new(sweeper: RetentionSweeper) -> Self {
        let period = sweeper.cleanup_interval();
        Self::with_period(sweeper, period)
    }

    pub fn with_period(sweeper: RetentionSweeper, period: Duration) -> Self {
        Self {
            sweeper,
            period,
            cancel: CancellationToken::new(),
            pass: Mutex::new(()),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run one pass unless one is already in progress. Returns `None` when
    /// skipped or when the pass failed.
    pub async fn run_once(&self) -> Option<SweepReport> {
        let Ok(_guard) = self.pass.try_lock() else {
            tracing::warn!("Previous sweep still running, skipping tick");
            return None;
        };

        match self.sweeper.sweep(SweepOptions::default(), &self.cancel).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(error = %e, "Scheduled sweep failed");
                None
            }
        }
    }

    /// Start the background loop. The first pass runs immediately.
    /// Returns a JoinHandle for graceful shutdown.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            tracing::info!(period_secs = self.period.as_secs(), "Sweep scheduler started");
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Some(report) = self.run_once().await {
                            tracing::info!(
                                bytes_freed = report.bytes_freed,
                                files_deleted = report.files_deleted,
                                "Scheduled sweep finished"
                            );
                        }
                    }
                }
            }
            tracing::info!("Sweep scheduler stopped");
        })
    }

    /// Stop the loop. An in-flight pass finishes its current record and
    /// returns.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
