use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::UploadStatus;

/// Space on the filesystem holding the quarantine directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiskUsage {
    pub total_bytes: u64,
    pub free_bytes: u64,
}

impl DiskUsage {
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }

    pub fn free_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.free_bytes as f64 / self.total_bytes as f64 * 100.0
    }

    /// Bytes that must be freed for free space to reach `percent` of total.
    pub fn deficit_to_percent(&self, percent: f64) -> u64 {
        let wanted = (self.total_bytes as f64 * percent / 100.0).ceil() as u64;
        wanted.saturating_sub(self.free_bytes)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuarantineUsage {
    pub total_bytes: u64,
    /// 0 means unlimited.
    pub max_bytes: u64,
    pub percent_used: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProtectionSettings {
    pub enabled: bool,
    pub min_free_space_percent: f64,
    pub reserve_space_bytes: u64,
    pub max_single_upload_bytes: u64,
    pub auto_cleanup_enabled: bool,
    pub auto_cleanup_age_hours: u64,
    pub emergency_cleanup_threshold_percent: f64,
    pub alert_threshold_percent: f64,
}

/// Operator-facing snapshot of disk and quarantine state.
#[derive(Debug, Clone, Serialize)]
pub struct DiskStatus {
    pub generated_at: DateTime<Utc>,
    pub disk: DiskUsage,
    pub free_percent: f64,
    pub quarantine: QuarantineUsage,
    pub counts_by_status: BTreeMap<UploadStatus, u64>,
    pub protection: ProtectionSettings,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deficit_is_zero_when_above_target() {
        let usage = DiskUsage {
            total_bytes: 1000,
            free_bytes: 200,
        };
        assert_eq!(usage.deficit_to_percent(15.0), 0);
        assert_eq!(usage.deficit_to_percent(30.0), 100);
        assert_eq!(usage.used_bytes(), 800);
        assert_eq!(usage.free_percent(), 20.0);
    }

    #[test]
    fn empty_disk_reports_zero_percent() {
        let usage = DiskUsage {
            total_bytes: 0,
            free_bytes: 0,
        };
        assert_eq!(usage.free_percent(), 0.0);
    }
}
