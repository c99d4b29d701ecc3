//! Configuration module
//!
//! Configuration is read once at startup into an immutable `Config` and handed
//! to each component at construction. `Config::from_env` loads `.env` first;
//! `Config::from_lookup` takes any key lookup so tests never touch the process
//! environment.

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;

use crate::constants::BYTES_PER_MB;

// Disk protection defaults
const MIN_FREE_SPACE_PERCENT: f64 = 10.0;
const RESERVE_SPACE_BYTES: u64 = 1_073_741_824;
const MAX_QUARANTINE_SIZE_BYTES: u64 = 10_737_418_240;
const MAX_SINGLE_UPLOAD_SIZE_MB: u64 = 100;
const AUTO_CLEANUP_AGE_HOURS: u64 = 72;
const CLEANUP_INTERVAL_MINUTES: u64 = 60;
const EMERGENCY_CLEANUP_THRESHOLD_PERCENT: f64 = 5.0;
const ALERT_THRESHOLD_PERCENT: f64 = 15.0;

// Moving defaults
const RENAME_PATTERN: &str = "{title} - {author} (duplicate_{timestamp}){ext}";
const MANIFEST_PATH: &str = "./logs/manifest.csv";
const FILE_PERMISSIONS_MODE: u32 = 0o600;
const DIRECTORY_PERMISSIONS_MODE: u32 = 0o700;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(anyhow::anyhow!("Invalid log format: {}", s)),
        }
    }
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Directory layout
#[derive(Clone, Debug)]
pub struct PathsConfig {
    pub quarantine_dir: PathBuf,
    pub unsorted_dir: PathBuf,
    pub library_dirs: Vec<PathBuf>,
    /// Subdirectory of `unsorted_dir` that receives promoted files.
    pub processed_subdir: String,
}

impl PathsConfig {
    /// Directory promoted files land in.
    pub fn destination_dir(&self) -> PathBuf {
        self.unsorted_dir.join(&self.processed_subdir)
    }

    /// Every tree the duplicate scan walks: the library first, then unsorted.
    pub fn scan_roots(&self) -> Vec<PathBuf> {
        let mut roots = self.library_dirs.clone();
        roots.push(self.unsorted_dir.clone());
        roots
    }
}

/// Disk protection settings used by the capacity gate and the sweepers
#[derive(Clone, Debug)]
pub struct DiskProtectionConfig {
    pub enabled: bool,
    pub min_free_space_percent: f64,
    pub reserve_space_bytes: u64,
    /// 0 means unlimited.
    pub max_quarantine_size_bytes: u64,
    pub max_single_upload_size_mb: u64,
    pub auto_cleanup_enabled: bool,
    /// 0 disables age-based sweeping.
    pub auto_cleanup_age_hours: u64,
    pub cleanup_interval_minutes: u64,
    pub emergency_cleanup_threshold_percent: f64,
    pub alert_threshold_percent: f64,
}

impl DiskProtectionConfig {
    pub fn max_single_upload_bytes(&self) -> u64 {
        self.max_single_upload_size_mb.saturating_mul(BYTES_PER_MB)
    }
}

/// Promotion settings
#[derive(Clone, Debug)]
pub struct MovingConfig {
    pub rename_on_name_conflict: bool,
    pub rename_pattern: String,
    pub verify_integrity_post_move: bool,
    pub dry_run: bool,
    pub atomic_operations: bool,
    pub checksum_manifest: bool,
    pub manifest_path: PathBuf,
    pub file_permissions_mode: u32,
    pub directory_permissions_mode: u32,
}

/// Complete shelfguard configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub paths: PathsConfig,
    pub disk: DiskProtectionConfig,
    pub moving: MovingConfig,
    pub database_url: Option<String>,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_bool_or(value: Option<String>, default: bool) -> bool {
    match value.map(|v| v.trim().to_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

fn parse_mode_or(value: Option<String>, default: u32) -> u32 {
    value
        .and_then(|v| u32::from_str_radix(v.trim().trim_start_matches("0o"), 8).ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from the process environment (after `.env`).
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from an arbitrary key lookup. Unset or unparsable
    /// values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = |key: &str, default: &str| {
            PathBuf::from(lookup(key).unwrap_or_else(|| default.to_string()))
        };

        let library_dirs = lookup("LIBRARY_DIRS")
            .unwrap_or_else(|| "./data/library".to_string())
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();

        let paths = PathsConfig {
            quarantine_dir: path("QUARANTINE_DIR", "./data/quarantine"),
            unsorted_dir: path("UNSORTED_DIR", "./data/unsorted"),
            library_dirs,
            processed_subdir: lookup("PROCESSED_SUBDIR").unwrap_or_else(|| "processed".to_string()),
        };

        let disk = DiskProtectionConfig {
            enabled: parse_bool_or(lookup("DISK_PROTECTION_ENABLED"), true),
            min_free_space_percent: parse_or(
                lookup("DISK_PROTECTION_MIN_FREE_SPACE_PERCENT"),
                MIN_FREE_SPACE_PERCENT,
            ),
            reserve_space_bytes: parse_or(
                lookup("DISK_PROTECTION_RESERVE_SPACE_BYTES"),
                RESERVE_SPACE_BYTES,
            ),
            max_quarantine_size_bytes: parse_or(
                lookup("DISK_PROTECTION_MAX_QUARANTINE_SIZE_BYTES"),
                MAX_QUARANTINE_SIZE_BYTES,
            ),
            max_single_upload_size_mb: parse_or(
                lookup("DISK_PROTECTION_MAX_SINGLE_UPLOAD_SIZE_MB"),
                MAX_SINGLE_UPLOAD_SIZE_MB,
            ),
            auto_cleanup_enabled: parse_bool_or(
                lookup("DISK_PROTECTION_AUTO_CLEANUP_ENABLED"),
                true,
            ),
            auto_cleanup_age_hours: parse_or(
                lookup("DISK_PROTECTION_AUTO_CLEANUP_AGE_HOURS"),
                AUTO_CLEANUP_AGE_HOURS,
            ),
            cleanup_interval_minutes: parse_or(
                lookup("DISK_PROTECTION_CLEANUP_INTERVAL_MINUTES"),
                CLEANUP_INTERVAL_MINUTES,
            ),
            emergency_cleanup_threshold_percent: parse_or(
                lookup("DISK_PROTECTION_EMERGENCY_CLEANUP_THRESHOLD_PERCENT"),
                EMERGENCY_CLEANUP_THRESHOLD_PERCENT,
            ),
            alert_threshold_percent: parse_or(
                lookup("DISK_PROTECTION_ALERT_THRESHOLD_PERCENT"),
                ALERT_THRESHOLD_PERCENT,
            ),
        };

        let moving = MovingConfig {
            rename_on_name_conflict: parse_bool_or(lookup("MOVING_RENAME_ON_NAME_CONFLICT"), true),
            rename_pattern: lookup("MOVING_RENAME_PATTERN")
                .unwrap_or_else(|| RENAME_PATTERN.to_string()),
            verify_integrity_post_move: parse_bool_or(
                lookup("MOVING_VERIFY_INTEGRITY_POST_MOVE"),
                true,
            ),
            dry_run: parse_bool_or(lookup("MOVING_DRY_RUN"), false),
            atomic_operations: parse_bool_or(lookup("MOVING_ATOMIC_OPERATIONS"), true),
            checksum_manifest: parse_bool_or(lookup("MOVING_CHECKSUM_MANIFEST"), true),
            manifest_path: path("MOVING_MANIFEST_PATH", MANIFEST_PATH),
            file_permissions_mode: parse_mode_or(
                lookup("SECURITY_FILE_PERMISSIONS_MODE"),
                FILE_PERMISSIONS_MODE,
            ),
            directory_permissions_mode: parse_mode_or(
                lookup("SECURITY_DIRECTORY_PERMISSIONS_MODE"),
                DIRECTORY_PERMISSIONS_MODE,
            ),
        };

        Config {
            paths,
            disk,
            moving,
            database_url: lookup("DATABASE_URL").filter(|s| !s.trim().is_empty()),
            log_format: parse_or(lookup("LOG_FORMAT"), LogFormat::Text),
        }
    }

    /// Reject combinations that would make the gate or the promoter misbehave.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let percents = [
            ("min_free_space_percent", self.disk.min_free_space_percent),
            (
                "emergency_cleanup_threshold_percent",
                self.disk.emergency_cleanup_threshold_percent,
            ),
            ("alert_threshold_percent", self.disk.alert_threshold_percent),
        ];
        for (name, value) in percents {
            if !(0.0..=100.0).contains(&value) {
                anyhow::bail!("{} must be between 0 and 100, got {}", name, value);
            }
        }

        if self.disk.emergency_cleanup_threshold_percent > self.disk.alert_threshold_percent {
            anyhow::bail!(
                "emergency_cleanup_threshold_percent ({}) must not exceed \
                 alert_threshold_percent ({})",
                self.disk.emergency_cleanup_threshold_percent,
                self.disk.alert_threshold_percent
            );
        }

        if self.disk.cleanup_interval_minutes == 0 {
            anyhow::bail!("cleanup_interval_minutes must be greater than 0");
        }

        if !self.moving.rename_pattern.contains("{ext}") {
            anyhow::bail!("rename_pattern must contain the {{ext}} token");
        }

        if self.paths.quarantine_dir == self.paths.unsorted_dir {
            anyhow::bail!("quarantine_dir and unsorted_dir must differ");
        }

        Ok(())
    }

    /// Configuration rooted at `base` with every directory beneath it. Used by
    /// tests and local tooling.
    pub fn rooted_at(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        let mut config = Config::default();
        config.paths.quarantine_dir = base.join("quarantine");
        config.paths.unsorted_dir = base.join("unsorted");
        config.paths.library_dirs = vec![base.join("library")];
        config.moving.manifest_path = base.join("logs").join("manifest.csv");
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert!(config.disk.enabled);
        assert_eq!(config.disk.min_free_space_percent, 10.0);
        assert_eq!(config.disk.reserve_space_bytes, 1_073_741_824);
        assert_eq!(config.disk.max_quarantine_size_bytes, 10_737_418_240);
        assert_eq!(config.disk.max_single_upload_bytes(), 100 * 1024 * 1024);
        assert_eq!(config.disk.auto_cleanup_age_hours, 72);
        assert_eq!(config.disk.cleanup_interval_minutes, 60);
        assert!(config.moving.verify_integrity_post_move);
        assert!(!config.moving.dry_run);
        assert!(config.moving.atomic_operations);
        assert_eq!(config.moving.file_permissions_mode, 0o600);
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("DISK_PROTECTION_MIN_FREE_SPACE_PERCENT", "20.5"),
            ("DISK_PROTECTION_MAX_QUARANTINE_SIZE_BYTES", "0"),
            ("MOVING_DRY_RUN", "yes"),
            ("MOVING_ATOMIC_OPERATIONS", "false"),
            ("LIBRARY_DIRS", "/srv/a, /srv/b,"),
            ("SECURITY_FILE_PERMISSIONS_MODE", "640"),
            ("LOG_FORMAT", "JSON"),
        ]));
        assert_eq!(config.disk.min_free_space_percent, 20.5);
        assert_eq!(config.disk.max_quarantine_size_bytes, 0);
        assert!(config.moving.dry_run);
        assert!(!config.moving.atomic_operations);
        assert_eq!(
            config.paths.library_dirs,
            vec![PathBuf::from("/srv/a"), PathBuf::from("/srv/b")]
        );
        assert_eq!(config.moving.file_permissions_mode, 0o640);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn unparsable_values_fall_back() {
        let config = Config::from_lookup(lookup_from(&[
            ("DISK_PROTECTION_AUTO_CLEANUP_AGE_HOURS", "soon"),
            ("MOVING_VERIFY_INTEGRITY_POST_MOVE", "maybe"),
        ]));
        assert_eq!(config.disk.auto_cleanup_age_hours, 72);
        assert!(config.moving.verify_integrity_post_move);
    }

    #[test]
    fn validate_rejects_inverted_thresholds() {
        let mut config = Config::default();
        config.disk.emergency_cleanup_threshold_percent = 20.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_pattern_without_extension() {
        let mut config = Config::default();
        config.moving.rename_pattern = "{title}".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.disk.cleanup_interval_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn destination_is_processed_under_unsorted() {
        let config = Config::rooted_at("/data");
        assert_eq!(config.paths.destination_dir(), PathBuf::from("/data/unsorted/processed"));
        assert_eq!(
            config.paths.scan_roots(),
            vec![PathBuf::from("/data/library"), PathBuf::from("/data/unsorted")]
        );
    }
}
