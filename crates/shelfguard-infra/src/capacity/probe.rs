use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shelfguard_core::DiskUsage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use sysinfo::Disks;

/// Source of disk usage figures for the filesystem holding a path.
#[async_trait]
pub trait DiskProbe: Send + Sync {
    async fn usage(&self, path: &Path) -> Result<DiskUsage>;
}

/// Reads mounted disks through `sysinfo`.
#[derive(Clone, Default)]
pub struct SysinfoDiskProbe;

impl SysinfoDiskProbe {
    pub fn new() -> Self {
        Self
    }

    /// Picks the disk whose mount point is the longest prefix of `path`.
    fn usage_blocking(path: &Path) -> Result<DiskUsage> {
        let resolved = path
            .ancestors()
            .find_map(|p| p.canonicalize().ok())
            .unwrap_or_else(|| PathBuf::from("/"));

        let disks = Disks::new_with_refreshed_list();
        disks
            .iter()
            .filter(|disk| resolved.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| DiskUsage {
                total_bytes: disk.total_space(),
                free_bytes: disk.available_space(),
            })
            .ok_or_else(|| anyhow!("Could not determine disk space for path: {}", path.display()))
    }
}

#[async_trait]
impl DiskProbe for SysinfoDiskProbe {
    async fn usage(&self, path: &Path) -> Result<DiskUsage> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::usage_blocking(&path))
            .await
            .map_err(|e| anyhow!("spawn_blocking for disk space check: {}", e))?
    }
}

/// Fixed figures, adjustable at runtime. For tests and dry runs.
#[derive(Default)]
pub struct StaticDiskProbe {
    total_bytes: AtomicU64,
    free_bytes: AtomicU64,
}

impl StaticDiskProbe {
    pub fn new(total_bytes: u64, free_bytes: u64) -> Self {
        Self {
            total_bytes: AtomicU64::new(total_bytes),
            free_bytes: AtomicU64::new(free_bytes),
        }
    }

    pub fn set_free(&self, free_bytes: u64) {
        self.free_bytes.store(free_bytes, Ordering::SeqCst);
    }
}

#[async_trait]
impl DiskProbe for StaticDiskProbe {
    async fn usage(&self, _path: &Path) -> Result<DiskUsage> {
        Ok(DiskUsage {
            total_bytes: self.total_bytes.load(Ordering::SeqCst),
            free_bytes: self.free_bytes.load(Ordering::SeqCst),
        })
    }
}
