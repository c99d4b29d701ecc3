//! Append-only CSV audit log of promote, rename and discard decisions.
//!
//! The file is readable without the record store: one header row, then one
//! row per operation in `MANIFEST_COLUMNS` order.

use anyhow::{anyhow, Context, Result};
use shelfguard_core::constants::MANIFEST_COLUMNS;
use shelfguard_core::{ManifestEntry, MovingConfig};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub struct AuditManifest {
    path: PathBuf,
    enabled: bool,
    write_lock: Mutex<()>,
}

impl AuditManifest {
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            path: path.into(),
            enabled,
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &MovingConfig) -> Self {
        Self::new(config.manifest_path.clone(), config.checksum_manifest)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append one entry and flush it to disk.
    #[tracing::instrument(
        skip(self, entry),
        fields(upload_id = %entry.upload_id, action = %entry.action)
    )]
    pub async fn append(&self, entry: &ManifestEntry) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        let row = entry.to_row();
        tokio::task::spawn_blocking(move || append_row(&path, &row))
            .await
            .map_err(|e| anyhow!("spawn_blocking for manifest append: {}", e))?
    }

    pub async fn read_all(&self) -> Result<Vec<ManifestEntry>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_manifest(&path))
            .await
            .map_err(|e| anyhow!("spawn_blocking for manifest read: {}", e))?
    }
}

fn append_row(path: &Path, row: &[String]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create manifest directory {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open manifest {}", path.display()))?;
    let needs_header = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(file);
    if needs_header {
        writer.write_record(MANIFEST_COLUMNS)?;
    }
    writer.write_record(row)?;
    writer.flush()?;

    let file = writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to finish manifest write: {}", e))?;
    file.sync_data()?;
    Ok(())
}

/// Parse every entry of a manifest file. A missing file has no entries.
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Failed to open manifest {}", path.display()))?;

    reader
        .records()
        .enumerate()
        .map(|(index, record)| {
            let record = record?;
            let fields: Vec<&str> = record.iter().collect();
            ManifestEntry::from_row(&fields)
                .with_context(|| format!("Malformed manifest row {}", index + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shelfguard_core::ManifestAction;
    use uuid::Uuid;

    fn entry(name: &str, action: ManifestAction, destination: Option<&str>) -> ManifestEntry {
        ManifestEntry {
            timestamp: Utc::now(),
            upload_id: Uuid::new_v4(),
            original_filename: name.to_string(),
            destination_path: destination.map(PathBuf::from),
            content_hash: Some(
                "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
                    .parse()
                    .unwrap(),
            ),
            size_bytes: 3,
            action,
            reason: None,
        }
    }

    #[tokio::test]
    async fn writes_header_once_then_appends() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = AuditManifest::new(dir.path().join("logs/manifest.csv"), true);

        manifest
            .append(&entry("a.epub", ManifestAction::Moved, Some("/lib/a.epub")))
            .await
            .unwrap();
        manifest
            .append(&entry("b, \"quoted\".epub", ManifestAction::Discarded, None))
            .await
            .unwrap();

        let text = fs::read_to_string(manifest.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], MANIFEST_COLUMNS.join(","));
        assert_eq!(lines.len(), 3);
        assert!(lines[2].contains(",discarded,"));

        let entries = manifest.read_all().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].original_filename, "b, \"quoted\".epub");
        assert_eq!(entries[1].destination_path, None);
        assert_eq!(entries[0].destination_path, Some(PathBuf::from("/lib/a.epub")));
    }

    #[tokio::test]
    async fn disabled_manifest_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = AuditManifest::new(dir.path().join("manifest.csv"), false);
        manifest
            .append(&entry("a.epub", ManifestAction::Moved, Some("/x")))
            .await
            .unwrap();
        assert!(!manifest.path().exists());
        assert!(manifest.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = std::sync::Arc::new(AuditManifest::new(dir.path().join("m.csv"), true));

        let mut handles = Vec::new();
        for i in 0..20 {
            let manifest = manifest.clone();
            handles.push(tokio::spawn(async move {
                manifest
                    .append(&entry(&format!("{}.pdf", i), ManifestAction::Moved, Some("/d")))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(manifest.read_all().await.unwrap().len(), 20);
    }
}
