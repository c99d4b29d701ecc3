use crate::hashing::hash_file;
use crate::paths::is_hidden;
use crate::traits::{FileEntry, FileStore, StorageError, StorageResult};
use async_trait::async_trait;
use shelfguard_core::ContentHash;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Local filesystem implementation of [`FileStore`]
#[derive(Clone, Debug)]
pub struct LocalFileStore {
    directory_mode: u32,
}

impl Default for LocalFileStore {
    fn default() -> Self {
        Self::new(0o700)
    }
}

impl LocalFileStore {
    /// # Arguments
    /// * `directory_mode` - Unix permission bits applied to directories this store creates
    pub fn new(directory_mode: u32) -> Self {
        Self { directory_mode }
    }
}

async fn blocking<T, F>(f: F) -> StorageResult<T>
where
    F: FnOnce() -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::TaskFailed(e.to_string()))?
}

fn nearest_existing(path: &Path) -> Option<&Path> {
    path.ancestors().find(|p| p.exists())
}

#[cfg(unix)]
fn device_of(path: &Path) -> io::Result<u64> {
    use std::os::unix::fs::MetadataExt;
    Ok(fs::metadata(path)?.dev())
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

fn copy_synced(src: &Path, dest: &Path) -> io::Result<u64> {
    let mut reader = File::open(src)?;
    let mut writer = OpenOptions::new().write(true).create_new(true).open(dest)?;
    let copied = io::copy(&mut reader, &mut writer)?;
    writer.sync_all()?;
    Ok(copied)
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::symlink_metadata(path).await.is_ok()
    }

    async fn size(&self, path: &Path) -> StorageResult<u64> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn hash(&self, path: &Path) -> StorageResult<ContentHash> {
        let path = path.to_path_buf();
        blocking(move || match hash_file(&path) {
            Ok(hash) => Ok(hash),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn remove(&self, path: &Path) -> StorageResult<u64> {
        let size = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "File already absent");
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(size),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "{}: {}",
                path.display(),
                e
            ))),
        }
    }

    #[cfg(unix)]
    async fn same_filesystem(&self, path: &Path, dir: &Path) -> StorageResult<bool> {
        let path = path.to_path_buf();
        let dir = dir.to_path_buf();
        blocking(move || {
            let anchor = nearest_existing(&dir)
                .ok_or_else(|| StorageError::NotFound(dir.display().to_string()))?;
            Ok(device_of(&path)? == device_of(anchor)?)
        })
        .await
    }

    #[cfg(not(unix))]
    async fn same_filesystem(&self, _path: &Path, _dir: &Path) -> StorageResult<bool> {
        Ok(false)
    }

    async fn link(&self, src: &Path, dest: &Path) -> StorageResult<()> {
        match tokio::fs::hard_link(src, dest).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists(dest.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn copy_to(&self, src: &Path, dest: &Path) -> StorageResult<u64> {
        let src = src.to_path_buf();
        let dest = dest.to_path_buf();
        blocking(move || match copy_synced(&src, &dest) {
            Ok(copied) => Ok(copied),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists(dest.display().to_string()))
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&dest) {
                    if cleanup.kind() != ErrorKind::NotFound {
                        tracing::warn!(
                            error = %cleanup,
                            path = %dest.display(),
                            "Failed to remove partial copy"
                        );
                    }
                }
                Err(StorageError::CopyFailed(format!(
                    "{} -> {}: {}",
                    src.display(),
                    dest.display(),
                    e
                )))
            }
        })
        .await
    }

    async fn rename(&self, from: &Path, to: &Path) -> StorageResult<()> {
        tokio::fs::rename(from, to).await?;
        Ok(())
    }

    async fn ensure_dir(&self, dir: &Path) -> StorageResult<()> {
        let dir = dir.to_path_buf();
        let mode = self.directory_mode;
        blocking(move || {
            if !dir.exists() {
                fs::create_dir_all(&dir)?;
                apply_mode(&dir, mode)?;
            }
            Ok(())
        })
        .await
    }

    async fn set_permissions(&self, path: &Path, mode: u32) -> StorageResult<()> {
        let path = path.to_path_buf();
        blocking(move || Ok(apply_mode(&path, mode)?)).await
    }

    async fn walk_files(&self, roots: &[PathBuf]) -> StorageResult<Vec<FileEntry>> {
        let roots = roots.to_vec();
        blocking(move || {
            let mut files = Vec::new();
            for root in roots {
                if !root.is_dir() {
                    tracing::warn!(root = %root.display(), "Scan root does not exist, skipping");
                    continue;
                }
                let walker = WalkDir::new(&root)
                    .into_iter()
                    .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.path()));
                for entry in walker {
                    let entry = match entry {
                        Ok(entry) => entry,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to read directory entry");
                            continue;
                        }
                    };
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    let size_bytes = match entry.metadata() {
                        Ok(meta) => meta.len(),
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                path = %entry.path().display(),
                                "Failed to stat file"
                            );
                            continue;
                        }
                    };
                    files.push(FileEntry {
                        path: entry.into_path(),
                        size_bytes,
                    });
                }
            }
            Ok(files)
        })
        .await
    }
}
