use async_trait::async_trait;
use shelfguard_core::ContentHash;
use std::path::{Path, PathBuf};

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Copy failed: {0}")]
    CopyFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Destination already exists: {0}")]
    AlreadyExists(String),

    #[error("Path outside permitted root: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A regular file found while walking a directory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Filesystem operations used by the sweepers, the resolver and the promoter.
///
/// All methods run blocking IO off the async runtime.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Whether anything occupies `path`, dangling symlinks included.
    async fn exists(&self, path: &Path) -> bool;

    async fn size(&self, path: &Path) -> StorageResult<u64>;

    /// Streaming SHA-256 of the file's bytes.
    async fn hash(&self, path: &Path) -> StorageResult<ContentHash>;

    /// Delete a file. A missing file counts as success and frees 0 bytes.
    async fn remove(&self, path: &Path) -> StorageResult<u64>;

    /// Whether `path` and the directory `dir` live on the same filesystem.
    /// `dir` may not exist yet; its nearest existing ancestor is used.
    async fn same_filesystem(&self, path: &Path, dir: &Path) -> StorageResult<bool>;

    /// Publish `src` at `dest` without copying. Fails if `dest` exists and
    /// leaves `src` in place.
    async fn link(&self, src: &Path, dest: &Path) -> StorageResult<()>;

    /// Copy `src` to `dest`, flushed to disk. `dest` is removed again if the
    /// copy fails part way.
    async fn copy_to(&self, src: &Path, dest: &Path) -> StorageResult<u64>;

    async fn rename(&self, from: &Path, to: &Path) -> StorageResult<()>;

    async fn ensure_dir(&self, dir: &Path) -> StorageResult<()>;

    async fn set_permissions(&self, path: &Path, mode: u32) -> StorageResult<()>;

    /// Non-hidden regular files under each root. Missing roots are skipped.
    async fn walk_files(&self, roots: &[PathBuf]) -> StorageResult<Vec<FileEntry>>;
}
