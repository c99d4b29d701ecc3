//! Path helpers: confinement checks, hidden temp names and numbered
//! destination names.

use shelfguard_core::constants::PARTIAL_SUFFIX;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use crate::traits::{StorageError, StorageResult};

/// Confirm `path` resolves inside `root` before anything deletes it.
///
/// Rejects `..` components outright, then compares canonical forms. A path
/// that no longer exists is checked through its parent directory.
pub fn guard_path(root: &Path, path: &Path) -> StorageResult<PathBuf> {
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(StorageError::InvalidPath(format!(
            "{} contains parent directory components",
            path.display()
        )));
    }

    let root_canonical = root.canonicalize().map_err(|e| {
        StorageError::InvalidPath(format!("cannot resolve root {}: {}", root.display(), e))
    })?;

    let resolved = match path.canonicalize() {
        Ok(canonical) => Some(canonical),
        Err(_) => {
            let file_name = path.file_name().ok_or_else(|| {
                StorageError::InvalidPath(format!("{} has no file name", path.display()))
            })?;
            path.parent()
                .and_then(|parent| parent.canonicalize().ok())
                .map(|parent| parent.join(file_name))
        }
    };

    let inside = match &resolved {
        Some(resolved) => resolved.starts_with(&root_canonical),
        // Parent is gone too: nothing on disk to protect, compare lexically.
        None => path.starts_with(root),
    };

    if inside {
        Ok(resolved.unwrap_or_else(|| path.to_path_buf()))
    } else {
        Err(StorageError::InvalidPath(format!(
            "{} resolves outside {}",
            path.display(),
            root.display()
        )))
    }
}

pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Hidden in-flight name next to `final_path`, e.g. `.book.epub.<uuid>.partial`.
pub fn hidden_temp_name(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    let temp = format!(".{}.{}{}", name, Uuid::new_v4().simple(), PARTIAL_SUFFIX);
    match final_path.parent() {
        Some(parent) => parent.join(temp),
        None => PathBuf::from(temp),
    }
}

/// `file_name` inside `dir` for `n == 0`, otherwise `stem_n.ext`.
pub fn numbered_destination(dir: &Path, file_name: &str, n: u32) -> PathBuf {
    if n == 0 {
        return dir.join(file_name);
    }

    let as_path = Path::new(file_name);
    let stem = as_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    let ext = as_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();
    dir.join(format!("{}_{}{}", stem, n, ext))
}
