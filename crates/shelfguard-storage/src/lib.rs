//! Shelfguard Storage Library
//!
//! Filesystem collaborator for the quarantine lifecycle: byte-level
//! stat/copy/link/rename/delete, streaming content hashing and path
//! confinement.

pub mod hashing;
pub mod local;
pub mod paths;
pub mod traits;

pub use hashing::{hash_bytes, hash_file};
pub use local::LocalFileStore;
pub use paths::{guard_path, hidden_temp_name, is_hidden, numbered_destination};
pub use traits::{FileEntry, FileStore, StorageError, StorageResult};
