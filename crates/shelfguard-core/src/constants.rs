//! Shared constants

/// Size of the read buffer used when streaming a file through the hasher.
pub const HASH_BUFFER_SIZE: usize = 64 * 1024;

pub const BYTES_PER_MB: u64 = 1024 * 1024;
pub const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Suffix for in-flight copies. Files carrying it are never considered by the
/// duplicate scan.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Manifest column order. Consumers parse by position.
pub const MANIFEST_COLUMNS: [&str; 8] = [
    "timestamp",
    "upload_id",
    "original_filename",
    "destination_path",
    "content_hash",
    "size_bytes",
    "action",
    "reason",
];

/// Recorded `duplicate_reason` values.
pub const REASON_HASH_MATCH_DATABASE: &str = "exact_hash_match_database";
pub const REASON_HASH_MATCH_FILESYSTEM: &str = "exact_hash_match_filesystem";
pub const REASON_NAME_CONFLICT_RENAME_DISABLED: &str = "name_conflict_rename_disabled";
pub const REASON_NAME_CONFLICT_RENAMED: &str = "name_conflict_renamed";

pub const RENAME_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const RENAME_FIELD_MAX_CHARS: usize = 100;

/// Longest file name most filesystems accept, in bytes.
pub const MAX_FILE_NAME_BYTES: usize = 255;
