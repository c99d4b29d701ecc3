use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

use super::ContentHash;

/// Lifecycle status of an upload.
///
/// Transitions only move forward; see [`UploadStatus::can_transition_to`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Quarantined,
    Scanning,
    Safe,
    Infected,
    ScanFailed,
    MetadataVerified,
    Moved,
    DuplicateDiscarded,
    MoveFailed,
    AutoDeleted,
    EmergencyDeleted,
}

/// Statuses whose files have not been reviewed or accepted. The gate counts
/// them as quarantine occupancy and only they may be swept or reclaimed.
pub const SAFE_TO_DELETE: [UploadStatus; 4] = [
    UploadStatus::Quarantined,
    UploadStatus::Scanning,
    UploadStatus::ScanFailed,
    UploadStatus::Infected,
];

/// Statuses a promotion or discard may start from.
pub const PROMOTABLE: [UploadStatus; 2] = [UploadStatus::Safe, UploadStatus::MetadataVerified];

impl UploadStatus {
    pub const ALL: [UploadStatus; 11] = [
        UploadStatus::Quarantined,
        UploadStatus::Scanning,
        UploadStatus::Safe,
        UploadStatus::Infected,
        UploadStatus::ScanFailed,
        UploadStatus::MetadataVerified,
        UploadStatus::Moved,
        UploadStatus::DuplicateDiscarded,
        UploadStatus::MoveFailed,
        UploadStatus::AutoDeleted,
        UploadStatus::EmergencyDeleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Quarantined => "quarantined",
            UploadStatus::Scanning => "scanning",
            UploadStatus::Safe => "safe",
            UploadStatus::Infected => "infected",
            UploadStatus::ScanFailed => "scan_failed",
            UploadStatus::MetadataVerified => "metadata_verified",
            UploadStatus::Moved => "moved",
            UploadStatus::DuplicateDiscarded => "duplicate_discarded",
            UploadStatus::MoveFailed => "move_failed",
            UploadStatus::AutoDeleted => "auto_deleted",
            UploadStatus::EmergencyDeleted => "emergency_deleted",
        }
    }

    pub fn is_safe_to_delete(&self) -> bool {
        SAFE_TO_DELETE.contains(self)
    }

    pub fn is_promotable(&self) -> bool {
        PROMOTABLE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::Moved
                | UploadStatus::DuplicateDiscarded
                | UploadStatus::MoveFailed
                | UploadStatus::AutoDeleted
                | UploadStatus::EmergencyDeleted
        )
    }

    /// Whether `self -> next` is a legal forward transition.
    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        use UploadStatus::*;

        if self.is_safe_to_delete() && matches!(next, AutoDeleted | EmergencyDeleted) {
            return true;
        }

        match self {
            Quarantined => matches!(next, Scanning | Safe | Infected | ScanFailed),
            Scanning => matches!(next, Safe | Infected | ScanFailed),
            Safe => matches!(next, MetadataVerified | Moved | DuplicateDiscarded | MoveFailed),
            MetadataVerified => matches!(next, Moved | DuplicateDiscarded | MoveFailed),
            Infected | ScanFailed => false,
            Moved | DuplicateDiscarded | MoveFailed | AutoDeleted | EmergencyDeleted => false,
        }
    }
}

impl Display for UploadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UploadStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UploadStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Invalid upload status: {}", s))
    }
}

/// Trim, collapse internal whitespace and lowercase a title or author.
/// Returns `None` when nothing is left.
pub fn normalize_metadata(value: Option<&str>) -> Option<String> {
    let normalized = value?
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadRecord {
    pub id: Uuid,
    pub original_filename: String,
    /// Extension including the leading dot, or empty.
    pub file_extension: String,
    pub size_bytes: u64,
    pub content_hash: Option<ContentHash>,
    pub quarantine_path: Option<PathBuf>,
    pub final_path: Option<PathBuf>,
    pub status: UploadStatus,
    pub title: Option<String>,
    pub author: Option<String>,
    pub duplicate_of: Option<Uuid>,
    pub duplicate_reason: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl UploadRecord {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// Original filename without its extension.
    pub fn file_stem(&self) -> &str {
        Path::new(&self.original_filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.original_filename)
    }

    pub fn normalized_title(&self) -> Option<String> {
        normalize_metadata(self.title.as_deref())
    }

    pub fn normalized_author(&self) -> Option<String> {
        normalize_metadata(self.author.as_deref())
    }
}

/// Extension of `filename` with its leading dot, lowercased.
pub(crate) fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// Input for creating a record once a file has landed in quarantine.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub id: Uuid,
    pub original_filename: String,
    pub size_bytes: u64,
    pub quarantine_path: PathBuf,
    pub status: UploadStatus,
    pub title: Option<String>,
    pub author: Option<String>,
    pub content_hash: Option<ContentHash>,
    pub created_at: DateTime<Utc>,
}

impl NewUpload {
    pub fn new(
        original_filename: impl Into<String>,
        size_bytes: u64,
        quarantine_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_filename: original_filename.into(),
            size_bytes,
            quarantine_path: quarantine_path.into(),
            status: UploadStatus::Quarantined,
            title: None,
            author: None,
            content_hash: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: UploadStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_metadata(mut self, title: impl Into<String>, author: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self.author = Some(author.into());
        self
    }

    pub fn with_hash(mut self, hash: ContentHash) -> Self {
        self.content_hash = Some(hash);
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn into_record(self) -> UploadRecord {
        let file_extension = extension_of(&self.original_filename);
        UploadRecord {
            id: self.id,
            original_filename: self.original_filename,
            file_extension,
            size_bytes: self.size_bytes,
            content_hash: self.content_hash,
            quarantine_path: Some(self.quarantine_path),
            final_path: None,
            status: self.status,
            title: self.title,
            author: self.author,
            duplicate_of: None,
            duplicate_reason: None,
            error_message: None,
            created_at: self.created_at,
            decided_at: None,
            updated_at: self.created_at,
        }
    }
}

/// Field changes applied together with a status transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub clear_quarantine_path: bool,
    /// Only applied when the record has no final path yet.
    pub final_path: Option<PathBuf>,
    /// Only applied when the record has no content hash yet.
    pub content_hash: Option<ContentHash>,
    pub duplicate_of: Option<Uuid>,
    pub duplicate_reason: Option<String>,
    pub error_message: Option<String>,
}

impl StatusUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear_quarantine_path(mut self) -> Self {
        self.clear_quarantine_path = true;
        self
    }

    pub fn final_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.final_path = Some(path.into());
        self
    }

    pub fn content_hash(mut self, hash: ContentHash) -> Self {
        self.content_hash = Some(hash);
        self
    }

    pub fn duplicate(mut self, of: Option<Uuid>, reason: impl Into<String>) -> Self {
        self.duplicate_of = of;
        self.duplicate_reason = Some(reason.into());
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Apply to an in-memory record. Used by the in-memory store and by
    /// callers that keep a local copy after a successful update.
    pub fn apply(&self, record: &mut UploadRecord, to: UploadStatus, now: DateTime<Utc>) {
        record.status = to;
        if self.clear_quarantine_path {
            record.quarantine_path = None;
        }
        if record.final_path.is_none() {
            record.final_path = self.final_path.clone();
        }
        if record.content_hash.is_none() {
            record.content_hash = self.content_hash.clone();
        }
        if self.duplicate_of.is_some() {
            record.duplicate_of = self.duplicate_of;
        }
        if self.duplicate_reason.is_some() {
            record.duplicate_reason = self.duplicate_reason.clone();
        }
        if self.error_message.is_some() {
            record.error_message = self.error_message.clone();
        }
        record.decided_at = Some(now);
        record.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in UploadStatus::ALL {
            assert_eq!(status.as_str().parse::<UploadStatus>().unwrap(), status);
        }
        assert!("deleted".parse::<UploadStatus>().is_err());
    }

    #[test]
    fn reviewed_files_are_never_deletable() {
        for status in [UploadStatus::Safe, UploadStatus::MetadataVerified, UploadStatus::Moved] {
            assert!(!status.is_safe_to_delete());
            assert!(!status.can_transition_to(UploadStatus::AutoDeleted));
            assert!(!status.can_transition_to(UploadStatus::EmergencyDeleted));
        }
    }

    #[test]
    fn safe_to_delete_statuses_can_be_swept() {
        for status in SAFE_TO_DELETE {
            assert!(status.can_transition_to(UploadStatus::AutoDeleted));
            assert!(status.can_transition_to(UploadStatus::EmergencyDeleted));
            assert!(!status.can_transition_to(UploadStatus::Moved));
        }
    }

    #[test]
    fn transitions_are_monotonic() {
        assert!(UploadStatus::Quarantined.can_transition_to(UploadStatus::Scanning));
        assert!(UploadStatus::Scanning.can_transition_to(UploadStatus::Safe));
        assert!(UploadStatus::Safe.can_transition_to(UploadStatus::MetadataVerified));
        assert!(UploadStatus::MetadataVerified.can_transition_to(UploadStatus::Moved));
        assert!(!UploadStatus::Scanning.can_transition_to(UploadStatus::Quarantined));
        assert!(!UploadStatus::MetadataVerified.can_transition_to(UploadStatus::Safe));
        assert!(!UploadStatus::Infected.can_transition_to(UploadStatus::Safe));
    }

    #[test]
    fn terminal_statuses_never_move() {
        for from in UploadStatus::ALL.iter().filter(|s| s.is_terminal()) {
            for to in UploadStatus::ALL {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn normalization_collapses_case_and_whitespace() {
        assert_eq!(
            normalize_metadata(Some("  The   Hobbit ")),
            Some("the hobbit".to_string())
        );
        assert_eq!(normalize_metadata(Some("   ")), None);
        assert_eq!(normalize_metadata(None), None);
    }

    #[test]
    fn new_upload_derives_extension() {
        let record = NewUpload::new("Dune.EPUB", 10, "/q/abc.epub").into_record();
        assert_eq!(record.file_extension, ".epub");
        assert_eq!(record.file_stem(), "Dune");
        assert_eq!(record.status, UploadStatus::Quarantined);
        assert!(record.final_path.is_none());
    }

    #[test]
    fn apply_sets_final_path_once() {
        let mut record = NewUpload::new("a.pdf", 1, "/q/a.pdf")
            .with_status(UploadStatus::Safe)
            .into_record();
        record.final_path = Some(PathBuf::from("/lib/first.pdf"));
        StatusUpdate::new()
            .final_path("/lib/second.pdf")
            .clear_quarantine_path()
            .apply(&mut record, UploadStatus::Moved, Utc::now());
        assert_eq!(record.final_path, Some(PathBuf::from("/lib/first.pdf")));
        assert!(record.quarantine_path.is_none());
        assert!(record.decided_at.is_some());
    }
}
