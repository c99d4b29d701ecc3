//! Result values returned across the component boundary. Expected outcomes
//! such as refusals and duplicates live here instead of in the error type.

use serde::Serialize;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use uuid::Uuid;

use super::ManifestAction;
use crate::constants::{REASON_HASH_MATCH_DATABASE, REASON_HASH_MATCH_FILESYSTEM};
use crate::error::QuarantineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionKind {
    InsufficientSpace { free_after: u64, total: u64 },
    QuarantineCapacityExceeded { current: u64, requested: u64, limit: u64 },
    SingleFileTooLarge { size: u64, limit: u64 },
}

/// Answer of the capacity gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Admission {
    Admitted {
        /// Bytes freed by sweeps the check triggered.
        reclaimed_bytes: u64,
    },
    Rejected { kind: RejectionKind, reason: String },
}

impl Admission {
    pub fn allowed(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            Admission::Admitted { .. } => "Sufficient space available",
            Admission::Rejected { reason, .. } => reason,
        }
    }

    /// Convert a refusal into the matching error for callers that want `?`.
    pub fn into_result(self) -> Result<(), QuarantineError> {
        match self {
            Admission::Admitted { .. } => Ok(()),
            Admission::Rejected { kind, reason } => Err(match kind {
                RejectionKind::InsufficientSpace { .. } => {
                    QuarantineError::InsufficientSpace { reason }
                }
                RejectionKind::QuarantineCapacityExceeded {
                    current,
                    requested,
                    limit,
                } => QuarantineError::QuarantineCapacityExceeded {
                    current,
                    requested,
                    limit,
                },
                RejectionKind::SingleFileTooLarge { size, limit } => {
                    QuarantineError::SingleFileTooLarge { size, limit }
                }
            }),
        }
    }
}

/// Where an exact duplicate was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DuplicateSource {
    Index,
    Disk { path: PathBuf },
}

/// Answer of the duplicate resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Unique,
    ExactDuplicate {
        /// The accepted record holding the same bytes; `None` when the match
        /// is a file the record store does not know about.
        of_id: Option<Uuid>,
        source: DuplicateSource,
        reason: String,
    },
    NameConflict { of_id: Uuid },
}

impl Decision {
    /// Value recorded in `duplicate_reason` when this decision discards.
    pub fn reason_code(&self) -> Option<&'static str> {
        match self {
            Decision::ExactDuplicate {
                source: DuplicateSource::Index,
                ..
            } => Some(REASON_HASH_MATCH_DATABASE),
            Decision::ExactDuplicate {
                source: DuplicateSource::Disk { .. },
                ..
            } => Some(REASON_HASH_MATCH_FILESYSTEM),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    IntegrityMismatch,
    IoFailure,
    RecordClaimConflict,
    InvalidState,
    SourceMissing,
    NotFound,
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let s = match self {
            FailureKind::IntegrityMismatch => "integrity_mismatch",
            FailureKind::IoFailure => "io_failure",
            FailureKind::RecordClaimConflict => "record_claim_conflict",
            FailureKind::InvalidState => "invalid_state",
            FailureKind::SourceMissing => "source_missing",
            FailureKind::NotFound => "not_found",
        };
        write!(f, "{}", s)
    }
}

/// Result of a promotion attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PromoteOutcome {
    Moved { final_path: PathBuf, renamed: bool },
    /// Nothing was changed; this is what a real run would have done.
    DryRun {
        source: PathBuf,
        destination: PathBuf,
        action: ManifestAction,
    },
    Failed { kind: FailureKind, reason: String },
}

impl PromoteOutcome {
    pub fn failed(kind: FailureKind, reason: impl Into<String>) -> Self {
        PromoteOutcome::Failed {
            kind,
            reason: reason.into(),
        }
    }

    pub fn is_moved(&self) -> bool {
        matches!(self, PromoteOutcome::Moved { .. })
    }
}

/// Result of discarding a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DiscardOutcome {
    Discarded { bytes_freed: u64 },
    DryRun { source: PathBuf, reason: String },
    Failed { kind: FailureKind, reason: String },
}

impl DiscardOutcome {
    pub fn failed(kind: FailureKind, reason: impl Into<String>) -> Self {
        DiscardOutcome::Failed {
            kind,
            reason: reason.into(),
        }
    }
}

/// Summary of a sweep or reclaim pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub bytes_freed: u64,
    pub files_deleted: u64,
    pub records_processed: u64,
    /// Records skipped because another operation held them.
    pub skipped_claimed: u64,
    /// Stopped early by cancellation or deadline.
    pub interrupted: bool,
}

impl SweepReport {
    pub fn merge(&mut self, other: &SweepReport) {
        self.bytes_freed += other.bytes_freed;
        self.files_deleted += other.files_deleted;
        self.records_processed += other.records_processed;
        self.skipped_claimed += other.skipped_claimed;
        self.interrupted |= other.interrupted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_converts_to_matching_error() {
        let admission = Admission::Rejected {
            kind: RejectionKind::SingleFileTooLarge { size: 10, limit: 5 },
            reason: "too big".to_string(),
        };
        assert!(!admission.allowed());
        assert_eq!(admission.reason(), "too big");
        match admission.into_result() {
            Err(QuarantineError::SingleFileTooLarge { size, limit }) => {
                assert_eq!((size, limit), (10, 5));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn duplicate_reason_codes_follow_source() {
        let index = Decision::ExactDuplicate {
            of_id: Some(Uuid::nil()),
            source: DuplicateSource::Index,
            reason: "hash match in index".to_string(),
        };
        let disk = Decision::ExactDuplicate {
            of_id: None,
            source: DuplicateSource::Disk {
                path: PathBuf::from("/lib/a.epub"),
            },
            reason: "hash match on disk".to_string(),
        };
        assert_eq!(index.reason_code(), Some("exact_hash_match_database"));
        assert_eq!(disk.reason_code(), Some("exact_hash_match_filesystem"));
        assert_eq!(Decision::Unique.reason_code(), None);
    }

    #[test]
    fn dry_run_serializes_with_distinct_tag() {
        let outcome = PromoteOutcome::DryRun {
            source: PathBuf::from("/q/a"),
            destination: PathBuf::from("/u/a"),
            action: ManifestAction::Moved,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "dry_run");
        assert!(!outcome.is_moved());
    }
}
