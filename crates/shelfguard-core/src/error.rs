//! Error types module
//!
//! `QuarantineError` is the taxonomy used across shelfguard. Admission
//! refusals, duplicates and claim conflicts are normally returned as values
//! (`Admission`, `Decision`, `PromoteOutcome`); the matching variants here exist
//! so the calling layer can convert an outcome into an error when it wants to.

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Expected outcomes like duplicates or refused admissions
    Debug,
    /// Recoverable pressure such as capacity limits
    Warn,
    /// Unexpected failures
    Error,
}

/// Self-description of an error for logging and for the calling layer.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "INSUFFICIENT_SPACE")
    fn error_code(&self) -> &'static str;

    /// Whether the caller may retry later
    fn is_recoverable(&self) -> bool;

    /// Whether the condition must reach an operator
    fn is_alert(&self) -> bool;

    /// Suggested action for the caller
    fn suggested_action(&self) -> Option<&'static str>;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum QuarantineError {
    #[error("{reason}")]
    InsufficientSpace { reason: String },

    #[error(
        "Quarantine capacity exceeded: {current} + {requested} bytes exceeds limit of {limit} bytes"
    )]
    QuarantineCapacityExceeded {
        current: u64,
        requested: u64,
        limit: u64,
    },

    #[error("File too large: {size} bytes exceeds limit of {limit} bytes")]
    SingleFileTooLarge { size: u64, limit: u64 },

    #[error("Exact duplicate of {of_id}: {reason}")]
    ExactDuplicate { of_id: String, reason: String },

    #[error("Name conflict with {of_id}")]
    NameConflict { of_id: String },

    #[error("Integrity mismatch for {upload_id}: expected {expected}, found {actual}")]
    IntegrityMismatch {
        upload_id: String,
        expected: String,
        actual: String,
    },

    #[error("Record {0} is claimed by another operation")]
    RecordClaimConflict(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO failure: {0}")]
    IoFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Record store error: {0}")]
    Database(String),

    #[error("{message}")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type QuarantineResult<T> = Result<T, QuarantineError>;

impl From<anyhow::Error> for QuarantineError {
    fn from(err: anyhow::Error) -> Self {
        QuarantineError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for QuarantineError {
    fn from(err: io::Error) -> Self {
        QuarantineError::IoFailure(err.to_string())
    }
}

/// Static metadata per variant: (code, recoverable, alert, suggested_action, log_level).
fn static_metadata(
    err: &QuarantineError,
) -> (&'static str, bool, bool, Option<&'static str>, LogLevel) {
    use QuarantineError::*;
    match err {
        InsufficientSpace { .. } => (
            "INSUFFICIENT_SPACE",
            true,
            false,
            Some("Retry later or free disk space"),
            LogLevel::Warn,
        ),
        QuarantineCapacityExceeded { .. } => (
            "QUARANTINE_CAPACITY_EXCEEDED",
            true,
            false,
            Some("Retry after pending uploads are processed"),
            LogLevel::Warn,
        ),
        SingleFileTooLarge { .. } => (
            "SINGLE_FILE_TOO_LARGE",
            false,
            false,
            Some("Upload a smaller file"),
            LogLevel::Debug,
        ),
        ExactDuplicate { .. } => ("EXACT_DUPLICATE", false, false, None, LogLevel::Debug),
        NameConflict { .. } => ("NAME_CONFLICT", false, false, None, LogLevel::Debug),
        IntegrityMismatch { .. } => (
            "INTEGRITY_MISMATCH",
            false,
            true,
            Some("Inspect the filesystem; the quarantine copy was retained"),
            LogLevel::Error,
        ),
        RecordClaimConflict(_) => (
            "RECORD_CLAIM_CONFLICT",
            true,
            false,
            Some("Try again later"),
            LogLevel::Debug,
        ),
        InvalidTransition { .. } => ("INVALID_TRANSITION", false, false, None, LogLevel::Warn),
        NotFound(_) => ("NOT_FOUND", false, false, None, LogLevel::Debug),
        IoFailure(_) => (
            "IO_FAILURE",
            true,
            true,
            Some("Check disk health and permissions"),
            LogLevel::Error,
        ),
        Config(_) => ("CONFIG_ERROR", false, false, None, LogLevel::Error),
        Database(_) => ("DATABASE_ERROR", true, false, None, LogLevel::Error),
        InternalWithSource { .. } => ("INTERNAL_ERROR", false, false, None, LogLevel::Error),
    }
}

impl ErrorMetadata for QuarantineError {
    fn error_code(&self) -> &'static str {
        static_metadata(self).0
    }

    fn is_recoverable(&self) -> bool {
        static_metadata(self).1
    }

    fn is_alert(&self) -> bool {
        static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        static_metadata(self).3
    }

    fn log_level(&self) -> LogLevel {
        static_metadata(self).4
    }
}

impl QuarantineError {
    /// Emit this error through `tracing` at its own level.
    pub fn log(&self) {
        let code = self.error_code();
        match self.log_level() {
            LogLevel::Debug => {
                tracing::debug!(error_code = code, error = %self, "Quarantine outcome")
            }
            LogLevel::Warn => {
                tracing::warn!(error_code = code, error = %self, "Quarantine warning")
            }
            LogLevel::Error => tracing::error!(
                error_code = code,
                alert = self.is_alert(),
                error = %self,
                "Quarantine failure"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_mismatch_is_an_alert() {
        let err = QuarantineError::IntegrityMismatch {
            upload_id: "u1".to_string(),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert_eq!(err.error_code(), "INTEGRITY_MISMATCH");
        assert!(err.is_alert());
        assert!(!err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn admission_errors_are_recoverable_and_quiet() {
        let err = QuarantineError::QuarantineCapacityExceeded {
            current: 10,
            requested: 5,
            limit: 12,
        };
        assert!(err.is_recoverable());
        assert!(!err.is_alert());
        assert!(err.to_string().contains("exceeds limit of 12 bytes"));
    }

    #[test]
    fn claim_conflict_is_retryable() {
        let err = QuarantineError::RecordClaimConflict("abc".to_string());
        assert_eq!(err.error_code(), "RECORD_CLAIM_CONFLICT");
        assert!(err.is_recoverable());
        assert_eq!(err.suggested_action(), Some("Try again later"));
    }

    #[test]
    fn io_errors_convert() {
        let err: QuarantineError = io::Error::new(io::ErrorKind::PermissionDenied, "nope").into();
        assert_eq!(err.error_code(), "IO_FAILURE");
        assert!(err.is_alert());
        assert_eq!(err.to_string(), "IO failure: nope");
    }

    #[test]
    fn wrapped_errors_keep_their_message() {
        let err = QuarantineError::from(anyhow::anyhow!("record store offline"));
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
        assert_eq!(err.to_string(), "record store offline");
    }
}
