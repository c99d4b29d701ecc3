//! Shelfguard Core Library
//!
//! Domain models, the status machine, error taxonomy and configuration shared
//! by every shelfguard component.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::{Config, DiskProtectionConfig, LogFormat, MovingConfig, PathsConfig};
pub use error::{ErrorMetadata, LogLevel, QuarantineError, QuarantineResult};
pub use models::{
    normalize_metadata, Admission, ContentHash, Decision, DiscardOutcome, DiskStatus, DiskUsage,
    DuplicateSource, FailureKind, ManifestAction, ManifestEntry, NewUpload, PromoteOutcome,
    ProtectionSettings, QuarantineUsage, RejectionKind, StatusUpdate, SweepReport, UploadRecord,
    UploadStatus, PROMOTABLE, SAFE_TO_DELETE,
};
