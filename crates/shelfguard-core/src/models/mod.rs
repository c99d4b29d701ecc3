mod disk;
mod hash;
mod manifest;
mod outcome;
mod upload;

pub use disk::{DiskStatus, DiskUsage, ProtectionSettings, QuarantineUsage};
pub use hash::ContentHash;
pub use manifest::{ManifestAction, ManifestEntry};
pub use outcome::{
    Admission, Decision, DiscardOutcome, DuplicateSource, FailureKind, PromoteOutcome,
    RejectionKind, SweepReport,
};
pub use upload::{
    normalize_metadata, NewUpload, StatusUpdate, UploadRecord, UploadStatus, PROMOTABLE,
    SAFE_TO_DELETE,
};
