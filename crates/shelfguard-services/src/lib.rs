//! Shelfguard Services Layer
//!
//! Promotion-side components and the lifecycle facade the calling layer
//! talks to: duplicate resolution, atomic promotion and discard, the audit
//! manifest, and [`QuarantineLifecycle`] which wires them together with the
//! capacity gate and the sweepers.

pub mod lifecycle;
pub mod manifest;
pub mod promoter;
pub mod rename;
pub mod resolver;

pub use lifecycle::{LifecycleAction, ProcessOutcome, QuarantineLifecycle};
pub use manifest::{read_manifest, AuditManifest};
pub use promoter::Promoter;
pub use rename::{render_rename, safe_file_name, sanitize_component};
pub use resolver::DuplicateResolver;

pub use shelfguard_infra::{
    CapacityGate, ClaimRegistry, DiskProbe, EmergencyReclaimer, RetentionSweeper, StaticDiskProbe,
    SweepOptions, SweepScheduler, SysinfoDiskProbe,
};
pub use shelfguard_storage::{FileStore, LocalFileStore, StorageError, StorageResult};
