//! Shelfguard Infrastructure Library
//!
//! Components that protect the host from running out of space:
//! - Capacity gate for admission decisions
//! - Retention sweeper and emergency reclaimer
//! - Periodic sweep scheduler
//! - Per-record claim registry shared with the promoter
//! - Telemetry initialization

pub mod claims;

#[cfg(feature = "observability-basic")]
pub mod telemetry;

#[cfg(feature = "cleanup")]
pub mod cleanup;

#[cfg(feature = "capacity")]
pub mod capacity;

// Re-export commonly used types
pub use claims::{ClaimRegistry, RecordClaim};

#[cfg(feature = "observability-basic")]
pub use telemetry::init_telemetry;

#[cfg(feature = "cleanup")]
pub use cleanup::{EmergencyReclaimer, RetentionSweeper, SweepOptions, SweepScheduler};

#[cfg(feature = "capacity")]
pub use capacity::{CapacityGate, DiskProbe, StaticDiskProbe, SysinfoDiskProbe};
