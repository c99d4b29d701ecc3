//! Quarantine cleanup: age-based retention sweeps, emergency reclaim under
//! disk pressure, and the periodic scheduler.

mod evict;
mod reclaimer;
mod scheduler;
mod sweeper;

pub use evict::{EvictionKind, EvictionResult, Evictor};
pub use reclaimer::EmergencyReclaimer;
pub use scheduler::SweepScheduler;
pub use sweeper::{RetentionSweeper, SweepOptions};

#[cfg(test)]
pub(crate) mod test_support;
