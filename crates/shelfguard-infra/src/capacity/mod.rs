//! Admission control for new uploads

mod gate;
mod probe;

pub use gate::CapacityGate;
pub use probe::{DiskProbe, StaticDiskProbe, SysinfoDiskProbe};
