//! Record store access for upload records
//!
//! [`UploadRepository`] is the contract the lifecycle components consume.
//! `PgUploadRepository` backs it with PostgreSQL; `InMemoryUploadRepository`
//! implements the same compare-and-swap semantics for tests and tooling.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod repository;

pub use memory::InMemoryUploadRepository;
#[cfg(feature = "postgres")]
pub use postgres::{connect, run_migrations, PgUploadRepository};
pub use repository::{ensure_transition, UploadRepository};
