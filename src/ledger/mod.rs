//! # Instance Ledger
//!
//! Durable record mapping (parent task instance, parameter-set index) to the
//! command and sub-workflow instance launched for it.
//!
//! ## Architecture
//!
//! - [`LaunchRepository`]: narrow persistence contract (insert-if-absent,
//!   read, per-row compare-and-set). Implementations are partitioned by parent
//!   task instance id; no row is written by more than one orchestrator.
//! - [`InstanceLedger`]: enforces the row invariants on top of a repository
//!   (one command id per index, no observation before dispatch, terminal rows
//!   never move) and retries transient I/O failures.
//! - [`InMemoryLaunchRepository`]: in-process repository for tests and
//!   embedding hosts.
//! - `PgLaunchRepository`: PostgreSQL repository (feature `postgres`).

pub mod instance_ledger;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod repository;

pub use instance_ledger::{DispatchRecord, InstanceLedger, ObservationOutcome};
pub use memory::InMemoryLaunchRepository;
#[cfg(feature = "postgres")]
pub use postgres::PgLaunchRepository;
pub use repository::{LaunchRepository, LaunchUpdate, RepositoryResult};
