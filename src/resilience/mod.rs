//! # Resilience Module
//!
//! Bounded retry with exponential backoff for transient infrastructure
//! failures (command submission, ledger I/O).
//!
//! Every mutating operation of the orchestrator is idempotent by parameter-set
//! index, so retrying at the point of failure is always safe.
//!
//! ## Usage
//!
//! ```rust
//! use tasker_dynamic::config::RetryConfig;
//! use tasker_dynamic::resilience::RetryPolicy;
//! use tasker_dynamic::DynamicTaskError;
//!
//! # tokio_test::block_on(async {
//! let policy = RetryPolicy::from(&RetryConfig::default());
//! let value = policy
//!     .run("example", || async { Ok::<_, DynamicTaskError>(42) })
//!     .await?;
//! assert_eq!(value, 42);
//! # Ok::<(), DynamicTaskError>(())
//! # }).unwrap();
//! ```

pub mod retry;

pub use retry::RetryPolicy;
