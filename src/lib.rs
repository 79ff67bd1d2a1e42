#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tasker Dynamic
//!
//! Execution core of the dynamic fan-out task type: a workflow node that, at
//! run time, expands into an arbitrary number of parameterized sub-workflow
//! instances, tracks each of them and reduces their outcomes into one result
//! for the parent workflow.
//!
//! ## Architecture
//!
//! All coordination goes through a durable instance ledger partitioned by
//! parent task instance id. The orchestrator keeps no state that cannot be
//! rebuilt from the ledger, so a replacement orchestrator picks up a run
//! after a crash without launching any parameter set twice.
//!
//! ## Module Organization
//!
//! - [`expansion`] - Parameter sources and deterministic expansion
//! - [`ledger`] - Instance ledger and repository implementations
//! - [`orchestration`] - Launch gate, dispatcher, completion policy, orchestrator
//! - [`state_machine`] - Orchestrator lifecycle and launch row transitions
//! - [`models`] - Parameter sets, launch rows, runs and policies
//! - [`config`] - Layered configuration and per-task parameters
//! - [`resilience`] - Bounded retry for transient infrastructure failures
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tasker_dynamic::config::ConfigLoader;
//! use tasker_dynamic::ledger::InMemoryLaunchRepository;
//! use tasker_dynamic::orchestration::{Collaborators, DynamicTaskFactory, TaskExecutionContext};
//!
//! # async fn example(collaborators: Collaborators, context: TaskExecutionContext)
//! #     -> Result<(), Box<dyn std::error::Error>> {
//! tasker_dynamic::logging::init_structured_logging();
//!
//! let config = ConfigLoader::load(None)?;
//! let factory = DynamicTaskFactory::new(
//!     config,
//!     Arc::new(InMemoryLaunchRepository::new()),
//!     collaborators,
//! )?;
//!
//! let (_cancel, cancel_rx) = tokio::sync::oneshot::channel();
//! let state = factory.execute(context, cancel_rx).await?;
//! println!("dynamic task finished in state {state}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod expansion;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod resilience;
pub mod state_machine;

pub use config::{ConfigLoader, DynamicTaskConfig, DynamicTaskParameters};
pub use error::{DynamicTaskError, DynamicTaskResult};
pub use expansion::{ParameterExpander, ParameterSource, VarPool};
pub use ledger::{InMemoryLaunchRepository, InstanceLedger, LaunchRepository};
pub use models::{
    CompletionPolicy, DynamicTaskRun, LaunchStatus, ParameterSet, RunVerdict, SubWorkflowLaunch,
};
pub use orchestration::{DynamicTaskFactory, DynamicTaskOrchestrator};
pub use state_machine::OrchestratorState;
