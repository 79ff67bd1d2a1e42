//! # Parameter Expansion
//!
//! Turns the parameter source declared on a dynamic task into the ordered
//! sequence of parameter sets, one per planned sub-workflow instance.
//!
//! Expansion is a pure function of the declared source and the upstream
//! variable pool. Re-expanding after a restart reproduces the same
//! index-to-parameter-set assignment, which is what lets planning be replayed
//! against an existing ledger.

pub mod parameter_expander;
pub mod parameter_source;

pub use parameter_expander::ParameterExpander;
pub use parameter_source::{DynamicInputParameter, ParameterSource, VarPool};
