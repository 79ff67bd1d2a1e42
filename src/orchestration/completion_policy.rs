//! # Completion Policy Evaluator
//!
//! Reduces the full set of launch statuses into the verdict of the parent
//! dynamic task, plus the side effects the policy asks for.
//!
//! | Policy               | On first failure                          | Verdict                     |
//! |----------------------|-------------------------------------------|-----------------------------|
//! | `FAIL_FAST`          | suppress planned rows, kill in-flight ones | `FAILURE` immediately       |
//! | `CONTINUE_THEN_FAIL` | nothing                                   | `FAILURE` once all terminal |
//! | `ALL_MUST_SUCCEED`   | suppress planned rows                     | `FAILURE` once none in flight |
//!
//! The verdict only depends on the multiset of row statuses. Row order
//! decides which failure is reported as the trigger and the order of kill
//! requests.

use crate::models::{CompletionPolicy, DynamicTaskRun, LaunchStatus, RunVerdict};

/// Outcome of evaluating a run against its completion policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub verdict: RunVerdict,
    /// Launch gate must not open new slots
    pub suppress_remaining: bool,
    /// Indices of in-flight rows to kill, ascending
    pub kill_requests: Vec<u32>,
    /// Lowest failing index, if any row failed
    pub trigger_index: Option<u32>,
}

pub struct CompletionPolicyEvaluator;

impl CompletionPolicyEvaluator {
    pub fn evaluate(run: &DynamicTaskRun) -> Evaluation {
        let trigger_index = run
            .launches()
            .iter()
            .find(|launch| launch.status.is_failure())
            .map(|launch| launch.index);

        let Some(trigger_index) = trigger_index else {
            let succeeded = run
                .launches()
                .iter()
                .all(|launch| launch.status == LaunchStatus::Success);
            return Evaluation {
                verdict: if succeeded {
                    RunVerdict::Success
                } else {
                    RunVerdict::Running
                },
                suppress_remaining: false,
                kill_requests: Vec::new(),
                trigger_index: None,
            };
        };

        match run.policy() {
            CompletionPolicy::FailFast => Evaluation {
                verdict: RunVerdict::Failure,
                suppress_remaining: true,
                kill_requests: run
                    .launches()
                    .iter()
                    .filter(|launch| launch.status.is_in_flight())
                    .map(|launch| launch.index)
                    .collect(),
                trigger_index: Some(trigger_index),
            },
            CompletionPolicy::ContinueThenFail => Evaluation {
                verdict: if run.all_terminal() {
                    RunVerdict::Failure
                } else {
                    RunVerdict::Running
                },
                suppress_remaining: false,
                kill_requests: Vec::new(),
                trigger_index: Some(trigger_index),
            },
            CompletionPolicy::AllMustSucceed => Evaluation {
                verdict: if run.in_flight_count() == 0 {
                    RunVerdict::Failure
                } else {
                    RunVerdict::Running
                },
                suppress_remaining: true,
                kill_requests: Vec::new(),
                trigger_index: Some(trigger_index),
            },
        }
    }
}
