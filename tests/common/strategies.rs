use proptest::prelude::*;
use tasker_dynamic::models::CompletionPolicy;
use tasker_dynamic::orchestration::SubWorkflowStatus;

pub fn policy_strategy() -> impl Strategy<Value = CompletionPolicy> {
    prop_oneof![
        Just(CompletionPolicy::FailFast),
        Just(CompletionPolicy::ContinueThenFail),
        Just(CompletionPolicy::AllMustSucceed),
    ]
}

/// One simulated run: plan size, parallelism, the terminal status each
/// index will eventually report, and the order in which in-flight
/// sub-workflows finish
#[derive(Debug, Clone)]
pub struct RunScenario {
    pub count: u32,
    pub parallelism: u32,
    pub policy: CompletionPolicy,
    pub outcomes: Vec<SubWorkflowStatus>,
    /// Each pick selects `pick % in_flight.len()` among in-flight rows
    pub picks: Vec<usize>,
    /// Report `running` before the terminal status
    pub report_running: bool,
}

impl RunScenario {
    pub fn outcome(&self, index: u32) -> SubWorkflowStatus {
        self.outcomes[index as usize]
    }
}

pub fn run_scenario_strategy() -> impl Strategy<Value = RunScenario> {
    (1u32..=6, 1u32..=4, policy_strategy(), any::<bool>()).prop_flat_map(
        |(count, parallelism, policy, report_running)| {
            (
                prop::collection::vec(
                    prop_oneof![
                        4 => Just(SubWorkflowStatus::Success),
                        1 => Just(SubWorkflowStatus::Failure),
                    ],
                    count as usize,
                ),
                prop::collection::vec(any::<usize>(), (count * 2) as usize),
            )
                .prop_map(move |(outcomes, picks)| RunScenario {
                    count,
                    parallelism,
                    policy,
                    outcomes,
                    picks,
                    report_running,
                })
        },
    )
}

/// Comma-separated token lists with blanks and padding mixed in
pub fn token_list_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z]{1,3}|\\s*|  [a-z]{1,2} ", 0..6).prop_map(|tokens| tokens.join(","))
}
