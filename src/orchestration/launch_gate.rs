use crate::models::{DynamicTaskRun, SubWorkflowLaunch};

/// Parallelism ceiling over a run.
///
/// Stateless: every answer is recomputed from ledger rows, so it stays
/// correct after a restart.
pub struct LaunchGate;

impl LaunchGate {
    /// `max(0, parallelism - in_flight)`, or 0 while suppression is active
    pub fn available_slots(run: &DynamicTaskRun, suppress_remaining: bool) -> usize {
        if suppress_remaining {
            return 0;
        }
        (run.parallelism() as usize).saturating_sub(run.in_flight_count())
    }

    /// Planned rows that may be dispatched now, lowest index first
    pub fn admit(run: &DynamicTaskRun, suppress_remaining: bool) -> Vec<&SubWorkflowLaunch> {
        run.planned()
            .take(Self::available_slots(run, suppress_remaining))
            .collect()
    }

    /// Planned rows a dispatcher may have submitted without recording.
    ///
    /// Dispatch goes lowest index first and never past the bound, so an
    /// unrecorded start can only sit among the rows the gate would admit
    /// with suppression ignored.
    pub fn possibly_submitted(run: &DynamicTaskRun) -> Vec<&SubWorkflowLaunch> {
        Self::admit(run, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompletionPolicy, LaunchStatus, ParameterSet, ResolvedDefinition};
    use std::collections::BTreeMap;

    fn run(parallelism: u32, statuses: &[LaunchStatus]) -> DynamicTaskRun {
        let launches = statuses
            .iter()
            .enumerate()
            .map(|(index, status)| {
                let mut launch = SubWorkflowLaunch::planned(
                    3,
                    &ParameterSet::new(index as u32, BTreeMap::new()),
                    ResolvedDefinition {
                        definition_code: 1,
                        version: 1,
                    },
                );
                launch.status = *status;
                launch
            })
            .collect();
        DynamicTaskRun::new(3, launches, parallelism, CompletionPolicy::ContinueThenFail)
    }

    #[test]
    fn test_slots_subtract_in_flight_rows() {
        use LaunchStatus::*;
        let run = run(3, &[Running, CommandSent, Success, Planned, Planned]);
        assert_eq!(LaunchGate::available_slots(&run, false), 1);

        let admitted: Vec<u32> = LaunchGate::admit(&run, false).iter().map(|l| l.index).collect();
        assert_eq!(admitted, vec![3]);
    }

    #[test]
    fn test_over_subscribed_run_has_no_slots() {
        use LaunchStatus::*;
        let run = run(1, &[Running, Running, Planned]);
        assert_eq!(LaunchGate::available_slots(&run, false), 0);
        assert!(LaunchGate::admit(&run, false).is_empty());
    }

    #[test]
    fn test_suppression_closes_the_gate() {
        let run = run(4, &[LaunchStatus::Planned; 3]);
        assert_eq!(LaunchGate::available_slots(&run, true), 0);
        assert_eq!(LaunchGate::admit(&run, false).len(), 3);
    }

    #[test]
    fn test_possibly_submitted_ignores_suppression() {
        use LaunchStatus::*;
        let run = run(2, &[Failure, Running, Planned, Planned]);
        let indices: Vec<u32> = LaunchGate::possibly_submitted(&run)
            .iter()
            .map(|l| l.index)
            .collect();
        assert_eq!(indices, vec![2]);
        assert!(LaunchGate::admit(&run, true).is_empty());
    }
}
