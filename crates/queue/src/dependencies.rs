//! Job chaining (spec §4.2): a job with `dependencies` only becomes
//! eligible for pickup once every dependency has completed.

use std::collections::HashMap;

use uuid::Uuid;

use relay_domain::types::JobState;

/// True when every id in `dependencies` maps to a `Completed` job in
/// `states`. A dependency id missing from `states` (not yet observed, or
/// already purged) is treated as not-yet-satisfied rather than panicking.
pub fn dependencies_satisfied(dependencies: &[Uuid], states: &HashMap<Uuid, JobState>) -> bool {
    dependencies.iter().all(|dep| matches!(states.get(dep), Some(JobState::Completed)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_dependencies_is_always_satisfied() {
        assert!(dependencies_satisfied(&[], &HashMap::new()));
    }

    #[test]
    fn missing_dependency_is_unsatisfied() {
        let dep = Uuid::new_v4();
        assert!(!dependencies_satisfied(&[dep], &HashMap::new()));
    }

    #[test]
    fn completed_dependency_satisfies() {
        let dep = Uuid::new_v4();
        let states = HashMap::from([(dep, JobState::Completed)]);
        assert!(dependencies_satisfied(&[dep], &states));
    }

    #[test]
    fn one_incomplete_dependency_blocks_the_whole_set() {
        let done = Uuid::new_v4();
        let pending = Uuid::new_v4();
        let states = HashMap::from([(done, JobState::Completed), (pending, JobState::Active)]);
        assert!(!dependencies_satisfied(&[done, pending], &states));
    }
}
