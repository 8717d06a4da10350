//! Two strategies chained within one run.

use crate::schedulable::Schedulable;
use crate::strategy::{BoxedStrategy, SchedulingStrategy};

/// Serves decisions from `prefix` until it reaches its step bound, then from
/// `suffix` for the rest of the run.
pub struct ComboStrategy {
    prefix: BoxedStrategy,
    suffix: BoxedStrategy,
}

impl ComboStrategy {
    pub fn new(prefix: BoxedStrategy, suffix: BoxedStrategy) -> Self {
        Self { prefix, suffix }
    }

    /// Whether the current run has moved on to the suffix.
    pub fn handed_off(&self) -> bool {
        self.prefix.has_reached_max_scheduling_steps()
    }

    fn active(&mut self) -> &mut BoxedStrategy {
        if self.handed_off() {
            &mut self.suffix
        } else {
            &mut self.prefix
        }
    }
}

impl SchedulingStrategy for ComboStrategy {
    fn get_next(&mut self, choices: &[Schedulable], current: &Schedulable) -> Option<Schedulable> {
        self.active().get_next(choices, current)
    }

    fn get_next_boolean(&mut self, max_value: usize) -> Option<bool> {
        self.active().get_next_boolean(max_value)
    }

    fn get_next_integer(&mut self, max_value: usize) -> Option<usize> {
        self.active().get_next_integer(max_value)
    }

    fn force_next(&mut self, next: &Schedulable, choices: &[Schedulable], current: &Schedulable) {
        self.active().force_next(next, choices, current)
    }

    fn force_next_boolean(&mut self, max_value: usize, next: bool) {
        self.active().force_next_boolean(max_value, next)
    }

    fn force_next_integer(&mut self, max_value: usize, next: usize) {
        self.active().force_next_integer(max_value, next)
    }

    fn prepare_for_next_iteration(&mut self) -> bool {
        // Both children must be prepared every time.
        let prefix_more = self.prefix.prepare_for_next_iteration();
        let suffix_more = self.suffix.prepare_for_next_iteration();
        prefix_more || suffix_more
    }

    fn reset(&mut self) {
        self.prefix.reset();
        self.suffix.reset();
    }

    fn scheduled_steps(&self) -> usize {
        if self.handed_off() {
            self.prefix.scheduled_steps() + self.suffix.scheduled_steps()
        } else {
            self.prefix.scheduled_steps()
        }
    }

    fn has_reached_max_scheduling_steps(&self) -> bool {
        self.handed_off() && self.suffix.has_reached_max_scheduling_steps()
    }

    fn is_fair(&self) -> bool {
        self.suffix.is_fair()
    }

    fn description(&self) -> String {
        format!(
            "Combo[{}, {}]",
            self.prefix.description(),
            self.suffix.description()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dfs::DfsStrategy;
    use crate::random::RandomStrategy;
    use crate::schedulable::OperationKind;

    #[test]
    fn test_steps_summed_after_handoff() {
        let choices: Vec<_> = (0..2).map(|i| Schedulable::new(i, OperationKind::Send)).collect();
        let mut combo = ComboStrategy::new(
            Box::new(DfsStrategy::new(2)),
            Box::new(RandomStrategy::new(0, 1)),
        );
        combo.get_next(&choices, &choices[0]);
        assert_eq!(combo.scheduled_steps(), 1);
        combo.get_next(&choices, &choices[0]);
        assert!(combo.handed_off());
        combo.get_next(&choices, &choices[0]);
        combo.get_next(&choices, &choices[0]);
        assert_eq!(combo.scheduled_steps(), 4);
        assert!(!combo.has_reached_max_scheduling_steps());
        assert!(combo.is_fair());
    }

    #[test]
    fn test_prepare_continues_while_suffix_continues() {
        let choices = vec![Schedulable::new(0, OperationKind::Send)];
        let mut combo = ComboStrategy::new(
            Box::new(DfsStrategy::new(1)),
            Box::new(RandomStrategy::new(0, 1)),
        );
        combo.get_next(&choices, &choices[0]);
        // The prefix DFS has a single schedule and is exhausted; random never is.
        assert!(combo.prepare_for_next_iteration());
        assert_eq!(combo.description(), "Combo[DFS, Random[seed '1']]");
    }
}
