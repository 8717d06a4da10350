//! Exhaustive depth-first search over scheduling and nondeterministic choices.
//!
//! The search state is two companion choice stacks, one for scheduling
//! decisions and one for boolean/integer decisions. Every level records the
//! ordinal of the decision it belongs to within a run, so the two stacks
//! interleave into a single path ordered by ordinal. Successive runs replay
//! the recorded path and advance its deepest decision that still has an
//! unexplored option, so every combination is visited exactly once even when
//! earlier values decide which kind of decision comes next.
//!
//! Each level remembers the index of the option taken in the current run.
//! Picking decision `k` rotates decision `k - 1`'s current option back to
//! unexplored; retracting an exhausted tail level marks its predecessor's
//! current option as explored. Those two moves are the whole backtracking
//! discipline, and both assert their preconditions.

use crate::schedulable::{enabled_of, NondetValue, Schedulable, SchedulableId};
use crate::strategy::{bound_reached, SchedulingStrategy};
use smallvec::SmallVec;
use std::fmt;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy)]
struct Choice<T> {
    value: T,
    explored: bool,
}

/// One decision point: its ordinal in the run, its options in
/// materialization order, and the option taken in the current run.
#[derive(Debug, Clone)]
struct ChoiceLevel<T> {
    ordinal: usize,
    choices: SmallVec<[Choice<T>; 4]>,
    current: Option<usize>,
}

impl<T: Copy + fmt::Debug> ChoiceLevel<T> {
    fn new(ordinal: usize, values: impl IntoIterator<Item = T>) -> Self {
        Self {
            ordinal,
            choices: values
                .into_iter()
                .map(|value| Choice {
                    value,
                    explored: false,
                })
                .collect(),
            current: None,
        }
    }

    fn all_explored(&self) -> bool {
        self.choices.iter().all(|c| c.explored)
    }

    /// The option to take: the current one when replaying a prefix, the
    /// first unexplored one otherwise.
    fn position(&self, allowed: &impl Fn(&T) -> bool) -> Option<usize> {
        self.current
            .filter(|&idx| !self.choices[idx].explored && allowed(&self.choices[idx].value))
            .or_else(|| {
                self.choices
                    .iter()
                    .position(|c| !c.explored && allowed(&c.value))
            })
    }

    fn select(&mut self, idx: usize) -> T {
        self.choices[idx].explored = true;
        self.current = Some(idx);
        self.choices[idx].value
    }

    /// A deeper level was just picked: the current option is replayed again
    /// until the deeper levels are exhausted.
    fn rotate_off(&mut self) {
        let idx = self
            .current
            .unwrap_or_else(|| panic!("dfs invariant violated: rotating a level with no current choice: {:?}", self));
        assert!(
            self.choices[idx].explored,
            "dfs invariant violated: current choice {:?} already unexplored",
            self.choices[idx].value
        );
        self.choices[idx].explored = false;
    }

    /// Every deeper level under the current option has been exhausted.
    fn complete_current(&mut self) {
        let idx = self
            .current
            .unwrap_or_else(|| panic!("dfs invariant violated: completing a level with no current choice: {:?}", self));
        assert!(
            !self.choices[idx].explored,
            "dfs invariant violated: current choice {:?} completed twice",
            self.choices[idx].value
        );
        self.choices[idx].explored = true;
    }
}

/// A stack of choice levels plus the read cursor of the current run.
#[derive(Debug, Clone)]
struct ChoiceStack<T> {
    levels: Vec<ChoiceLevel<T>>,
    cursor: usize,
}

impl<T: Copy + fmt::Debug> ChoiceStack<T> {
    fn new() -> Self {
        Self {
            levels: Vec::new(),
            cursor: 0,
        }
    }

    /// Option index to take for decision `ordinal`. A `fresh` decision lies
    /// past the recorded path and gets a new level. `None` when the recorded
    /// level at the cursor belongs to another decision or has nothing left.
    fn position(
        &mut self,
        ordinal: usize,
        fresh: bool,
        materialize: impl FnOnce() -> SmallVec<[T; 8]>,
        allowed: impl Fn(&T) -> bool,
    ) -> Option<usize> {
        if fresh {
            assert_eq!(
                self.cursor,
                self.levels.len(),
                "dfs invariant violated: fresh decision {ordinal} with unread levels"
            );
            self.levels.push(ChoiceLevel::new(ordinal, materialize()));
        }
        self.levels
            .get(self.cursor)
            .filter(|level| level.ordinal == ordinal)?
            .position(&allowed)
    }

    fn select(&mut self, idx: usize) -> T {
        let value = self.levels[self.cursor].select(idx);
        self.cursor += 1;
        value
    }

    /// Ordinal of the level picked last in the current run.
    fn last_picked(&self) -> Option<usize> {
        self.cursor.checked_sub(1).map(|idx| self.levels[idx].ordinal)
    }

    fn rotate_last_picked(&mut self) {
        self.levels[self.cursor - 1].rotate_off();
    }

    fn tail_ordinal(&self) -> Option<usize> {
        self.levels.last().map(|level| level.ordinal)
    }

    /// Drop levels the last run did not pick at: they were abandoned (early
    /// stop, or no unexplored option was available) and cannot be replayed.
    fn truncate_to_cursor(&mut self) {
        self.levels.truncate(self.cursor);
    }

    /// Pop the tail level if it has no unexplored option left.
    fn pop_if_explored(&mut self) -> bool {
        if self.levels.last().is_some_and(ChoiceLevel::all_explored) {
            self.levels.pop();
            true
        } else {
            false
        }
    }

    fn complete_tail(&mut self) {
        if let Some(tail) = self.levels.last_mut() {
            tail.complete_current();
        }
    }

    fn rewind(&mut self) {
        self.cursor = 0;
    }

    fn clear(&mut self) {
        self.levels.clear();
        self.cursor = 0;
    }

    fn depth(&self) -> usize {
        self.levels.len()
    }

    fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StackKind {
    Schedule,
    Nondet,
}

/// Exhaustive depth-first search strategy.
#[derive(Debug, Clone)]
pub struct DfsStrategy {
    max_steps: usize,
    scheduled_steps: usize,
    /// Decisions resolved so far in the current run.
    decisions: usize,
    schedule_stack: ChoiceStack<SchedulableId>,
    nondet_stack: ChoiceStack<NondetValue>,
}

impl DfsStrategy {
    /// Create a DFS strategy; `max_steps == 0` leaves runs unbounded.
    pub fn new(max_steps: usize) -> Self {
        Self {
            max_steps,
            scheduled_steps: 0,
            decisions: 0,
            schedule_stack: ChoiceStack::new(),
            nondet_stack: ChoiceStack::new(),
        }
    }

    /// Number of recorded scheduling levels.
    pub fn schedule_depth(&self) -> usize {
        self.schedule_stack.depth()
    }

    /// Number of recorded nondeterministic levels.
    pub fn nondet_depth(&self) -> usize {
        self.nondet_stack.depth()
    }

    /// Whether the current run has left the recorded path.
    fn at_frontier(&self) -> bool {
        self.decisions == self.schedule_stack.depth() + self.nondet_stack.depth()
    }

    /// Rotate the level of the decision just before the one being picked.
    fn rotate_predecessor(&mut self) {
        let Some(previous) = self.decisions.checked_sub(1) else {
            return;
        };
        if self.schedule_stack.last_picked() == Some(previous) {
            self.schedule_stack.rotate_last_picked();
        } else if self.nondet_stack.last_picked() == Some(previous) {
            self.nondet_stack.rotate_last_picked();
        } else {
            panic!("dfs invariant violated: no level holds decision {previous}");
        }
    }

    fn tail_kind(&self) -> Option<StackKind> {
        match (self.schedule_stack.tail_ordinal(), self.nondet_stack.tail_ordinal()) {
            (None, None) => None,
            (Some(_), None) => Some(StackKind::Schedule),
            (None, Some(_)) => Some(StackKind::Nondet),
            (Some(s), Some(n)) if s > n => Some(StackKind::Schedule),
            (Some(_), Some(_)) => Some(StackKind::Nondet),
        }
    }

    /// Pop fully explored tail levels in decision order, completing each
    /// predecessor's choice, whichever stack it lives on.
    fn retract(&mut self) {
        while let Some(kind) = self.tail_kind() {
            let popped = match kind {
                StackKind::Schedule => self.schedule_stack.pop_if_explored(),
                StackKind::Nondet => self.nondet_stack.pop_if_explored(),
            };
            if !popped {
                break;
            }
            match self.tail_kind() {
                Some(StackKind::Schedule) => self.schedule_stack.complete_tail(),
                Some(StackKind::Nondet) => self.nondet_stack.complete_tail(),
                None => {}
            }
        }
    }

    fn pick_nondet(
        &mut self,
        materialize: impl FnOnce() -> SmallVec<[NondetValue; 8]>,
        allowed: impl Fn(&NondetValue) -> bool,
    ) -> Option<NondetValue> {
        let fresh = self.at_frontier();
        let pos = self
            .nondet_stack
            .position(self.decisions, fresh, materialize, allowed)?;
        self.rotate_predecessor();
        let value = self.nondet_stack.select(pos);
        self.decisions += 1;
        self.scheduled_steps += 1;
        Some(value)
    }
}

impl SchedulingStrategy for DfsStrategy {
    fn get_next(&mut self, choices: &[Schedulable], _current: &Schedulable) -> Option<Schedulable> {
        let enabled: SmallVec<[SchedulableId; 8]> = enabled_of(choices).map(|c| c.id).collect();
        if enabled.is_empty() {
            return None;
        }

        let fresh = self.at_frontier();
        let pos = self
            .schedule_stack
            .position(self.decisions, fresh, || enabled.iter().copied().collect(), |id| enabled.contains(id))?;
        self.rotate_predecessor();
        let id = self.schedule_stack.select(pos);
        self.decisions += 1;
        self.scheduled_steps += 1;
        choices.iter().find(|c| c.id == id).copied()
    }

    fn get_next_boolean(&mut self, _max_value: usize) -> Option<bool> {
        let value = self.pick_nondet(
            || [NondetValue::Boolean(false), NondetValue::Boolean(true)].into_iter().collect(),
            |v| matches!(v, NondetValue::Boolean(_)),
        )?;
        match value {
            NondetValue::Boolean(b) => Some(b),
            NondetValue::Integer(_) => unreachable!("boolean level yielded an integer"),
        }
    }

    fn get_next_integer(&mut self, max_value: usize) -> Option<usize> {
        if max_value == 0 {
            return None;
        }
        let value = self.pick_nondet(
            || (0..max_value).map(NondetValue::Integer).collect(),
            |v| matches!(v, NondetValue::Integer(n) if *n < max_value),
        )?;
        match value {
            NondetValue::Integer(n) => Some(n),
            NondetValue::Boolean(_) => unreachable!("integer level yielded a boolean"),
        }
    }

    fn force_next(&mut self, _next: &Schedulable, _choices: &[Schedulable], _current: &Schedulable) {
        self.scheduled_steps += 1;
    }

    fn force_next_boolean(&mut self, _max_value: usize, _next: bool) {
        self.scheduled_steps += 1;
    }

    fn force_next_integer(&mut self, _max_value: usize, _next: usize) {
        self.scheduled_steps += 1;
    }

    fn prepare_for_next_iteration(&mut self) -> bool {
        self.scheduled_steps = 0;
        self.decisions = 0;

        self.schedule_stack.truncate_to_cursor();
        self.nondet_stack.truncate_to_cursor();
        self.retract();

        self.schedule_stack.rewind();
        self.nondet_stack.rewind();

        trace!(
            schedule_depth = self.schedule_stack.depth(),
            nondet_depth = self.nondet_stack.depth(),
            "dfs stacks after retraction"
        );

        let more = !(self.schedule_stack.is_empty() && self.nondet_stack.is_empty());
        if !more {
            debug!("dfs search space exhausted");
        }
        more
    }

    fn reset(&mut self) {
        self.schedule_stack.clear();
        self.nondet_stack.clear();
        self.scheduled_steps = 0;
        self.decisions = 0;
    }

    fn scheduled_steps(&self) -> usize {
        self.scheduled_steps
    }

    fn has_reached_max_scheduling_steps(&self) -> bool {
        bound_reached(self.scheduled_steps, self.max_steps)
    }

    fn is_fair(&self) -> bool {
        false
    }

    fn description(&self) -> String {
        "DFS".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedulable::OperationKind;
    use std::collections::HashSet;

    fn entities(n: u64) -> Vec<Schedulable> {
        (0..n).map(|i| Schedulable::new(i, OperationKind::Send)).collect()
    }

    /// Run `decisions` scheduling decisions per iteration until exhaustion.
    fn explore_schedules(n: u64, decisions: usize) -> Vec<Vec<u64>> {
        let choices = entities(n);
        let mut dfs = DfsStrategy::new(0);
        let mut runs = Vec::new();
        loop {
            let mut run = Vec::new();
            for _ in 0..decisions {
                match dfs.get_next(&choices, &choices[0]) {
                    Some(s) => run.push(s.id.as_u64()),
                    None => break,
                }
            }
            runs.push(run);
            if !dfs.prepare_for_next_iteration() {
                break;
            }
        }
        runs
    }

    #[test]
    fn test_two_entities_two_decisions() {
        let runs = explore_schedules(2, 2);
        assert_eq!(runs, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);
    }

    #[test]
    fn test_three_entities_three_decisions_unique() {
        let runs = explore_schedules(3, 3);
        assert_eq!(runs.len(), 27);
        let unique: HashSet<_> = runs.iter().cloned().collect();
        assert_eq!(unique.len(), 27);
    }

    #[test]
    fn test_booleans_exhaustive() {
        let mut dfs = DfsStrategy::new(0);
        let mut runs = Vec::new();
        loop {
            let a = dfs.get_next_boolean(2).unwrap();
            let b = dfs.get_next_boolean(2).unwrap();
            runs.push((a, b));
            if !dfs.prepare_for_next_iteration() {
                break;
            }
        }
        assert_eq!(
            runs,
            vec![(false, false), (false, true), (true, false), (true, true)]
        );
    }

    #[test]
    fn test_schedule_then_boolean_product() {
        let choices = entities(2);
        let mut dfs = DfsStrategy::new(0);
        let mut runs = Vec::new();
        loop {
            let s = dfs.get_next(&choices, &choices[0]).unwrap().id.as_u64();
            let b = dfs.get_next_boolean(2).unwrap();
            runs.push((s, b));
            if !dfs.prepare_for_next_iteration() {
                break;
            }
        }
        assert_eq!(runs, vec![(0, false), (0, true), (1, false), (1, true)]);
    }

    #[test]
    fn test_boolean_and_integer_share_stack() {
        let mut dfs = DfsStrategy::new(0);
        let mut runs = HashSet::new();
        let mut iterations = 0;
        loop {
            let b = dfs.get_next_boolean(2).unwrap();
            let n = dfs.get_next_integer(3).unwrap();
            assert!(runs.insert((b, n)), "duplicate run ({b}, {n})");
            iterations += 1;
            if !dfs.prepare_for_next_iteration() {
                break;
            }
        }
        assert_eq!(iterations, 6);
    }

    #[test]
    fn test_value_dependent_decisions_terminate() {
        // integer(3), then a boolean; `false` leads to an integer(2), `true`
        // to a scheduling decision over three entities.
        let choices = entities(3);
        let mut dfs = DfsStrategy::new(0);
        let mut runs = HashSet::new();
        loop {
            let n = dfs.get_next_integer(3).unwrap();
            let b = dfs.get_next_boolean(2).unwrap();
            let last = if b {
                dfs.get_next(&choices, &choices[0]).unwrap().id.as_u64() as usize
            } else {
                dfs.get_next_integer(2).unwrap()
            };
            assert!(runs.insert((n, b, last)), "duplicate run ({n}, {b}, {last})");
            assert!(runs.len() <= 15, "search does not terminate");
            if !dfs.prepare_for_next_iteration() {
                break;
            }
        }
        assert_eq!(runs.len(), 15);
        assert_eq!(dfs.schedule_depth(), 0);
        assert_eq!(dfs.nondet_depth(), 0);
    }

    #[test]
    fn test_mismatched_replay_stops_run() {
        let choices = entities(2);
        let mut dfs = DfsStrategy::new(0);
        dfs.get_next(&choices, &choices[0]);
        dfs.get_next(&choices, &choices[0]);
        assert!(dfs.prepare_for_next_iteration());

        // The recorded second decision was a scheduling one.
        assert_eq!(dfs.get_next(&choices, &choices[0]).unwrap().id.as_u64(), 0);
        assert_eq!(dfs.get_next_boolean(2), None);
        assert!(dfs.prepare_for_next_iteration());
        assert_eq!(dfs.schedule_depth(), 1);
        assert_eq!(dfs.get_next(&choices, &choices[0]).unwrap().id.as_u64(), 1);
    }

    #[test]
    fn test_no_enabled_choice() {
        let mut dfs = DfsStrategy::new(0);
        let choices = vec![Schedulable::blocked(0, OperationKind::Receive)];
        assert!(dfs.get_next(&choices, &choices[0]).is_none());
        assert_eq!(dfs.scheduled_steps(), 0);
        assert!(!dfs.prepare_for_next_iteration());
    }

    #[test]
    fn test_zero_range_integer() {
        let mut dfs = DfsStrategy::new(0);
        assert_eq!(dfs.get_next_integer(0), None);
        assert_eq!(dfs.nondet_depth(), 0);
    }

    #[test]
    fn test_max_steps_bound() {
        let choices = entities(2);
        let mut dfs = DfsStrategy::new(2);
        dfs.get_next(&choices, &choices[0]);
        assert!(!dfs.has_reached_max_scheduling_steps());
        dfs.get_next_boolean(2);
        assert!(dfs.has_reached_max_scheduling_steps());
    }

    #[test]
    fn test_early_stop_abandons_unreached_levels() {
        let choices = entities(2);
        let mut dfs = DfsStrategy::new(0);

        // Run 1 goes two levels deep.
        dfs.get_next(&choices, &choices[0]);
        dfs.get_next(&choices, &choices[0]);
        assert!(dfs.prepare_for_next_iteration());
        assert_eq!(dfs.schedule_depth(), 2);

        // Run 2 stops after the first decision (e.g. a bug was found there).
        dfs.get_next(&choices, &choices[0]);
        assert!(dfs.prepare_for_next_iteration());
        assert_eq!(dfs.schedule_depth(), 1);

        // The first level moves on to entity 1.
        let next = dfs.get_next(&choices, &choices[0]).unwrap();
        assert_eq!(next.id.as_u64(), 1);
    }

    #[test]
    fn test_disabled_replay_choice_is_skipped() {
        let mut dfs = DfsStrategy::new(0);
        let both = entities(2);
        dfs.get_next(&both, &both[0]);
        assert!(dfs.prepare_for_next_iteration());

        // Entity 1 is now the only one enabled; the level still has it unexplored.
        let only_one = vec![Schedulable::finished(0), both[1]];
        let next = dfs.get_next(&only_one, &only_one[1]).unwrap();
        assert_eq!(next.id.as_u64(), 1);
        assert!(!dfs.prepare_for_next_iteration());
    }

    #[test]
    fn test_reset_restarts_search() {
        let choices = entities(2);
        let mut dfs = DfsStrategy::new(0);
        dfs.get_next(&choices, &choices[0]);
        assert!(dfs.prepare_for_next_iteration());
        dfs.reset();
        assert_eq!(dfs.schedule_depth(), 0);
        let next = dfs.get_next(&choices, &choices[0]).unwrap();
        assert_eq!(next.id.as_u64(), 0);
    }

    #[test]
    #[should_panic(expected = "dfs invariant violated")]
    fn test_rotating_without_current_panics() {
        let mut level = ChoiceLevel::new(0, [1u8, 2]);
        level.rotate_off();
    }
}
