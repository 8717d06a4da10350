//! Iterative deepening on top of exhaustive DFS.

use crate::config::ConfigError;
use crate::dfs::DfsStrategy;
use crate::schedulable::Schedulable;
use crate::strategy::SchedulingStrategy;
use tracing::{debug, info};

/// Exhausts every schedule of depth `d` before moving to depth `d + 1`.
///
/// The inner DFS is unbounded; the depth bound is enforced here through
/// [`has_reached_max_scheduling_steps`](SchedulingStrategy::has_reached_max_scheduling_steps).
/// If no run at the current depth reached the bound, deeper runs cannot
/// exist and the search ends early.
#[derive(Debug, Clone)]
pub struct IterativeDeepeningDfsStrategy {
    dfs: DfsStrategy,
    max_depth: usize,
    current_depth: usize,
    depth_bound_hit: bool,
}

impl IterativeDeepeningDfsStrategy {
    pub fn new(max_depth: usize) -> Result<Self, ConfigError> {
        if max_depth == 0 {
            return Err(ConfigError::ZeroMaxDepth);
        }
        Ok(Self {
            dfs: DfsStrategy::new(0),
            max_depth,
            current_depth: 1,
            depth_bound_hit: false,
        })
    }

    pub fn current_depth(&self) -> usize {
        self.current_depth
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn note_bound(&mut self) {
        if self.has_reached_max_scheduling_steps() {
            self.depth_bound_hit = true;
        }
    }
}

impl SchedulingStrategy for IterativeDeepeningDfsStrategy {
    fn get_next(&mut self, choices: &[Schedulable], current: &Schedulable) -> Option<Schedulable> {
        let next = self.dfs.get_next(choices, current);
        self.note_bound();
        next
    }

    fn get_next_boolean(&mut self, max_value: usize) -> Option<bool> {
        let next = self.dfs.get_next_boolean(max_value);
        self.note_bound();
        next
    }

    fn get_next_integer(&mut self, max_value: usize) -> Option<usize> {
        let next = self.dfs.get_next_integer(max_value);
        self.note_bound();
        next
    }

    fn force_next(&mut self, next: &Schedulable, choices: &[Schedulable], current: &Schedulable) {
        self.dfs.force_next(next, choices, current);
        self.note_bound();
    }

    fn force_next_boolean(&mut self, max_value: usize, next: bool) {
        self.dfs.force_next_boolean(max_value, next);
        self.note_bound();
    }

    fn force_next_integer(&mut self, max_value: usize, next: usize) {
        self.dfs.force_next_integer(max_value, next);
        self.note_bound();
    }

    fn prepare_for_next_iteration(&mut self) -> bool {
        if self.dfs.prepare_for_next_iteration() {
            return true;
        }

        if !self.depth_bound_hit {
            debug!(depth = self.current_depth, "no run reached the depth bound; search complete");
            return false;
        }

        self.dfs.reset();
        self.current_depth += 1;
        self.depth_bound_hit = false;

        if self.current_depth > self.max_depth {
            return false;
        }
        info!(depth = self.current_depth, "increasing depth");
        true
    }

    fn reset(&mut self) {
        self.dfs.reset();
        self.current_depth = 1;
        self.depth_bound_hit = false;
    }

    fn scheduled_steps(&self) -> usize {
        self.dfs.scheduled_steps()
    }

    fn has_reached_max_scheduling_steps(&self) -> bool {
        self.dfs.scheduled_steps() >= self.current_depth
    }

    fn is_fair(&self) -> bool {
        false
    }

    fn description(&self) -> String {
        format!(
            "DFS with iterative deepening[depth '{}' of '{}']",
            self.current_depth, self.max_depth
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedulable::OperationKind;

    /// Drive runs that stop at the depth bound or after `program_len` decisions.
    fn runs_per_depth(entities: u64, program_len: usize, max_depth: usize) -> Vec<(usize, usize)> {
        let choices: Vec<_> = (0..entities)
            .map(|i| Schedulable::new(i, OperationKind::Send))
            .collect();
        let mut strategy = IterativeDeepeningDfsStrategy::new(max_depth).unwrap();
        let mut counts: Vec<(usize, usize)> = Vec::new();
        loop {
            let depth = strategy.current_depth();
            for _ in 0..program_len {
                if strategy.get_next(&choices, &choices[0]).is_none()
                    || strategy.has_reached_max_scheduling_steps()
                {
                    break;
                }
            }
            match counts.last_mut() {
                Some((d, n)) if *d == depth => *n += 1,
                _ => counts.push((depth, 1)),
            }
            if !strategy.prepare_for_next_iteration() {
                break;
            }
        }
        counts
    }

    #[test]
    fn test_zero_depth_rejected() {
        assert!(matches!(
            IterativeDeepeningDfsStrategy::new(0),
            Err(ConfigError::ZeroMaxDepth)
        ));
    }

    #[test]
    fn test_depths_grow_strictly() {
        let counts = runs_per_depth(2, 10, 3);
        assert_eq!(counts, vec![(1, 2), (2, 4), (3, 8)]);
    }

    #[test]
    fn test_stops_when_program_shallower_than_bound() {
        let counts = runs_per_depth(2, 2, 5);
        // Depth 3 is tried once over all 4 schedules, none of which reaches it.
        assert_eq!(counts, vec![(1, 2), (2, 4), (3, 4)]);
    }

    #[test]
    fn test_reset_restores_depth_one() {
        let mut strategy = IterativeDeepeningDfsStrategy::new(4).unwrap();
        let choices = vec![Schedulable::new(0, OperationKind::Send)];
        strategy.get_next(&choices, &choices[0]);
        assert!(strategy.prepare_for_next_iteration());
        assert_eq!(strategy.current_depth(), 2);
        strategy.reset();
        assert_eq!(strategy.current_depth(), 1);
    }
}
