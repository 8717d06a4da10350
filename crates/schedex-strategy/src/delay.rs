//! Randomized delay bounding: run-to-completion scheduling perturbed by a
//! bounded number of delays per run.

use crate::random::uniform_integer;
use crate::schedulable::Schedulable;
use crate::strategy::{bound_reached, SchedulingStrategy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;
use std::collections::VecDeque;
use tracing::trace;

/// Keeps running the current entity unless a delay is scheduled at this
/// step, in which case the next enabled entity in round-robin order runs.
#[derive(Debug, Clone)]
pub struct RandomDelayBoundingStrategy {
    rng: StdRng,
    seed: u64,
    max_steps: usize,
    scheduled_steps: usize,
    schedule_length: usize,
    max_delays: usize,
    remaining_delays: VecDeque<usize>,
}

impl RandomDelayBoundingStrategy {
    pub fn new(max_steps: usize, max_delays: usize, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
            max_steps,
            scheduled_steps: 0,
            schedule_length: 0,
            max_delays,
            remaining_delays: VecDeque::new(),
        }
    }

    /// Delay points still pending in this run, in ascending order.
    pub fn remaining_delays(&self) -> impl Iterator<Item = usize> + '_ {
        self.remaining_delays.iter().copied()
    }

    fn consume_delay(&mut self) -> bool {
        if self.remaining_delays.front() == Some(&self.scheduled_steps) {
            self.remaining_delays.pop_front();
            trace!(remaining = self.remaining_delays.len(), "inserted delay");
            true
        } else {
            false
        }
    }
}

impl SchedulingStrategy for RandomDelayBoundingStrategy {
    fn get_next(&mut self, choices: &[Schedulable], current: &Schedulable) -> Option<Schedulable> {
        // Round-robin order starting at the current entity.
        let start = choices.iter().position(|c| c.id == current.id).unwrap_or(0);
        let ordered: SmallVec<[&Schedulable; 8]> = choices[start..]
            .iter()
            .chain(&choices[..start])
            .filter(|c| c.enabled)
            .collect();
        if ordered.is_empty() {
            return None;
        }

        let mut idx = 0;
        while self.consume_delay() {
            idx = (idx + 1) % ordered.len();
        }

        self.scheduled_steps += 1;
        Some(*ordered[idx])
    }

    fn get_next_boolean(&mut self, _max_value: usize) -> Option<bool> {
        let next = self.consume_delay();
        self.scheduled_steps += 1;
        Some(next)
    }

    fn get_next_integer(&mut self, max_value: usize) -> Option<usize> {
        let value = uniform_integer(&mut self.rng, max_value)?;
        self.scheduled_steps += 1;
        Some(value)
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
        self.schedule_length = self.schedule_length.max(self.scheduled_steps);
        self.scheduled_steps = 0;

        self.remaining_delays.clear();
        if self.schedule_length > 0 {
            let mut delays: Vec<usize> = (0..self.max_delays)
                .map(|_| self.rng.gen_range(0..self.schedule_length))
                .collect();
            delays.sort_unstable();
            self.remaining_delays.extend(delays);
        }
        true
    }

    fn reset(&mut self) {
        self.schedule_length = 0;
        self.scheduled_steps = 0;
        self.remaining_delays.clear();
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
        format!(
            "RandomDelayBounding[max delays '{}', seed '{}']",
            self.max_delays, self.seed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedulable::OperationKind;

    #[test]
    fn test_run_to_completion_without_delays() {
        let choices: Vec<_> = (0..3).map(|i| Schedulable::new(i, OperationKind::Send)).collect();
        let mut strategy = RandomDelayBoundingStrategy::new(0, 0, 1);
        for _ in 0..5 {
            assert_eq!(strategy.get_next(&choices, &choices[1]).unwrap().id.as_u64(), 1);
        }
        assert!(strategy.prepare_for_next_iteration());
        assert_eq!(strategy.remaining_delays().count(), 0);
    }

    #[test]
    fn test_delays_drawn_below_schedule_length() {
        let choices: Vec<_> = (0..2).map(|i| Schedulable::new(i, OperationKind::Send)).collect();
        let mut strategy = RandomDelayBoundingStrategy::new(0, 4, 3);
        for _ in 0..6 {
            strategy.get_next(&choices, &choices[0]);
        }
        strategy.prepare_for_next_iteration();
        let delays: Vec<_> = strategy.remaining_delays().collect();
        assert_eq!(delays.len(), 4);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|&d| d < 6));
    }

    #[test]
    fn test_delay_skips_current() {
        let choices: Vec<_> = (0..3).map(|i| Schedulable::new(i, OperationKind::Send)).collect();
        let mut strategy = RandomDelayBoundingStrategy::new(0, 1, 0);
        strategy.get_next(&choices, &choices[0]);
        strategy.prepare_for_next_iteration();
        // Schedule length 1: the single delay lands on step 0.
        let next = strategy.get_next(&choices, &choices[2]).unwrap();
        assert_eq!(next.id.as_u64(), 0);
    }
}
