//! Uniform random scheduling.

use crate::schedulable::{enabled_of, Schedulable};
use crate::strategy::{bound_reached, SchedulingStrategy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;

/// Picks uniformly among the enabled entities at every decision point.
#[derive(Debug, Clone)]
pub struct RandomStrategy {
    rng: StdRng,
    seed: u64,
    max_steps: usize,
    scheduled_steps: usize,
}

impl RandomStrategy {
    pub fn new(max_steps: usize, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
            max_steps,
            scheduled_steps: 0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

/// `true` with probability `1 / max_value`; a bound of 0 or 1 always yields `true`.
pub(crate) fn biased_coin(rng: &mut StdRng, max_value: usize) -> bool {
    max_value <= 1 || rng.gen_range(0..max_value) == 0
}

pub(crate) fn uniform_integer(rng: &mut StdRng, max_value: usize) -> Option<usize> {
    (max_value > 0).then(|| rng.gen_range(0..max_value))
}

impl SchedulingStrategy for RandomStrategy {
    fn get_next(&mut self, choices: &[Schedulable], _current: &Schedulable) -> Option<Schedulable> {
        let enabled: SmallVec<[&Schedulable; 8]> = enabled_of(choices).collect();
        if enabled.is_empty() {
            return None;
        }
        let idx = self.rng.gen_range(0..enabled.len());
        self.scheduled_steps += 1;
        Some(*enabled[idx])
    }

    fn get_next_boolean(&mut self, max_value: usize) -> Option<bool> {
        self.scheduled_steps += 1;
        Some(biased_coin(&mut self.rng, max_value))
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
        self.scheduled_steps = 0;
        true
    }

    fn reset(&mut self) {
        self.scheduled_steps = 0;
    }

    fn scheduled_steps(&self) -> usize {
        self.scheduled_steps
    }

    fn has_reached_max_scheduling_steps(&self) -> bool {
        bound_reached(self.scheduled_steps, self.max_steps)
    }

    fn is_fair(&self) -> bool {
        true
    }

    fn description(&self) -> String {
        format!("Random[seed '{}']", self.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedulable::OperationKind;

    #[test]
    fn test_only_enabled_returned() {
        let choices = vec![
            Schedulable::blocked(0, OperationKind::Receive),
            Schedulable::new(1, OperationKind::Send),
            Schedulable::finished(2),
        ];
        let mut strategy = RandomStrategy::new(0, 42);
        for _ in 0..100 {
            let next = strategy.get_next(&choices, &choices[1]).unwrap();
            assert_eq!(next.id.as_u64(), 1);
        }
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let choices: Vec<_> = (0..5).map(|i| Schedulable::new(i, OperationKind::Send)).collect();
        let mut a = RandomStrategy::new(0, 7);
        let mut b = RandomStrategy::new(0, 7);
        for _ in 0..200 {
            assert_eq!(
                a.get_next(&choices, &choices[0]),
                b.get_next(&choices, &choices[0])
            );
            assert_eq!(a.get_next_integer(10), b.get_next_integer(10));
            assert_eq!(a.get_next_boolean(3), b.get_next_boolean(3));
        }
    }

    #[test]
    fn test_integer_range() {
        let mut strategy = RandomStrategy::new(0, 1);
        for _ in 0..500 {
            assert!(strategy.get_next_integer(4).unwrap() < 4);
        }
        assert_eq!(strategy.get_next_integer(0), None);
    }

    #[test]
    fn test_degenerate_coin() {
        let mut strategy = RandomStrategy::new(0, 3);
        assert_eq!(strategy.get_next_boolean(0), Some(true));
        assert_eq!(strategy.get_next_boolean(1), Some(true));
    }

    #[test]
    fn test_never_exhausts() {
        let mut strategy = RandomStrategy::new(2, 0);
        strategy.get_next_boolean(2);
        strategy.get_next_boolean(2);
        assert!(strategy.has_reached_max_scheduling_steps());
        assert!(strategy.prepare_for_next_iteration());
        assert_eq!(strategy.scheduled_steps(), 0);
        assert!(strategy.is_fair());
    }
}
