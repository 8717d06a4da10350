//! The contract every scheduling strategy satisfies.

use crate::schedulable::Schedulable;

/// A scheduling strategy resolves every decision point of one program run.
///
/// The runtime calls exactly one `get_next*` or `force_next*` method per
/// decision point, checks [`has_reached_max_scheduling_steps`] afterwards, and
/// calls [`prepare_for_next_iteration`] once the run is over.
///
/// [`has_reached_max_scheduling_steps`]: SchedulingStrategy::has_reached_max_scheduling_steps
/// [`prepare_for_next_iteration`]: SchedulingStrategy::prepare_for_next_iteration
pub trait SchedulingStrategy {
    /// Pick the entity to run next among the enabled entries of `choices`.
    ///
    /// Returns `None` when nothing is enabled (the caller decides whether that
    /// is a deadlock) or when an exhaustive strategy has no unexplored option
    /// left at this point of the current prefix.
    fn get_next(&mut self, choices: &[Schedulable], current: &Schedulable) -> Option<Schedulable>;

    /// Pick a boolean. `max_value` biases probability-aware strategies towards
    /// `false`: `true` is returned with probability `1 / max_value`.
    fn get_next_boolean(&mut self, max_value: usize) -> Option<bool>;

    /// Pick an integer in `[0, max_value)`.
    fn get_next_integer(&mut self, max_value: usize) -> Option<usize>;

    /// Record that the caller scheduled `next` without consulting the strategy.
    fn force_next(&mut self, next: &Schedulable, choices: &[Schedulable], current: &Schedulable);

    /// Record that the caller resolved a boolean without consulting the strategy.
    fn force_next_boolean(&mut self, max_value: usize, next: bool);

    /// Record that the caller resolved an integer without consulting the strategy.
    fn force_next_integer(&mut self, max_value: usize, next: usize);

    /// Set up the next run. Returns `false` once the configured search space
    /// is exhausted, which ends the outer iteration loop.
    fn prepare_for_next_iteration(&mut self) -> bool;

    /// Drop all accumulated search state.
    fn reset(&mut self);

    /// Decisions made in the current run.
    fn scheduled_steps(&self) -> usize;

    /// Whether the current run hit the step bound (a bound of 0 is unbounded).
    fn has_reached_max_scheduling_steps(&self) -> bool;

    /// Whether every enabled entity is eventually given a turn.
    fn is_fair(&self) -> bool;

    /// Strategy name and parameters, for logs and reports.
    fn description(&self) -> String;
}

/// An owned strategy that can move to a worker thread.
pub type BoxedStrategy = Box<dyn SchedulingStrategy + Send>;

impl<S: SchedulingStrategy + ?Sized> SchedulingStrategy for Box<S> {
    fn get_next(&mut self, choices: &[Schedulable], current: &Schedulable) -> Option<Schedulable> {
        (**self).get_next(choices, current)
    }

    fn get_next_boolean(&mut self, max_value: usize) -> Option<bool> {
        (**self).get_next_boolean(max_value)
    }

    fn get_next_integer(&mut self, max_value: usize) -> Option<usize> {
        (**self).get_next_integer(max_value)
    }

    fn force_next(&mut self, next: &Schedulable, choices: &[Schedulable], current: &Schedulable) {
        (**self).force_next(next, choices, current)
    }

    fn force_next_boolean(&mut self, max_value: usize, next: bool) {
        (**self).force_next_boolean(max_value, next)
    }

    fn force_next_integer(&mut self, max_value: usize, next: usize) {
        (**self).force_next_integer(max_value, next)
    }

    fn prepare_for_next_iteration(&mut self) -> bool {
        (**self).prepare_for_next_iteration()
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn scheduled_steps(&self) -> usize {
        (**self).scheduled_steps()
    }

    fn has_reached_max_scheduling_steps(&self) -> bool {
        (**self).has_reached_max_scheduling_steps()
    }

    fn is_fair(&self) -> bool {
        (**self).is_fair()
    }

    fn description(&self) -> String {
        (**self).description()
    }
}

/// Shared step-bound check: a bound of 0 means unbounded.
#[inline]
pub(crate) fn bound_reached(steps: usize, max_steps: usize) -> bool {
    max_steps != 0 && steps >= max_steps
}
