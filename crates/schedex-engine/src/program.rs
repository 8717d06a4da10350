//! The contract between the engine and a program under test.

use schedex_state::ProgramState;
use schedex_strategy::{Schedulable, SchedulableId};
use thiserror::Error;

/// A failed assertion inside the program under test.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SafetyViolation(pub String);

impl SafetyViolation {
    pub fn new(message: impl Into<String>) -> Self {
        SafetyViolation(message.into())
    }
}

/// How a program asks for nondeterministic values while it is being stepped.
///
/// If the strategy cannot supply a value (an exhausted search prefix), the
/// source hands back `false`/`0` and the engine ends the run after the step.
pub trait ChoiceSource {
    /// `true` with probability `1 / max_value` under probabilistic strategies.
    fn boolean(&mut self, max_value: usize) -> bool;

    /// A value in `[0, max_value)`.
    fn integer(&mut self, max_value: usize) -> usize;

    /// A boolean the environment promises to resolve both ways infinitely
    /// often; cycles that only ever take one side are not liveness bugs.
    fn fair_boolean(&mut self, id: u64) -> bool;
}

/// A program the engine can run from its initial state, one scheduling
/// decision at a time.
pub trait Program {
    fn name(&self) -> &str;

    /// Return to the initial state.
    fn reset(&mut self);

    /// Snapshot of every entity and whether it can run now.
    fn schedulables(&self) -> Vec<Schedulable>;

    /// The entity that ran last, if the program tracks one. The engine falls
    /// back to its own record of the last scheduled entity.
    fn current(&self) -> Option<SchedulableId> {
        None
    }

    fn state(&self) -> ProgramState;

    /// Run the next operation of `id`.
    fn step(&mut self, id: SchedulableId, choices: &mut dyn ChoiceSource) -> Result<(), SafetyViolation>;

    /// Checked once nothing is enabled or blocked.
    fn on_quiescence(&self) -> Result<(), SafetyViolation> {
        Ok(())
    }
}

/// Programs held behind a box (as the workload registry hands them out).
impl<P: Program + ?Sized> Program for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn schedulables(&self) -> Vec<Schedulable> {
        (**self).schedulables()
    }

    fn current(&self) -> Option<SchedulableId> {
        (**self).current()
    }

    fn state(&self) -> ProgramState {
        (**self).state()
    }

    fn step(&mut self, id: SchedulableId, choices: &mut dyn ChoiceSource) -> Result<(), SafetyViolation> {
        (**self).step(id, choices)
    }

    fn on_quiescence(&self) -> Result<(), SafetyViolation> {
        (**self).on_quiescence()
    }
}
