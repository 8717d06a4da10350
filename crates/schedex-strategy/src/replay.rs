//! Replaying a recorded schedule decision by decision.

use crate::schedulable::{Schedulable, SchedulableId};
use crate::strategy::{bound_reached, BoxedStrategy, SchedulingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::error;

/// One resolved decision point of a run, in the order it was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleDecision {
    Schedule(SchedulableId),
    Boolean(bool),
    Integer(usize),
}

impl fmt::Display for ScheduleDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleDecision::Schedule(id) => write!(f, "schedule {}", id),
            ScheduleDecision::Boolean(b) => write!(f, "boolean {}", b),
            ScheduleDecision::Integer(n) => write!(f, "integer {}", n),
        }
    }
}

/// Why a replay stopped following its recording.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Divergence {
    #[error("execution is longer than the recorded schedule of {0} decisions")]
    ScheduleExhausted(usize),
    #[error("step {step}: expected a {expected} decision, recorded {recorded}")]
    KindMismatch {
        step: usize,
        expected: &'static str,
        recorded: ScheduleDecision,
    },
    #[error("step {step}: recorded schedulable {id} is not enabled")]
    NotEnabled { step: usize, id: SchedulableId },
    #[error("step {step}: recorded integer {value} is out of range 0..{max_value}")]
    OutOfRange {
        step: usize,
        value: usize,
        max_value: usize,
    },
}

/// Follows a recorded schedule; on divergence hands the rest of the run to
/// an optional suffix strategy.
pub struct ReplayStrategy {
    schedule: Vec<ScheduleDecision>,
    replayed_steps: usize,
    max_steps: usize,
    fair: bool,
    divergence: Option<Divergence>,
    suffix: Option<BoxedStrategy>,
}

impl ReplayStrategy {
    /// `fair` is the fairness of the strategy that produced `schedule`.
    pub fn new(schedule: Vec<ScheduleDecision>, max_steps: usize, fair: bool) -> Self {
        Self {
            schedule,
            replayed_steps: 0,
            max_steps,
            fair,
            divergence: None,
            suffix: None,
        }
    }

    pub fn with_suffix(mut self, suffix: BoxedStrategy) -> Self {
        self.suffix = Some(suffix);
        self
    }

    /// The first divergence of the current run, if any.
    pub fn divergence(&self) -> Option<&Divergence> {
        self.divergence.as_ref()
    }

    /// Whether every recorded decision has been replayed without divergence.
    pub fn is_complete(&self) -> bool {
        self.divergence.is_none() && self.replayed_steps == self.schedule.len()
    }

    fn diverge(&mut self, divergence: Divergence) {
        error!(%divergence, "schedule is not reproducible");
        self.divergence = Some(divergence);
    }

    /// The next recorded decision, or `None` once the replay has diverged.
    fn next_recorded(&mut self) -> Option<ScheduleDecision> {
        if self.divergence.is_some() {
            return None;
        }
        match self.schedule.get(self.replayed_steps).copied() {
            Some(decision) => Some(decision),
            None => {
                self.diverge(Divergence::ScheduleExhausted(self.schedule.len()));
                None
            }
        }
    }

    fn mismatch(&mut self, expected: &'static str, recorded: ScheduleDecision) {
        self.diverge(Divergence::KindMismatch {
            step: self.replayed_steps,
            expected,
            recorded,
        });
    }
}

impl SchedulingStrategy for ReplayStrategy {
    fn get_next(&mut self, choices: &[Schedulable], current: &Schedulable) -> Option<Schedulable> {
        if let Some(decision) = self.next_recorded() {
            match decision {
                ScheduleDecision::Schedule(id) => {
                    match choices.iter().find(|c| c.id == id && c.enabled) {
                        Some(next) => {
                            self.replayed_steps += 1;
                            return Some(*next);
                        }
                        None => self.diverge(Divergence::NotEnabled {
                            step: self.replayed_steps,
                            id,
                        }),
                    }
                }
                other => self.mismatch("scheduling", other),
            }
        }
        self.suffix.as_mut()?.get_next(choices, current)
    }

    fn get_next_boolean(&mut self, max_value: usize) -> Option<bool> {
        if let Some(decision) = self.next_recorded() {
            match decision {
                ScheduleDecision::Boolean(value) => {
                    self.replayed_steps += 1;
                    return Some(value);
                }
                other => self.mismatch("boolean", other),
            }
        }
        self.suffix.as_mut()?.get_next_boolean(max_value)
    }

    fn get_next_integer(&mut self, max_value: usize) -> Option<usize> {
        if let Some(decision) = self.next_recorded() {
            match decision {
                ScheduleDecision::Integer(value) if value < max_value => {
                    self.replayed_steps += 1;
                    return Some(value);
                }
                ScheduleDecision::Integer(value) => self.diverge(Divergence::OutOfRange {
                    step: self.replayed_steps,
                    value,
                    max_value,
                }),
                other => self.mismatch("integer", other),
            }
        }
        self.suffix.as_mut()?.get_next_integer(max_value)
    }

    fn force_next(&mut self, next: &Schedulable, choices: &[Schedulable], current: &Schedulable) {
        match self.suffix.as_mut() {
            Some(suffix) if self.divergence.is_some() => suffix.force_next(next, choices, current),
            _ => self.replayed_steps += 1,
        }
    }

    fn force_next_boolean(&mut self, max_value: usize, next: bool) {
        match self.suffix.as_mut() {
            Some(suffix) if self.divergence.is_some() => suffix.force_next_boolean(max_value, next),
            _ => self.replayed_steps += 1,
        }
    }

    fn force_next_integer(&mut self, max_value: usize, next: usize) {
        match self.suffix.as_mut() {
            Some(suffix) if self.divergence.is_some() => suffix.force_next_integer(max_value, next),
            _ => self.replayed_steps += 1,
        }
    }

    fn prepare_for_next_iteration(&mut self) -> bool {
        self.replayed_steps = 0;
        self.divergence = None;
        match self.suffix.as_mut() {
            Some(suffix) => suffix.prepare_for_next_iteration(),
            None => false,
        }
    }

    fn reset(&mut self) {
        self.replayed_steps = 0;
        self.divergence = None;
        if let Some(suffix) = self.suffix.as_mut() {
            suffix.reset();
        }
    }

    fn scheduled_steps(&self) -> usize {
        self.replayed_steps + self.suffix.as_ref().map_or(0, |s| s.scheduled_steps())
    }

    fn has_reached_max_scheduling_steps(&self) -> bool {
        bound_reached(self.scheduled_steps(), self.max_steps)
    }

    fn is_fair(&self) -> bool {
        self.fair
    }

    fn description(&self) -> String {
        match &self.suffix {
            Some(suffix) => format!(
                "Replay[{} decisions, then {}]",
                self.schedule.len(),
                suffix.description()
            ),
            None => format!("Replay[{} decisions]", self.schedule.len()),
        }
    }
}
