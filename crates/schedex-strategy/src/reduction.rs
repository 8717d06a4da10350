//! Partial-order style reduction layered over another strategy.

use crate::config::ConfigError;
use crate::schedulable::{enabled_of, Schedulable};
use crate::strategy::{bound_reached, BoxedStrategy, SchedulingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the wrapper trims scheduling points before consulting its child.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReductionPolicy {
    /// Every decision goes to the child.
    #[default]
    None,
    /// Run any enabled non-communication operation immediately; only sends
    /// are left to the child.
    ForceSchedule,
    /// Keep running the current entity while its next operation is local.
    OmitSchedulingPoints,
}

impl fmt::Display for ReductionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReductionPolicy::None => "None",
            ReductionPolicy::ForceSchedule => "ForceSchedule",
            ReductionPolicy::OmitSchedulingPoints => "OmitSchedulingPoints",
        };
        f.write_str(name)
    }
}

impl FromStr for ReductionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ReductionPolicy::None),
            "force" | "force-schedule" => Ok(ReductionPolicy::ForceSchedule),
            "omit" | "omit-scheduling-points" => Ok(ReductionPolicy::OmitSchedulingPoints),
            other => Err(ConfigError::UnknownReduction(other.to_string())),
        }
    }
}

/// Wraps a child strategy and applies a [`ReductionPolicy`].
///
/// The wrapper counts its own steps separately from the child's. With a
/// non-zero `step_limit` the wrapper's count and limit are reported;
/// otherwise the child's are.
pub struct ReductionStrategy {
    child: BoxedStrategy,
    policy: ReductionPolicy,
    scheduled_steps: usize,
    step_limit: usize,
}

impl ReductionStrategy {
    pub fn new(child: BoxedStrategy, policy: ReductionPolicy, step_limit: usize) -> Self {
        Self {
            child,
            policy,
            scheduled_steps: 0,
            step_limit,
        }
    }

    pub fn policy(&self) -> ReductionPolicy {
        self.policy
    }

    fn reports_own_steps(&self) -> bool {
        self.step_limit != 0
    }

    /// The entity the policy runs without consulting the child, if any.
    fn bypass(&self, choices: &[Schedulable], current: &Schedulable) -> Option<Schedulable> {
        match self.policy {
            ReductionPolicy::None => None,
            ReductionPolicy::ForceSchedule => enabled_of(choices)
                .find(|c| !c.next_operation.is_communication())
                .copied(),
            ReductionPolicy::OmitSchedulingPoints => {
                (current.enabled && !current.next_operation.is_communication()).then_some(*current)
            }
        }
    }
}


impl SchedulingStrategy for ReductionStrategy {
    fn get_next(&mut self, choices: &[Schedulable], current: &Schedulable) -> Option<Schedulable> {
        self.scheduled_steps += 1;
        match self.bypass(choices, current) {
            // The child still counts the step so its bound keeps holding.
            Some(next) => {
                self.child.force_next(&next, choices, current);
                Some(next)
            }
            None => self.child.get_next(choices, current),
        }
    }

    fn get_next_boolean(&mut self, max_value: usize) -> Option<bool> {
        self.scheduled_steps += 1;
        self.child.get_next_boolean(max_value)
    }

    fn get_next_integer(&mut self, max_value: usize) -> Option<usize> {
        self.scheduled_steps += 1;
        self.child.get_next_integer(max_value)
    }

    fn force_next(&mut self, next: &Schedulable, choices: &[Schedulable], current: &Schedulable) {
        self.scheduled_steps += 1;
        self.child.force_next(next, choices, current);
    }

    fn force_next_boolean(&mut self, max_value: usize, next: bool) {
        self.scheduled_steps += 1;
        self.child.force_next_boolean(max_value, next);
    }

    fn force_next_integer(&mut self, max_value: usize, next: usize) {
        self.scheduled_steps += 1;
        self.child.force_next_integer(max_value, next);
    }

    fn prepare_for_next_iteration(&mut self) -> bool {
        self.scheduled_steps = 0;
        self.child.prepare_for_next_iteration()
    }

    fn reset(&mut self) {
        self.scheduled_steps = 0;
        self.child.reset();
    }

    fn scheduled_steps(&self) -> usize {
        if self.reports_own_steps() {
            self.scheduled_steps
        } else {
            self.child.scheduled_steps()
        }
    }

    fn has_reached_max_scheduling_steps(&self) -> bool {
        if self.reports_own_steps() {
            bound_reached(self.scheduled_steps, self.step_limit)
        } else {
            self.child.has_reached_max_scheduling_steps()
        }
    }

    fn is_fair(&self) -> bool {
        self.child.is_fair()
    }

    fn description(&self) -> String {
        format!("{}  w/ {}", self.child.description(), self.policy)
    }
}
