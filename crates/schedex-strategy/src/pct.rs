//! Probabilistic concurrency testing: randomized priorities with a bounded
//! number of priority change points per run.

use crate::config::ConfigError;
use crate::random::{biased_coin, uniform_integer};
use crate::schedulable::{enabled_of, Schedulable, SchedulableId};
use crate::strategy::{bound_reached, SchedulingStrategy};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use tracing::trace;

/// Schedules the highest-priority enabled entity; at each change point the
/// current leader is demoted to the lowest priority.
#[derive(Debug, Clone)]
pub struct PctStrategy {
    rng: StdRng,
    seed: u64,
    max_steps: usize,
    scheduled_steps: usize,
    /// Longest run observed so far; change points are drawn below it.
    schedule_length: usize,
    max_priority_switch_points: usize,
    priority_list: Vec<SchedulableId>,
    priority_change_points: BTreeSet<usize>,
    switches_this_iteration: usize,
}

impl PctStrategy {
    pub fn new(max_steps: usize, max_priority_switch_points: usize, seed: u64) -> Result<Self, ConfigError> {
        if max_priority_switch_points == 0 {
            return Err(ConfigError::ZeroSwitchPoints);
        }
        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
            max_steps,
            scheduled_steps: 0,
            schedule_length: 0,
            max_priority_switch_points,
            priority_list: Vec::new(),
            priority_change_points: BTreeSet::new(),
            switches_this_iteration: 0,
        })
    }

    pub fn priority_list(&self) -> &[SchedulableId] {
        &self.priority_list
    }

    /// Change points of the current run. Right after
    /// `prepare_for_next_iteration` all of them are below `schedule_length`;
    /// a point hit while only one entity is enabled moves one step forward
    /// and may end up at or past it.
    pub fn priority_change_points(&self) -> &BTreeSet<usize> {
        &self.priority_change_points
    }

    pub fn schedule_length(&self) -> usize {
        self.schedule_length
    }

    /// Demotions performed in the current run.
    pub fn switches_this_iteration(&self) -> usize {
        self.switches_this_iteration
    }

    fn highest_priority_enabled(&self, enabled: &[SchedulableId]) -> Option<SchedulableId> {
        self.priority_list
            .iter()
            .copied()
            .find(|id| enabled.contains(id))
    }

    fn move_priority_change_point_forward(&mut self) {
        self.priority_change_points.remove(&self.scheduled_steps);
        let mut point = self.scheduled_steps + 1;
        while self.priority_change_points.contains(&point) {
            point += 1;
        }
        self.priority_change_points.insert(point);
        trace!(point, "moving priority change point forward");
    }

    fn prioritized_choice(&mut self, enabled: &[SchedulableId], current: SchedulableId) -> Option<SchedulableId> {
        if self.priority_list.is_empty() {
            self.priority_list.push(current);
        }

        for &id in enabled {
            if !self.priority_list.contains(&id) {
                let idx = self.rng.gen_range(1..=self.priority_list.len());
                self.priority_list.insert(idx, id);
                trace!(%id, idx, "detected new schedulable");
            }
        }

        if self.priority_change_points.contains(&self.scheduled_steps) {
            if enabled.len() == 1 {
                self.move_priority_change_point_forward();
            } else if let Some(leader) = self.highest_priority_enabled(enabled) {
                self.priority_list.retain(|&id| id != leader);
                self.priority_list.push(leader);
                self.switches_this_iteration += 1;
                trace!(%leader, "schedulable changes to lowest priority");
            }
        }

        let next = self.highest_priority_enabled(enabled);
        trace!(next = ?next, list = ?self.priority_list, "priority list");
        next
    }
}

impl SchedulingStrategy for PctStrategy {
    fn get_next(&mut self, choices: &[Schedulable], current: &Schedulable) -> Option<Schedulable> {
        let enabled: SmallVec<[SchedulableId; 8]> = enabled_of(choices).map(|c| c.id).collect();
        if enabled.is_empty() {
            return None;
        }

        let id = self.prioritized_choice(&enabled, current.id)?;
        self.scheduled_steps += 1;
        choices.iter().find(|c| c.id == id).copied()
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

    fn force_next(&mut self, _next: &Schedulable, choices: &[Schedulable], current: &Schedulable) {
        // Keep the priority list in step with what actually ran.
        let enabled: SmallVec<[SchedulableId; 8]> = enabled_of(choices).map(|c| c.id).collect();
        if !enabled.is_empty() {
            self.prioritized_choice(&enabled, current.id);
        }
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
        self.switches_this_iteration = 0;

        self.priority_list.clear();
        self.priority_change_points.clear();

        let mut range: Vec<usize> = (0..self.schedule_length).collect();
        let amount = self.max_priority_switch_points.min(self.schedule_length);
        let (points, _) = range.partial_shuffle(&mut self.rng, amount);
        self.priority_change_points.extend(points.iter().copied());

        trace!(points = ?self.priority_change_points, "resampled priority change points");
        true
    }

    fn reset(&mut self) {
        self.schedule_length = 0;
        self.scheduled_steps = 0;
        self.switches_this_iteration = 0;
        self.priority_list.clear();
        self.priority_change_points.clear();
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
        let mut text = format!(
            "PCT[priority change points '{}' [",
            self.max_priority_switch_points
        );
        for (idx, point) in self.priority_change_points.iter().enumerate() {
            if idx > 0 {
                text.push_str(", ");
            }
            let _ = write!(text, "{}", point);
        }
        let _ = write!(text, "], seed '{}']", self.seed);
        text
    }
}
