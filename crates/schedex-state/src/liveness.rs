//! Cycle detection and the liveness check run on each detected cycle.

use crate::cache::{CaptureOutcome, StateCache};
use crate::fingerprint::Fingerprint;
use crate::snapshot::{MonitorStatus, ProgramState};
use crate::trace::{Trace, TraceStep, TraceStepKind};
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What a liveness checker concluded about one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LivenessVerdict {
    NoViolation,
    /// Some entity enabled in the cycle never ran in it; a fair scheduler
    /// would not repeat this cycle forever.
    UnfairScheduling,
    /// Some fair boolean choice was not resolved both ways in the cycle.
    UnfairNondeterminism,
    /// The named monitors stay hot around the cycle.
    Violation { monitors: Vec<String> },
}

/// Called once per repeated fingerprint with the complete trace, whose tail
/// is the repeated step.
pub trait LivenessChecker {
    fn check_cycle(&mut self, root: Fingerprint, trace: &Trace) -> LivenessVerdict;
}

/// Reports monitors that are hot somewhere in a fair cycle and cold nowhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct FairCycleChecker;

impl FairCycleChecker {
    fn scheduling_is_fair(cycle: &[TraceStep]) -> bool {
        let mut enabled = AHashSet::new();
        let mut scheduled = AHashSet::new();
        for step in cycle {
            if let TraceStepKind::SchedulingChoice { scheduled: id } = step.kind {
                scheduled.insert(id);
                enabled.extend(step.state.enabled.iter().copied());
            }
        }
        enabled.is_subset(&scheduled)
    }

    fn nondeterminism_is_fair(cycle: &[TraceStep]) -> bool {
        let mut outcomes: AHashMap<u64, (bool, bool)> = AHashMap::new();
        for step in cycle {
            if let TraceStepKind::FairNondeterministicChoice { id, value } = step.kind {
                let seen = outcomes.entry(id).or_default();
                if value {
                    seen.0 = true;
                } else {
                    seen.1 = true;
                }
            }
        }
        outcomes.values().all(|&(t, f)| t && f)
    }

    fn hot_monitors(cycle: &[TraceStep]) -> Vec<String> {
        let statuses = cycle.iter().flat_map(|s| s.state.monitors.iter());
        let mut hot: Vec<String> = Vec::new();
        let mut cold = AHashSet::new();
        for monitor in statuses {
            match monitor.status {
                MonitorStatus::Hot if !hot.contains(&monitor.name) => hot.push(monitor.name.clone()),
                MonitorStatus::Cold => {
                    cold.insert(monitor.name.as_str());
                }
                _ => {}
            }
        }
        hot.retain(|name| !cold.contains(name.as_str()));
        hot.sort();
        hot
    }
}

impl LivenessChecker for FairCycleChecker {
    fn check_cycle(&mut self, root: Fingerprint, trace: &Trace) -> LivenessVerdict {
        let Some(cycle) = trace.cycle() else {
            return LivenessVerdict::NoViolation;
        };
        debug!(fingerprint = %root, len = cycle.len(), "checking cycle");

        if !Self::scheduling_is_fair(cycle) {
            debug!("scheduling in cycle is unfair");
            return LivenessVerdict::UnfairScheduling;
        }
        if !Self::nondeterminism_is_fair(cycle) {
            debug!("nondeterminism in cycle is unfair");
            return LivenessVerdict::UnfairNondeterminism;
        }

        let monitors = Self::hot_monitors(cycle);
        if monitors.is_empty() {
            LivenessVerdict::NoViolation
        } else {
            LivenessVerdict::Violation { monitors }
        }
    }
}

/// Iteration-scoped cycle detection: records every decision, runs the
/// checker on each repeated state, then drops the cycle from the trace.
pub struct CycleDetector {
    trace: Trace,
    cache: StateCache,
    checker: Box<dyn LivenessChecker + Send>,
    safety_prefix_bound: usize,
    steps: usize,
}

impl CycleDetector {
    /// States are not captured during the first `safety_prefix_bound` steps.
    pub fn new(checker: Box<dyn LivenessChecker + Send>, safety_prefix_bound: usize) -> Self {
        Self {
            trace: Trace::new(),
            cache: StateCache::new(),
            checker,
            safety_prefix_bound,
            steps: 0,
        }
    }

    pub fn record(&mut self, kind: TraceStepKind, state: ProgramState) -> Option<LivenessVerdict> {
        self.steps += 1;
        if self.steps <= self.safety_prefix_bound {
            return None;
        }

        match self.cache.capture_state(&mut self.trace, kind, state) {
            CaptureOutcome::New => None,
            CaptureOutcome::Repeated(root) => {
                let verdict = self.checker.check_cycle(root, &self.trace);
                self.trace.pop_cycle();
                Some(verdict)
            }
        }
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn cache(&self) -> &StateCache {
        &self.cache
    }

    /// Start a new iteration.
    pub fn reset(&mut self) {
        self.trace.clear();
        self.cache.clear();
        self.steps = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::MonitorSnapshot;
    use schedex_strategy::SchedulableId;
    use smallvec::smallvec;

    fn step(fp: u64, scheduled: u64, enabled: &[u64], hot: bool) -> (TraceStepKind, ProgramState) {
        let status = if hot { MonitorStatus::Hot } else { MonitorStatus::Cold };
        (
            TraceStepKind::SchedulingChoice {
                scheduled: SchedulableId::new(scheduled),
            },
            ProgramState {
                fingerprint: Fingerprint::from_u64(fp),
                enabled: enabled.iter().copied().map(SchedulableId::new).collect(),
                monitors: vec![MonitorSnapshot::new("eventually-done", status)],
            },
        )
    }

    fn detector() -> CycleDetector {
        CycleDetector::new(Box::new(FairCycleChecker), 0)
    }

    #[test]
    fn test_fair_hot_cycle_is_violation() {
        let mut d = detector();
        let (k, s) = step(1, 0, &[0, 1], true);
        assert_eq!(d.record(k, s), None);
        let (k, s) = step(2, 1, &[0, 1], true);
        assert_eq!(d.record(k, s), None);
        let (k, s) = step(1, 0, &[0, 1], true);
        assert_eq!(
            d.record(k, s),
            Some(LivenessVerdict::Violation {
                monitors: vec!["eventually-done".to_string()]
            })
        );
        // The cycle was popped; the earlier occurrence stays.
        assert_eq!(d.trace().len(), 1);
    }

    #[test]
    fn test_cold_step_clears_monitor() {
        let mut d = detector();
        for (fp, who, hot) in [(1, 0, true), (2, 1, false), (1, 0, true)] {
            let (k, s) = step(fp, who, &[0, 1], hot);
            if let Some(verdict) = d.record(k, s) {
                assert_eq!(verdict, LivenessVerdict::NoViolation);
            }
        }
    }

    #[test]
    fn test_starved_entity_is_unfair() {
        let mut d = detector();
        let (k, s) = step(1, 0, &[0, 1], true);
        d.record(k, s);
        let (k, s) = step(2, 0, &[0, 1], true);
        d.record(k, s);
        let (k, s) = step(1, 0, &[0, 1], true);
        assert_eq!(d.record(k, s), Some(LivenessVerdict::UnfairScheduling));
    }

    #[test]
    fn test_one_sided_fair_choice_is_unfair() {
        let mut d = detector();
        let state = |fp| ProgramState {
            fingerprint: Fingerprint::from_u64(fp),
            enabled: smallvec![],
            monitors: vec![MonitorSnapshot::new("m", MonitorStatus::Hot)],
        };
        let fair = |value| TraceStepKind::FairNondeterministicChoice { id: 4, value };
        d.record(fair(false), state(1));
        d.record(fair(false), state(2));
        assert_eq!(d.record(fair(false), state(1)), Some(LivenessVerdict::UnfairNondeterminism));
    }

    #[test]
    fn test_safety_prefix_skips_capture() {
        let mut d = CycleDetector::new(Box::new(FairCycleChecker), 2);
        for fp in [1, 1, 2] {
            let (k, s) = step(fp, 0, &[0], true);
            assert_eq!(d.record(k, s), None);
        }
        assert_eq!(d.trace().len(), 1);
        d.reset();
        assert!(d.trace().is_empty());
        assert!(d.cache().is_empty());
    }
}
