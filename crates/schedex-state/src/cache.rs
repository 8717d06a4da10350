//! Per-iteration cache of visited program states.

use crate::fingerprint::Fingerprint;
use crate::snapshot::ProgramState;
use crate::trace::{Trace, TraceStep, TraceStepKind};
use ahash::AHashMap;
use tracing::debug;

/// Result of capturing the state at a decision point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The fingerprint was not in the trace before this step.
    New,
    /// The fingerprint already occurs earlier in the current trace.
    Repeated(Fingerprint),
}

/// Maps each fingerprint seen in the current iteration to its latest step.
#[derive(Debug, Default)]
pub struct StateCache {
    states: AHashMap<Fingerprint, TraceStep>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the state at a decision point and push it onto `trace`.
    ///
    /// Repeat detection looks only at the trace, so a state that was visited
    /// and later popped off (with its cycle) counts as new again.
    pub fn capture_state(
        &mut self,
        trace: &mut Trace,
        kind: TraceStepKind,
        state: ProgramState,
    ) -> CaptureOutcome {
        let fp = state.fingerprint;
        let repeated = trace.contains(&fp);
        let index = trace.push(kind, state);
        self.states.insert(fp, trace[index].clone());

        if repeated {
            debug!(fingerprint = %fp, step = index, "repeated program state");
            CaptureOutcome::Repeated(fp)
        } else {
            CaptureOutcome::New
        }
    }

    #[inline]
    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.states.contains_key(fp)
    }

    pub fn get(&self, fp: &Fingerprint) -> Option<&TraceStep> {
        self.states.get(fp)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schedex_strategy::SchedulableId;

    fn state(fp: u64) -> ProgramState {
        ProgramState {
            fingerprint: Fingerprint::from_u64(fp),
            enabled: Default::default(),
            monitors: Vec::new(),
        }
    }

    fn choice() -> TraceStepKind {
        TraceStepKind::SchedulingChoice {
            scheduled: SchedulableId::new(0),
        }
    }

    #[test]
    fn test_repeat_reported_for_matching_fingerprint_only() {
        // F = 100 at steps 2 and 7 (1-based); every other step is distinct.
        let f = Fingerprint::from_u64(100);
        let fps = [1, 100, 3, 4, 5, 6, 100];
        let mut cache = StateCache::new();
        let mut trace = Trace::new();

        let outcomes: Vec<_> = fps
            .iter()
            .map(|&fp| cache.capture_state(&mut trace, choice(), state(fp)))
            .collect();
        assert!(outcomes[..6].iter().all(|o| *o == CaptureOutcome::New));
        assert_eq!(outcomes[6], CaptureOutcome::Repeated(f));

        while trace.len() > 6 {
            trace.pop();
        }
        assert!(trace.contains(&f));

        while trace.len() > 1 {
            trace.pop();
        }
        assert!(!trace.contains(&f));
    }

    #[test]
    fn test_cache_is_additive() {
        let mut cache = StateCache::new();
        let mut trace = Trace::new();
        cache.capture_state(&mut trace, choice(), state(1));
        cache.capture_state(&mut trace, choice(), state(2));
        trace.clear();
        assert!(cache.contains(&Fingerprint::from_u64(1)));
        assert_eq!(cache.len(), 2);
        assert_eq!(
            cache.capture_state(&mut trace, choice(), state(1)),
            CaptureOutcome::New
        );
        assert_eq!(cache.get(&Fingerprint::from_u64(1)).map(|s| s.index), Some(0));
        cache.clear();
        assert!(cache.is_empty());
    }
}
