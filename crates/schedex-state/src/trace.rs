//! The ordered record of decision points in one run.

use crate::fingerprint::Fingerprint;
use crate::snapshot::ProgramState;
use ahash::AHashMap;
use schedex_strategy::{NondetValue, SchedulableId};
use serde::{Deserialize, Serialize};
use std::ops::Index;

/// The decision taken at a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TraceStepKind {
    SchedulingChoice { scheduled: SchedulableId },
    NondeterministicChoice { value: NondetValue },
    /// A boolean the program requires to be resolved fairly in the long run.
    FairNondeterministicChoice { id: u64, value: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStep {
    pub index: usize,
    pub kind: TraceStepKind,
    pub state: ProgramState,
    /// Neighbouring step indices within the owning trace.
    #[serde(skip)]
    pub prev: Option<usize>,
    #[serde(skip)]
    pub next: Option<usize>,
}

impl TraceStep {
    #[inline]
    pub fn fingerprint(&self) -> Fingerprint {
        self.state.fingerprint
    }
}

/// A stack of [`TraceStep`]s with O(1) fingerprint membership.
///
/// Steps are only ever pushed onto or popped off the tail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<TraceStep>", into = "Vec<TraceStep>")]
pub struct Trace {
    steps: Vec<TraceStep>,
    /// Occurrences of each fingerprint currently in `steps`.
    occurrences: AHashMap<Fingerprint, usize>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step and return its index.
    pub fn push(&mut self, kind: TraceStepKind, state: ProgramState) -> usize {
        let index = self.steps.len();
        let prev = index.checked_sub(1);
        if let Some(prev) = prev {
            self.steps[prev].next = Some(index);
        }
        *self.occurrences.entry(state.fingerprint).or_insert(0) += 1;
        self.steps.push(TraceStep {
            index,
            kind,
            state,
            prev,
            next: None,
        });
        index
    }

    pub fn pop(&mut self) -> Option<TraceStep> {
        let step = self.steps.pop()?;
        if let Some(count) = self.occurrences.get_mut(&step.fingerprint()) {
            *count -= 1;
            if *count == 0 {
                self.occurrences.remove(&step.fingerprint());
            }
        }
        if let Some(tail) = self.steps.last_mut() {
            tail.next = None;
        }
        Some(step)
    }

    pub fn peek(&self) -> Option<&TraceStep> {
        self.steps.last()
    }

    #[inline]
    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.occurrences.contains_key(fp)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TraceStep> {
        self.steps.get(index)
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    /// The steps closing a cycle at the tail: everything after the previous
    /// occurrence of the tail's fingerprint, tail included.
    pub fn cycle(&self) -> Option<&[TraceStep]> {
        let (tail, rest) = self.steps.split_last()?;
        let start = rest.iter().rposition(|s| s.fingerprint() == tail.fingerprint())?;
        Some(&self.steps[start + 1..])
    }

    /// Pop the cycle closed at the tail, leaving the earlier occurrence of
    /// its fingerprint as the new tail. Returns the popped steps in order.
    pub fn pop_cycle(&mut self) -> Vec<TraceStep> {
        let len = match self.cycle() {
            Some(cycle) => cycle.len(),
            None => return Vec::new(),
        };
        let mut cycle: Vec<TraceStep> = (0..len).filter_map(|_| self.pop()).collect();
        cycle.reverse();
        cycle
    }

    pub fn clear(&mut self) {
        self.steps.clear();
        self.occurrences.clear();
    }
}

impl Index<usize> for Trace {
    type Output = TraceStep;

    fn index(&self, index: usize) -> &TraceStep {
        &self.steps[index]
    }
}

impl From<Vec<TraceStep>> for Trace {
    fn from(steps: Vec<TraceStep>) -> Self {
        let mut trace = Trace::new();
        for step in steps {
            trace.push(step.kind, step.state);
        }
        trace
    }
}

impl From<Trace> for Vec<TraceStep> {
    fn from(trace: Trace) -> Self {
        trace.steps
    }
}
