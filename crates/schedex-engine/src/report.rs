//! Bug reports and run summaries.

use schedex_strategy::{ScheduleDecision, SchedulableId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of defect an iteration ran into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BugKind {
    Safety { message: String },
    /// Nothing could run while some entities were still waiting.
    Deadlock { blocked: Vec<SchedulableId> },
    Liveness { monitors: Vec<String> },
}

impl BugKind {
    /// Whether two bugs are of the same kind, ignoring details.
    pub fn same_kind(&self, other: &BugKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for BugKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BugKind::Safety { message } => write!(f, "safety violation: {}", message),
            BugKind::Deadlock { blocked } => {
                write!(f, "deadlock: blocked [")?;
                for (i, id) in blocked.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", id)?;
                }
                write!(f, "]")
            }
            BugKind::Liveness { monitors } => {
                write!(f, "liveness violation: hot monitors {}", monitors.join(", "))
            }
        }
    }
}

/// Everything needed to understand and replay one bug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugReport {
    pub program: String,
    pub strategy: String,
    pub worker: usize,
    pub iteration: usize,
    pub steps: usize,
    pub bug: BugKind,
    pub schedule: Vec<ScheduleDecision>,
    /// `Some(true)` when replaying `schedule` reproduced the bug; `None` when
    /// replay verification was off.
    pub reproducible: Option<bool>,
}

/// How each iteration of a run ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub completed: usize,
    pub step_bound_reached: usize,
    pub prefix_exhausted: usize,
    pub buggy: usize,
}

/// Summary of one engine run (one strategy instance).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub program: String,
    pub strategy: String,
    pub iterations: usize,
    /// The strategy reported its search space exhausted.
    pub exhausted: bool,
    pub max_steps_observed: usize,
    pub outcomes: OutcomeCounts,
    pub bugs: Vec<BugReport>,
}

impl TestReport {
    pub fn found_bug(&self) -> bool {
        !self.bugs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bug_display() {
        let bug = BugKind::Deadlock {
            blocked: vec![SchedulableId::new(0), SchedulableId::new(1)],
        };
        assert_eq!(bug.to_string(), "deadlock: blocked [0, 1]");
        let bug = BugKind::Liveness {
            monitors: vec!["acked".into()],
        };
        assert_eq!(bug.to_string(), "liveness violation: hot monitors acked");
    }

    #[test]
    fn test_same_kind_ignores_details() {
        let a = BugKind::Safety { message: "a".into() };
        let b = BugKind::Safety { message: "b".into() };
        assert!(a.same_kind(&b));
        assert!(!a.same_kind(&BugKind::Deadlock { blocked: vec![] }));
    }
}
