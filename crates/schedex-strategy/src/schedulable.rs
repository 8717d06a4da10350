//! Read-only snapshots of the entities a strategy can schedule.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a schedulable entity (actor, task, machine).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchedulableId(u64);

impl SchedulableId {
    #[inline]
    pub const fn new(id: u64) -> Self {
        SchedulableId(id)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for SchedulableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for SchedulableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of operation an entity performs when it is scheduled next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Start,
    Create,
    Send,
    Receive,
    Stop,
    Yield,
    Join,
    WaitForQuiescence,
}

impl OperationKind {
    /// Whether the operation makes an effect visible to other entities.
    ///
    /// Only sends are treated as communication: every other operation is
    /// local to the entity that performs it and can be reordered freely by
    /// the reduction policies.
    #[inline]
    pub fn is_communication(self) -> bool {
        matches!(self, OperationKind::Send)
    }
}

/// A point-in-time view of one schedulable entity, owned by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedulable {
    pub id: SchedulableId,
    pub enabled: bool,
    pub blocked: bool,
    pub next_operation: OperationKind,
}

impl Schedulable {
    pub fn new(id: u64, next_operation: OperationKind) -> Self {
        Self {
            id: SchedulableId::new(id),
            enabled: true,
            blocked: false,
            next_operation,
        }
    }

    /// An entity waiting on something another entity has to provide.
    pub fn blocked(id: u64, next_operation: OperationKind) -> Self {
        Self {
            id: SchedulableId::new(id),
            enabled: false,
            blocked: true,
            next_operation,
        }
    }

    /// An entity that has nothing left to run.
    pub fn finished(id: u64) -> Self {
        Self {
            id: SchedulableId::new(id),
            enabled: false,
            blocked: false,
            next_operation: OperationKind::Stop,
        }
    }
}

/// A boolean or integer value handed out at a nondeterministic decision point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NondetValue {
    Boolean(bool),
    Integer(usize),
}

impl fmt::Display for NondetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NondetValue::Boolean(b) => write!(f, "{}", b),
            NondetValue::Integer(n) => write!(f, "{}", n),
        }
    }
}

/// Filter a snapshot down to the entities that may run now.
pub(crate) fn enabled_of(choices: &[Schedulable]) -> impl Iterator<Item = &Schedulable> + '_ {
    choices.iter().filter(|c| c.enabled)
}
