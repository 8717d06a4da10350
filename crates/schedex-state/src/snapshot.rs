//! What the runtime reports about the program at one decision point.

use crate::fingerprint::{Fingerprint, FingerprintBuilder};
use schedex_strategy::SchedulableId;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Liveness-relevant status of a monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MonitorStatus {
    #[default]
    None,
    /// An obligation is pending.
    Hot,
    /// The obligation has been met.
    Cold,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub name: String,
    pub status: MonitorStatus,
}

impl MonitorSnapshot {
    pub fn new(name: impl Into<String>, status: MonitorStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}

/// Program state at one decision point: its fingerprint plus the parts the
/// liveness check reads back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramState {
    pub fingerprint: Fingerprint,
    pub enabled: SmallVec<[SchedulableId; 8]>,
    pub monitors: Vec<MonitorSnapshot>,
}

impl ProgramState {
    /// Capture a state. The fingerprint covers the enabled set, every monitor
    /// status and whatever the caller already added to `fields`.
    pub fn capture(
        enabled: impl IntoIterator<Item = SchedulableId>,
        monitors: Vec<MonitorSnapshot>,
        mut fields: FingerprintBuilder,
    ) -> Self {
        let mut enabled: SmallVec<[SchedulableId; 8]> = enabled.into_iter().collect();
        enabled.sort_unstable();
        enabled.dedup();

        for &id in &enabled {
            fields.entity(id, true);
        }
        for monitor in &monitors {
            fields.monitor(&monitor.name, monitor.status);
        }

        Self {
            fingerprint: fields.finish(),
            enabled,
            monitors,
        }
    }

    pub fn hot_monitors(&self) -> impl Iterator<Item = &str> {
        self.monitors
            .iter()
            .filter(|m| m.status == MonitorStatus::Hot)
            .map(|m| m.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_order_irrelevant() {
        let ids = |v: &[u64]| v.iter().copied().map(SchedulableId::new).collect::<Vec<_>>();
        let a = ProgramState::capture(ids(&[3, 1, 2]), vec![], FingerprintBuilder::new());
        let b = ProgramState::capture(ids(&[1, 2, 3]), vec![], FingerprintBuilder::new());
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.enabled.as_slice(), &ids(&[1, 2, 3])[..]);
    }

    #[test]
    fn test_monitor_status_changes_fingerprint() {
        let hot = ProgramState::capture(
            [],
            vec![MonitorSnapshot::new("progress", MonitorStatus::Hot)],
            FingerprintBuilder::new(),
        );
        let cold = ProgramState::capture(
            [],
            vec![MonitorSnapshot::new("progress", MonitorStatus::Cold)],
            FingerprintBuilder::new(),
        );
        assert_ne!(hot.fingerprint, cold.fingerprint);
        assert_eq!(hot.hot_monitors().collect::<Vec<_>>(), vec!["progress"]);
    }
}
