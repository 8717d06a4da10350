//! Structural fingerprints of program state.

use crate::snapshot::MonitorStatus;
use schedex_strategy::SchedulableId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};

/// A fingerprint is a 64-bit hash identifying a program state.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(u64);

impl Fingerprint {
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn from_u64(v: u64) -> Self {
        Fingerprint(v)
    }

    /// Replace one integer component without recomputing the rest.
    #[inline]
    pub fn update_int(self, key: u64, old: i64, new: i64) -> Self {
        Fingerprint(self.0 ^ mix(FIELD, key, old as u64) ^ mix(FIELD, key, new as u64))
    }

    /// The point of the `ordinal`-th choice made while stepping out of this
    /// state. Ordinal 0 is the state itself.
    #[inline]
    pub fn with_choice_ordinal(self, ordinal: usize) -> Self {
        if ordinal == 0 {
            self
        } else {
            Fingerprint(self.0 ^ mix(CHOICE, ordinal as u64, self.0))
        }
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({:016x})", self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

// Component domains, so an entity and a field with equal keys never cancel.
const ENTITY: u64 = 0x2d358dccaa6c78a5;
const MONITOR: u64 = 0x8bb84b93962eacc9;
const FIELD: u64 = 0x4b6d499041670d8d;
const CHOICE: u64 = 0x6a09e667f3bcc909;

/// splitmix64-style mixing of one integer component.
#[inline]
fn mix(domain: u64, key: u64, value: u64) -> u64 {
    let h = (key ^ domain).wrapping_mul(0x9e3779b97f4a7c15);
    let h = (h ^ value).wrapping_mul(0x517cc1b727220a95);
    h ^ (h >> 32)
}

/// Hash an arbitrary component with fixed seeds, so equal states agree
/// across processes of the same build.
fn hash_component<K: Hash + ?Sized, V: Hash + ?Sized>(domain: u64, key: &K, value: &V) -> u64 {
    let state = ahash::RandomState::with_seeds(
        0x243f6a8885a308d3,
        0x13198a2e03707344,
        0xa4093822299f31d0,
        0x082efa98ec4e6c89,
    );
    let mut hasher = state.build_hasher();
    domain.hash(&mut hasher);
    key.hash(&mut hasher);
    value.hash(&mut hasher);
    hasher.finish()
}

/// Accumulates state components into a [`Fingerprint`].
///
/// The fingerprint is the XOR of one hash per component, so it does not
/// depend on the order components are added in. Each key must be added once.
#[derive(Debug, Clone, Copy, Default)]
pub struct FingerprintBuilder {
    acc: u64,
}

impl FingerprintBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(&mut self, id: SchedulableId, enabled: bool) -> &mut Self {
        self.acc ^= mix(ENTITY, id.as_u64(), enabled as u64);
        self
    }

    pub fn monitor(&mut self, name: &str, status: MonitorStatus) -> &mut Self {
        self.acc ^= hash_component(MONITOR, name, &status);
        self
    }

    /// An integer field; fast path, and updatable with [`Fingerprint::update_int`].
    pub fn int_field(&mut self, key: u64, value: i64) -> &mut Self {
        self.acc ^= mix(FIELD, key, value as u64);
        self
    }

    /// Any hashable field under a caller-chosen key.
    pub fn field<K: Hash + ?Sized, V: Hash + ?Sized>(&mut self, key: &K, value: &V) -> &mut Self {
        self.acc ^= hash_component(FIELD, key, value);
        self
    }

    pub fn finish(&self) -> Fingerprint {
        Fingerprint(self.acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_independent() {
        let a = FingerprintBuilder::new()
            .entity(SchedulableId::new(1), true)
            .entity(SchedulableId::new(2), false)
            .field("queue", &[1u8, 2, 3][..])
            .finish();
        let b = FingerprintBuilder::new()
            .field("queue", &[1u8, 2, 3][..])
            .entity(SchedulableId::new(2), false)
            .entity(SchedulableId::new(1), true)
            .finish();
        assert_eq!(a, b);
    }

    #[test]
    fn test_components_distinguish() {
        let base = FingerprintBuilder::new().entity(SchedulableId::new(1), true).finish();
        let disabled = FingerprintBuilder::new().entity(SchedulableId::new(1), false).finish();
        let field = FingerprintBuilder::new().int_field(1, 1).finish();
        assert_ne!(base, disabled);
        assert_ne!(base, field);

        let hot = FingerprintBuilder::new().monitor("m", MonitorStatus::Hot).finish();
        let cold = FingerprintBuilder::new().monitor("m", MonitorStatus::Cold).finish();
        assert_ne!(hot, cold);
    }

    #[test]
    fn test_incremental_update() {
        let mut builder = FingerprintBuilder::new();
        builder.int_field(0, 10).int_field(1, 20);
        let updated = builder.finish().update_int(1, 20, 99);
        let expected = FingerprintBuilder::new().int_field(0, 10).int_field(1, 99).finish();
        assert_eq!(updated, expected);
    }

    #[test]
    fn test_choice_ordinals_distinct() {
        let fp = FingerprintBuilder::new().int_field(3, 4).finish();
        assert_eq!(fp.with_choice_ordinal(0), fp);
        assert_ne!(fp.with_choice_ordinal(1), fp);
        assert_ne!(fp.with_choice_ordinal(1), fp.with_choice_ordinal(2));
        assert_eq!(fp.with_choice_ordinal(2), fp.with_choice_ordinal(2));
    }

    #[test]
    fn test_fingerprint_display() {
        let fp = Fingerprint::from_u64(0xab);
        assert_eq!(fp.to_string(), "00000000000000ab");
        assert_eq!(format!("{:?}", fp), "Fingerprint(00000000000000ab)");
    }
}
