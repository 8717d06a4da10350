//! Program-state fingerprints, execution traces and cycle detection.

pub mod cache;
pub mod fingerprint;
pub mod liveness;
pub mod snapshot;
pub mod trace;

pub use cache::{CaptureOutcome, StateCache};
pub use fingerprint::{Fingerprint, FingerprintBuilder};
pub use liveness::{CycleDetector, FairCycleChecker, LivenessChecker, LivenessVerdict};
pub use snapshot::{MonitorSnapshot, MonitorStatus, ProgramState};
pub use trace::{Trace, TraceStep, TraceStepKind};
