//! Test engine for schedex: runs programs under a scheduling strategy,
//! detects safety, deadlock and liveness bugs, and replays their schedules.

pub mod engine;
pub mod parallel;
pub mod program;
pub mod report;
pub mod workloads;

pub use engine::{EngineConfig, EngineError, EngineResult, IterationOutcome, IterationRecord, TestEngine};
pub use parallel::{run_parallel, ParallelReport};
pub use program::{ChoiceSource, Program, SafetyViolation};
pub use report::{BugKind, BugReport, OutcomeCounts, TestReport};
pub use workloads::Workload;
