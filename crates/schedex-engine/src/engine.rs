//! The iteration loop: runs a program under a strategy until the budget,
//! the first bug or the end of the search space.

use crate::program::{ChoiceSource, Program};
use crate::report::{BugKind, BugReport, OutcomeCounts, TestReport};
use schedex_state::{CycleDetector, FairCycleChecker, LivenessVerdict, ProgramState, TraceStepKind};
use schedex_strategy::{
    ConfigError, NondetValue, ReplayStrategy, ScheduleDecision, Schedulable, SchedulableId,
    SchedulingStrategy,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Engine error. Bugs in the program are reported, not returned as errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("strategy chose schedulable {id}, which is not enabled")]
    DisabledChoice { id: SchedulableId },

    #[error("program '{program}' has no schedulable entities")]
    EmptyProgram { program: String },

    #[error("invalid strategy configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum iterations (0 = until the strategy exhausts or a bug stops the run).
    pub iterations: usize,
    /// Detect repeated states and run the fair-cycle liveness check.
    pub check_liveness: bool,
    /// Steps per iteration before states are captured for cycle detection.
    pub safety_prefix_bound: usize,
    pub stop_on_first_bug: bool,
    /// Re-run each bug's schedule to confirm it reproduces.
    pub verify_replay: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            check_liveness: false,
            safety_prefix_bound: 0,
            stop_on_first_bug: true,
            verify_replay: true,
        }
    }
}

/// How one iteration ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Nothing left to run and every end-of-run check passed.
    Completed,
    StepBoundReached,
    /// The strategy had no option left for this prefix.
    PrefixExhausted,
    Bug(BugKind),
}

/// One iteration's outcome plus the decisions that led to it.
#[derive(Debug, Clone)]
pub struct IterationRecord {
    pub outcome: IterationOutcome,
    pub steps: usize,
    pub schedule: Vec<ScheduleDecision>,
}

/// Answers a program's nondeterministic choices from the strategy, recording
/// each decision.
struct StrategyChoices<'a> {
    strategy: &'a mut dyn SchedulingStrategy,
    schedule: &'a mut Vec<ScheduleDecision>,
    detector: Option<&'a mut CycleDetector>,
    state: &'a ProgramState,
    ordinal: usize,
    stalled: bool,
    violation: Option<Vec<String>>,
}

impl StrategyChoices<'_> {
    fn observe(&mut self, decision: ScheduleDecision, kind: TraceStepKind) {
        self.schedule.push(decision);
        self.ordinal += 1;
        if let Some(detector) = self.detector.as_deref_mut() {
            let state = ProgramState {
                fingerprint: self.state.fingerprint.with_choice_ordinal(self.ordinal),
                ..self.state.clone()
            };
            if let Some(LivenessVerdict::Violation { monitors }) = detector.record(kind, state) {
                self.violation.get_or_insert(monitors);
            }
        }
    }
}

impl ChoiceSource for StrategyChoices<'_> {
    fn boolean(&mut self, max_value: usize) -> bool {
        if self.stalled {
            return false;
        }
        match self.strategy.get_next_boolean(max_value) {
            Some(value) => {
                self.observe(
                    ScheduleDecision::Boolean(value),
                    TraceStepKind::NondeterministicChoice {
                        value: NondetValue::Boolean(value),
                    },
                );
                value
            }
            None => {
                self.stalled = true;
                false
            }
        }
    }

    fn integer(&mut self, max_value: usize) -> usize {
        if self.stalled {
            return 0;
        }
        match self.strategy.get_next_integer(max_value) {
            Some(value) => {
                self.observe(
                    ScheduleDecision::Integer(value),
                    TraceStepKind::NondeterministicChoice {
                        value: NondetValue::Integer(value),
                    },
                );
                value
            }
            None => {
                self.stalled = true;
                0
            }
        }
    }

    fn fair_boolean(&mut self, id: u64) -> bool {
        if self.stalled {
            return false;
        }
        match self.strategy.get_next_boolean(2) {
            Some(value) => {
                self.observe(
                    ScheduleDecision::Boolean(value),
                    TraceStepKind::FairNondeterministicChoice { id, value },
                );
                value
            }
            None => {
                self.stalled = true;
                false
            }
        }
    }
}

/// Drives iterations of a program under a strategy.
pub struct TestEngine {
    config: EngineConfig,
    worker: usize,
}

impl TestEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config, worker: 0 }
    }

    /// Tag bug reports with a worker index.
    pub fn with_worker(mut self, worker: usize) -> Self {
        self.worker = worker;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn detector(&self) -> Option<CycleDetector> {
        self.config
            .check_liveness
            .then(|| CycleDetector::new(Box::new(FairCycleChecker), self.config.safety_prefix_bound))
    }

    /// Run iterations until the budget, the first bug (if configured) or the
    /// end of the strategy's search space.
    pub fn run(
        &self,
        program: &mut dyn Program,
        strategy: &mut dyn SchedulingStrategy,
    ) -> EngineResult<TestReport> {
        if program.schedulables().is_empty() {
            return Err(EngineError::EmptyProgram {
                program: program.name().to_string(),
            });
        }

        info!(
            program = program.name(),
            strategy = %strategy.description(),
            iterations = self.config.iterations,
            liveness = self.config.check_liveness,
            "starting test run"
        );

        let mut detector = self.detector();
        let mut outcomes = OutcomeCounts::default();
        let mut bugs = Vec::new();
        let mut max_steps_observed = 0;
        let mut iterations = 0;
        let mut exhausted = false;

        loop {
            if self.config.iterations != 0 && iterations >= self.config.iterations {
                break;
            }

            let record = self.run_iteration(program, strategy, detector.as_mut())?;
            let iteration = iterations;
            iterations += 1;
            max_steps_observed = max_steps_observed.max(record.steps);
            debug!(iteration, steps = record.steps, outcome = ?record.outcome, "iteration finished");

            let mut stop = false;
            match record.outcome {
                IterationOutcome::Completed => outcomes.completed += 1,
                IterationOutcome::StepBoundReached => outcomes.step_bound_reached += 1,
                IterationOutcome::PrefixExhausted => outcomes.prefix_exhausted += 1,
                IterationOutcome::Bug(bug) => {
                    outcomes.buggy += 1;
                    info!(iteration, steps = record.steps, bug = %bug, "found bug");
                    let mut report = BugReport {
                        program: program.name().to_string(),
                        strategy: strategy.description(),
                        worker: self.worker,
                        iteration,
                        steps: record.steps,
                        bug,
                        schedule: record.schedule,
                        reproducible: None,
                    };
                    if self.config.verify_replay {
                        let reproducible = self.verify(program, &report, strategy.is_fair())?;
                        if !reproducible {
                            warn!(iteration, "bug did not reproduce on replay");
                        }
                        report.reproducible = Some(reproducible);
                    }
                    bugs.push(report);
                    stop = self.config.stop_on_first_bug;
                }
            }
            if stop {
                break;
            }

            if !strategy.prepare_for_next_iteration() {
                exhausted = true;
                break;
            }
        }

        info!(
            iterations,
            bugs = bugs.len(),
            exhausted,
            max_steps = max_steps_observed,
            "test run finished"
        );

        Ok(TestReport {
            program: program.name().to_string(),
            strategy: strategy.description(),
            iterations,
            exhausted,
            max_steps_observed,
            outcomes,
            bugs,
        })
    }

    /// Run one iteration from the program's initial state.
    pub fn run_iteration(
        &self,
        program: &mut dyn Program,
        strategy: &mut dyn SchedulingStrategy,
        mut detector: Option<&mut CycleDetector>,
    ) -> EngineResult<IterationRecord> {
        program.reset();
        if let Some(detector) = detector.as_deref_mut() {
            detector.reset();
        }

        let mut schedule = Vec::new();
        let mut steps = 0;
        let mut last: Option<SchedulableId> = None;

        let outcome = loop {
            let choices = program.schedulables();
            if !choices.iter().any(|c| c.enabled) {
                break self.end_of_run(program, &choices);
            }

            let current = pick_current(&choices, program.current().or(last));
            let Some(next) = strategy.get_next(&choices, &current) else {
                break IterationOutcome::PrefixExhausted;
            };
            if !choices.iter().any(|c| c.id == next.id && c.enabled) {
                return Err(EngineError::DisabledChoice { id: next.id });
            }
            schedule.push(ScheduleDecision::Schedule(next.id));
            steps += 1;
            last = Some(next.id);

            let state = program.state();
            if let Some(detector) = detector.as_deref_mut() {
                let kind = TraceStepKind::SchedulingChoice { scheduled: next.id };
                if let Some(LivenessVerdict::Violation { monitors }) = detector.record(kind, state.clone()) {
                    break IterationOutcome::Bug(BugKind::Liveness { monitors });
                }
            }

            let mut source = StrategyChoices {
                strategy: &mut *strategy,
                schedule: &mut schedule,
                detector: detector.as_deref_mut(),
                state: &state,
                ordinal: 0,
                stalled: false,
                violation: None,
            };
            let result = program.step(next.id, &mut source);
            let (stalled, violation, nondet_steps) = (source.stalled, source.violation, source.ordinal);
            steps += nondet_steps;

            if let Err(violation) = result {
                break IterationOutcome::Bug(BugKind::Safety {
                    message: violation.0,
                });
            }
            if let Some(monitors) = violation {
                break IterationOutcome::Bug(BugKind::Liveness { monitors });
            }
            if stalled {
                break IterationOutcome::PrefixExhausted;
            }
            if strategy.has_reached_max_scheduling_steps() {
                break IterationOutcome::StepBoundReached;
            }
        };

        Ok(IterationRecord {
            outcome,
            steps,
            schedule,
        })
    }

    /// Nothing is enabled: a deadlock if anything is blocked, otherwise the
    /// end-of-run checks decide.
    fn end_of_run(&self, program: &dyn Program, choices: &[Schedulable]) -> IterationOutcome {
        let blocked: Vec<SchedulableId> = choices.iter().filter(|c| c.blocked).map(|c| c.id).collect();
        if !blocked.is_empty() {
            return IterationOutcome::Bug(BugKind::Deadlock { blocked });
        }
        if let Err(violation) = program.on_quiescence() {
            return IterationOutcome::Bug(BugKind::Safety {
                message: violation.0,
            });
        }
        if self.config.check_liveness {
            let monitors: Vec<String> = program.state().hot_monitors().map(str::to_string).collect();
            if !monitors.is_empty() {
                return IterationOutcome::Bug(BugKind::Liveness { monitors });
            }
        }
        IterationOutcome::Completed
    }

    /// Replay a bug's schedule and check that the same kind of bug recurs
    /// without the replay diverging.
    pub fn verify(&self, program: &mut dyn Program, report: &BugReport, fair: bool) -> EngineResult<bool> {
        let mut replay = ReplayStrategy::new(report.schedule.clone(), 0, fair);
        let mut detector = self.detector();
        let record = self.run_iteration(program, &mut replay, detector.as_mut())?;

        if let Some(divergence) = replay.divergence() {
            debug!(%divergence, "replay diverged");
            return Ok(false);
        }
        Ok(matches!(&record.outcome, IterationOutcome::Bug(bug) if bug.same_kind(&report.bug)))
    }
}

/// The entity treated as running: the last scheduled one if it is still
/// known, else the first entity.
fn pick_current(choices: &[Schedulable], last: Option<SchedulableId>) -> Schedulable {
    last.and_then(|id| choices.iter().find(|c| c.id == id))
        .or_else(|| choices.iter().find(|c| c.enabled))
        .copied()
        .unwrap_or(choices[0])
}
