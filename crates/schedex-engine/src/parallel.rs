//! Portfolio testing: independent engines on a local worker pool.

use crate::engine::{EngineConfig, EngineError, EngineResult, TestEngine};
use crate::program::Program;
use crate::report::{BugReport, TestReport};
use dashmap::DashMap;
use rayon::prelude::*;
use schedex_strategy::StrategyConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Results of all workers plus the bugs they found, deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelReport {
    pub workers: Vec<TestReport>,
    pub total_bugs: usize,
    /// One report per distinct bug description, from the earliest
    /// (iteration, worker) that hit it.
    pub distinct_bugs: Vec<BugReport>,
}

impl ParallelReport {
    pub fn found_bug(&self) -> bool {
        self.total_bugs > 0
    }

    pub fn iterations(&self) -> usize {
        self.workers.iter().map(|r| r.iterations).sum()
    }
}

/// Run `workers` engines in parallel, each on a fresh program from `factory`
/// and a strategy seeded with `strategy.seed + worker`.
pub fn run_parallel<F>(
    engine: &EngineConfig,
    strategy: &StrategyConfig,
    workers: usize,
    factory: F,
) -> EngineResult<ParallelReport>
where
    F: Fn() -> Box<dyn Program + Send> + Sync,
{
    let workers = workers.max(1);
    // Reject bad parameters once, before spawning anything.
    strategy.build()?;

    let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
    info!(workers, strategy = %strategy.kind, "starting parallel test run");

    let distinct: DashMap<String, BugReport> = DashMap::new();
    let reports: Vec<EngineResult<TestReport>> = pool.install(|| {
        (0..workers)
            .into_par_iter()
            .map(|worker| -> EngineResult<TestReport> {
                let mut config = strategy.clone();
                config.seed = strategy.seed.wrapping_add(worker as u64);
                let mut strategy = config.build()?;
                let mut program = factory();
                let report = TestEngine::new(engine.clone())
                    .with_worker(worker)
                    .run(&mut program, &mut strategy)?;

                for bug in &report.bugs {
                    distinct
                        .entry(bug.bug.to_string())
                        .and_modify(|kept| {
                            if (bug.iteration, bug.worker) < (kept.iteration, kept.worker) {
                                *kept = bug.clone();
                            }
                        })
                        .or_insert_with(|| bug.clone());
                }
                Ok(report)
            })
            .collect()
    });

    let workers = reports.into_iter().collect::<Result<Vec<_>, EngineError>>()?;
    let total_bugs = workers.iter().map(|r| r.bugs.len()).sum();
    let mut distinct_bugs: Vec<BugReport> = distinct.into_iter().map(|(_, bug)| bug).collect();
    distinct_bugs.sort_by(|a, b| (a.iteration, a.worker).cmp(&(b.iteration, b.worker)));

    info!(total_bugs, distinct = distinct_bugs.len(), "parallel test run finished");

    Ok(ParallelReport {
        workers,
        total_bugs,
        distinct_bugs,
    })
}
