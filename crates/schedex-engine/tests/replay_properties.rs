//! Any recorded iteration replays to the same outcome.

use proptest::prelude::*;
use schedex_engine::{EngineConfig, IterationOutcome, TestEngine, Workload};
use schedex_strategy::{PctStrategy, RandomStrategy, ReplayStrategy, SchedulingStrategy};

fn workload() -> impl Strategy<Value = Workload> {
    prop::sample::select(Workload::all().to_vec())
}

fn replays_identically(workload: Workload, strategy: &mut dyn SchedulingStrategy) -> Result<(), TestCaseError> {
    let engine = TestEngine::new(EngineConfig {
        check_liveness: true,
        ..EngineConfig::default()
    });
    let mut program = workload.build();

    let recorded = engine.run_iteration(&mut program, strategy, None).unwrap();
    // A step-bounded run ends right after its last decision; so does the replay.
    let max_steps = match recorded.outcome {
        IterationOutcome::StepBoundReached => recorded.schedule.len(),
        _ => 0,
    };
    let mut replay = ReplayStrategy::new(recorded.schedule.clone(), max_steps, false);
    let replayed = engine.run_iteration(&mut program, &mut replay, None).unwrap();

    prop_assert!(replay.divergence().is_none());
    prop_assert!(replay.is_complete());
    prop_assert_eq!(replayed.schedule, recorded.schedule);
    prop_assert_eq!(replayed.outcome, recorded.outcome);
    Ok(())
}

proptest! {
    #[test]
    fn random_iterations_replay(workload in workload(), seed in any::<u64>(), max_steps in 4usize..40) {
        let mut random = RandomStrategy::new(max_steps, seed);
        replays_identically(workload, &mut random)?;
    }

    #[test]
    fn pct_iterations_replay(workload in workload(), seed in any::<u64>(), switches in 1usize..4) {
        let mut pct = PctStrategy::new(30, switches, seed).unwrap();
        replays_identically(workload, &mut pct)?;
    }
}
