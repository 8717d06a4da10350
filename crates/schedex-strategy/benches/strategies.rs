//! Criterion benchmarks for per-decision strategy cost.
//!
//! Run with: cargo bench -p schedex-strategy

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use schedex_strategy::{
    OperationKind, ReductionPolicy, Schedulable, StrategyConfig, StrategyKind,
};

fn entities(n: u64) -> Vec<Schedulable> {
    (0..n)
        .map(|i| {
            let op = if i % 2 == 0 { OperationKind::Send } else { OperationKind::Receive };
            Schedulable::new(i, op)
        })
        .collect()
}

/// One benchmark iteration: `runs` runs of `steps` decisions each.
fn bench_strategy(c: &mut Criterion, name: &str, config: StrategyConfig, entity_count: u64, steps: usize, runs: usize) {
    let choices = entities(entity_count);
    c.bench_function(name, |b| {
        b.iter(|| {
            let mut strategy = config.build().unwrap();
            for _ in 0..runs {
                for _ in 0..steps {
                    let next = strategy.get_next(&choices, &choices[0]);
                    black_box(next);
                    if strategy.has_reached_max_scheduling_steps() {
                        break;
                    }
                }
                if !strategy.prepare_for_next_iteration() {
                    break;
                }
            }
        })
    });
}

fn benchmarks(c: &mut Criterion) {
    let random = StrategyConfig {
        kind: StrategyKind::Random,
        seed: 1,
        ..Default::default()
    };
    bench_strategy(c, "random_8x200", random, 8, 200, 50);

    let pct = StrategyConfig {
        kind: StrategyKind::Pct,
        seed: 1,
        priority_switch_points: 3,
        ..Default::default()
    };
    bench_strategy(c, "pct_8x200", pct, 8, 200, 50);

    let dfs = StrategyConfig {
        kind: StrategyKind::Dfs,
        ..Default::default()
    };
    // 3^6 schedules, explored to exhaustion.
    bench_strategy(c, "dfs_3x6_exhaustive", dfs, 3, 6, usize::MAX);

    let reduced = StrategyConfig {
        kind: StrategyKind::Random,
        seed: 1,
        reduction: ReductionPolicy::ForceSchedule,
        ..Default::default()
    };
    bench_strategy(c, "random_force_schedule_8x200", reduced, 8, 200, 50);
}

criterion_group!(benches, benchmarks);
criterion_main!(benches);
