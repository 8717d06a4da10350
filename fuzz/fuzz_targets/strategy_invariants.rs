#![no_main]
use libfuzzer_sys::fuzz_target;
use schedex_strategy::{
    OperationKind, PctStrategy, ReductionPolicy, Schedulable, SchedulingStrategy, StrategyConfig,
    StrategyKind,
};

const KINDS: [&str; 6] = ["random", "pct", "dfs", "iddfs", "delay-bounding", "random+dfs"];
const REDUCTIONS: [ReductionPolicy; 3] = [
    ReductionPolicy::None,
    ReductionPolicy::ForceSchedule,
    ReductionPolicy::OmitSchedulingPoints,
];

/// Byte `i` of the input picks the enabled mask and next operations of step `i`.
fn snapshot(byte: u8) -> Vec<Schedulable> {
    (0..4u64)
        .map(|i| {
            let op = if byte & (0x10 << i) != 0 {
                OperationKind::Send
            } else {
                OperationKind::Receive
            };
            let mut s = Schedulable::new(i, op);
            s.enabled = byte & (1 << i) != 0;
            s
        })
        .collect()
}

/// Change points stay inside the observed schedule length and a run never
/// demotes more often than allowed.
fn check_pct(switches: usize, seed: u64, steps: &[u8]) {
    let Ok(mut pct) = PctStrategy::new(0, switches, seed) else {
        return;
    };
    for _ in 0..4 {
        for &byte in steps.iter().take(32) {
            let choices = snapshot(byte | 0x01);
            if pct.get_next(&choices, &choices[0]).is_none() {
                break;
            }
        }
        assert!(pct.switches_this_iteration() <= switches);
        pct.prepare_for_next_iteration();
        assert!(pct
            .priority_change_points()
            .iter()
            .all(|&p| p < pct.schedule_length()));
    }
}

fuzz_target!(|data: &[u8]| {
    let [kind, reduction, seed, rest @ ..] = data else {
        return;
    };
    check_pct(1 + (*kind as usize % 4), *seed as u64, rest);

    let Ok(kind) = KINDS[*kind as usize % KINDS.len()].parse::<StrategyKind>() else {
        return;
    };
    let config = StrategyConfig {
        kind,
        max_steps: 32,
        seed: *seed as u64,
        prefix_steps: 4,
        reduction: REDUCTIONS[*reduction as usize % REDUCTIONS.len()],
        ..StrategyConfig::default()
    };
    let Ok(mut strategy) = config.build() else {
        return;
    };

    for _ in 0..4 {
        let mut last = 0;
        for &byte in rest.iter().take(32) {
            let choices = snapshot(byte);
            let current = choices[last as usize];
            match strategy.get_next(&choices, &current) {
                Some(next) => {
                    assert!(
                        choices.iter().any(|c| c.id == next.id && c.enabled),
                        "{} chose a disabled entity",
                        strategy.description()
                    );
                    last = next.id.as_u64();
                }
                None => break,
            }
            if byte & 0x80 != 0 {
                if let Some(n) = strategy.get_next_integer(3) {
                    assert!(n < 3);
                }
            }
            if strategy.has_reached_max_scheduling_steps() {
                break;
            }
        }
        if !strategy.prepare_for_next_iteration() {
            break;
        }
    }
});
