//! Command-line interface for the schedex systematic-testing engine.

use clap::{Parser, Subcommand};
use miette::Diagnostic;
use schedex_engine::{run_parallel, BugReport, EngineConfig, EngineError, ParallelReport, TestEngine, Workload};
use schedex_strategy::{ConfigError, ReductionPolicy, StrategyConfig, StrategyKind};
use std::time::Instant;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CLI error, rendered through miette.
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("{message}")]
    #[diagnostic(code(schedex::usage))]
    Usage { message: String },

    #[error(transparent)]
    #[diagnostic(code(schedex::config), help("run `schedex strategies --help` for the accepted values"))]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(code(schedex::engine))]
    Engine(#[from] EngineError),

    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "schedex", version)]
#[command(about = "Systematic concurrency testing with pluggable scheduling strategies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Strategy selection shared by every subcommand.
#[derive(clap::Args, Debug, Clone)]
struct StrategyArgs {
    /// random, pct, dfs, iddfs, delay-bounding, or <prefix>+<suffix>
    #[arg(short, long, default_value = "random")]
    strategy: String,

    /// Step bound per iteration (0 = unbounded)
    #[arg(long, default_value = "0")]
    max_steps: usize,

    #[arg(long, default_value = "0")]
    seed: u64,

    /// PCT priority switch points
    #[arg(long, default_value = "2")]
    switch_points: usize,

    /// Delays per iteration for delay-bounding
    #[arg(long, default_value = "2")]
    max_delays: usize,

    /// Iterative-deepening depth limit (0 = use --max-steps)
    #[arg(long, default_value = "0")]
    max_depth: usize,

    /// Step bound of a combo strategy's prefix
    #[arg(long, default_value = "0")]
    prefix_steps: usize,

    /// none, force or omit
    #[arg(long, default_value = "none")]
    reduction: String,

    /// Step bound of the reduction layer (0 = report the wrapped strategy's)
    #[arg(long, default_value = "0")]
    reduction_steps: usize,
}

impl StrategyArgs {
    fn config(&self) -> CliResult<StrategyConfig> {
        Ok(StrategyConfig {
            kind: self.strategy.parse()?,
            max_steps: self.max_steps,
            seed: self.seed,
            priority_switch_points: self.switch_points,
            max_delays: self.max_delays,
            max_depth: self.max_depth,
            prefix_steps: self.prefix_steps,
            reduction: self.reduction.parse::<ReductionPolicy>()?,
            reduction_step_limit: self.reduction_steps,
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Test a built-in workload
    Run {
        /// racy-counter, lock-order, lossy-retry or token-ring
        #[arg(value_name = "WORKLOAD")]
        workload: String,

        #[command(flatten)]
        strategy: StrategyArgs,

        /// Iterations per worker (0 = until the strategy is exhausted)
        #[arg(short, long, default_value = "100")]
        iterations: usize,

        /// Check liveness through fair-cycle detection
        #[arg(long)]
        liveness: bool,

        /// Steps per iteration before states are captured for cycle detection
        #[arg(long, default_value = "0")]
        safety_prefix: usize,

        /// Keep going after the first bug
        #[arg(long)]
        keep_going: bool,

        /// Skip replaying bugs to confirm they reproduce
        #[arg(long)]
        no_replay: bool,

        /// Independent workers, seeded seed, seed+1, ...
        #[arg(short, long, default_value = "1")]
        workers: usize,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Describe every strategy kind as built from the given flags
    Strategies {
        #[command(flatten)]
        strategy: StrategyArgs,
    },

    /// List the built-in workloads
    Workloads,
}

fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .build(),
        )
    }))
    .ok();

    let cli = Cli::parse();

    let filter = if matches!(&cli.command, Commands::Run { verbose: true, .. }) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let result = match cli.command {
        Commands::Run {
            workload,
            strategy,
            iterations,
            liveness,
            safety_prefix,
            keep_going,
            no_replay,
            workers,
            json,
            verbose: _,
        } => {
            let engine = EngineConfig {
                iterations,
                check_liveness: liveness,
                safety_prefix_bound: safety_prefix,
                stop_on_first_bug: !keep_going,
                verify_replay: !no_replay,
            };
            cmd_run(&workload, &strategy, engine, workers, json)
        }
        Commands::Strategies { strategy } => cmd_strategies(&strategy),
        Commands::Workloads => {
            cmd_workloads();
            Ok(false)
        }
    };

    match result {
        Ok(true) => std::process::exit(1),
        Ok(false) => {}
        Err(e) => {
            eprintln!("{:?}", miette::Report::new(e));
            std::process::exit(2);
        }
    }
}

/// Returns whether a bug was found.
fn cmd_run(workload: &str, args: &StrategyArgs, engine: EngineConfig, workers: usize, json: bool) -> CliResult<bool> {
    let workload: Workload = workload.parse().map_err(|message| CliError::Usage { message })?;
    let strategy = args.config()?;
    let start = Instant::now();

    if workers > 1 {
        let report = run_parallel(&engine, &strategy, workers, || workload.build())?;
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_parallel(&report, start.elapsed().as_secs_f64());
        }
        return Ok(report.found_bug());
    }

    let mut program = workload.build();
    let mut built = strategy.build()?;
    info!(workload = %workload, "testing");
    let report = TestEngine::new(engine).run(&mut program, &mut built)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(report.found_bug());
    }

    println!();
    println!("Program: {}", report.program);
    println!("Strategy: {}", report.strategy);
    println!("  Iterations: {}", report.iterations);
    println!("  Completed: {}", report.outcomes.completed);
    println!("  Step bound reached: {}", report.outcomes.step_bound_reached);
    println!("  Prefix exhausted: {}", report.outcomes.prefix_exhausted);
    println!("  Max steps: {}", report.max_steps_observed);
    println!("  Search space exhausted: {}", report.exhausted);
    println!("  Time: {:.2}s", start.elapsed().as_secs_f64());
    if report.bugs.is_empty() {
        println!("Result: OK");
    }
    for bug in &report.bugs {
        print_bug(bug);
    }
    Ok(report.found_bug())
}

fn print_parallel(report: &ParallelReport, secs: f64) {
    println!();
    println!("Workers: {}", report.workers.len());
    for (i, worker) in report.workers.iter().enumerate() {
        println!(
            "  #{}: {} iterations, {} bugs ({})",
            i,
            worker.iterations,
            worker.bugs.len(),
            worker.strategy
        );
    }
    println!("  Total iterations: {}", report.iterations());
    println!("  Bugs: {} ({} distinct)", report.total_bugs, report.distinct_bugs.len());
    println!("  Time: {:.2}s", secs);
    if report.distinct_bugs.is_empty() {
        println!("Result: OK");
    }
    for bug in &report.distinct_bugs {
        print_bug(bug);
    }
}

fn print_bug(bug: &BugReport) {
    println!();
    println!("Result: BUG");
    println!("  {}", bug.bug);
    println!(
        "  Found by worker {} in iteration {} after {} steps",
        bug.worker, bug.iteration, bug.steps
    );
    match bug.reproducible {
        Some(true) => println!("  Replay: reproduced"),
        Some(false) => println!("  Replay: NOT reproduced"),
        None => {}
    }
    println!("  Schedule ({} decisions):", bug.schedule.len());
    for (i, decision) in bug.schedule.iter().enumerate() {
        println!("    {}: {}", i, decision);
    }
}

fn cmd_strategies(args: &StrategyArgs) -> CliResult<bool> {
    let base = args.config()?;
    let mut kinds: Vec<StrategyKind> = StrategyKind::BASE.to_vec();
    kinds.push(StrategyKind::combo(StrategyKind::Random, StrategyKind::Dfs));

    for kind in kinds {
        let mut config = base.clone();
        // Give combos a usable prefix bound even when none was requested.
        if matches!(kind, StrategyKind::Combo(..)) && config.prefix_steps == 0 {
            config.prefix_steps = 10;
        }
        config.kind = kind.clone();
        match config.build() {
            Ok(strategy) => println!("{:<22} {}", kind.to_string(), strategy.description()),
            Err(e) => println!("{:<22} (invalid: {})", kind.to_string(), e),
        }
    }
    Ok(false)
}

fn cmd_workloads() {
    for workload in Workload::all() {
        println!("{:<14} {}", workload.name(), workload.summary());
    }
}
