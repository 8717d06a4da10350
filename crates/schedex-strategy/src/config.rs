//! Strategy selection and construction from plain parameters.

use crate::combo::ComboStrategy;
use crate::delay::RandomDelayBoundingStrategy;
use crate::dfs::DfsStrategy;
use crate::iterative::IterativeDeepeningDfsStrategy;
use crate::pct::PctStrategy;
use crate::random::RandomStrategy;
use crate::reduction::{ReductionPolicy, ReductionStrategy};
use crate::strategy::BoxedStrategy;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Rejected strategy parameters. Raised at construction, never while exploring.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("PCT needs at least one priority switch point")]
    ZeroSwitchPoints,

    #[error("iterative deepening needs a maximum depth (set max depth or max steps)")]
    ZeroMaxDepth,

    #[error("a combo strategy needs a non-zero prefix step bound")]
    ComboWithoutPrefixBound,

    #[error("combo strategies cannot be nested")]
    NestedCombo,

    #[error("unknown strategy '{0}' (expected random, pct, dfs, iddfs, delay-bounding or <prefix>+<suffix>)")]
    UnknownStrategy(String),

    #[error("unknown reduction policy '{0}' (expected none, force or omit)")]
    UnknownReduction(String),
}

/// Which strategy to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyKind {
    Random,
    Pct,
    Dfs,
    IterativeDeepening,
    DelayBounding,
    Combo(Box<StrategyKind>, Box<StrategyKind>),
}

impl StrategyKind {
    /// Every non-composite kind, in display order.
    pub const BASE: [StrategyKind; 5] = [
        StrategyKind::Random,
        StrategyKind::Pct,
        StrategyKind::Dfs,
        StrategyKind::IterativeDeepening,
        StrategyKind::DelayBounding,
    ];

    pub fn combo(prefix: StrategyKind, suffix: StrategyKind) -> Self {
        StrategyKind::Combo(Box::new(prefix), Box::new(suffix))
    }

    fn parse_base(s: &str) -> Result<Self, ConfigError> {
        match s.trim() {
            "random" => Ok(StrategyKind::Random),
            "pct" => Ok(StrategyKind::Pct),
            "dfs" => Ok(StrategyKind::Dfs),
            "iddfs" => Ok(StrategyKind::IterativeDeepening),
            "delay-bounding" => Ok(StrategyKind::DelayBounding),
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('+') {
            Some((_, suffix)) if suffix.contains('+') => Err(ConfigError::NestedCombo),
            Some((prefix, suffix)) => Ok(StrategyKind::combo(
                StrategyKind::parse_base(prefix)?,
                StrategyKind::parse_base(suffix)?,
            )),
            None => StrategyKind::parse_base(s),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Random => f.write_str("random"),
            StrategyKind::Pct => f.write_str("pct"),
            StrategyKind::Dfs => f.write_str("dfs"),
            StrategyKind::IterativeDeepening => f.write_str("iddfs"),
            StrategyKind::DelayBounding => f.write_str("delay-bounding"),
            StrategyKind::Combo(prefix, suffix) => write!(f, "{}+{}", prefix, suffix),
        }
    }
}

/// Parameters for building a strategy; unused fields are ignored by kinds
/// that do not need them.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub kind: StrategyKind,
    /// Step bound per run (0 = unbounded). For a combo this bounds the suffix.
    pub max_steps: usize,
    pub seed: u64,
    pub priority_switch_points: usize,
    pub max_delays: usize,
    /// Iterative-deepening limit; 0 falls back to `max_steps`.
    pub max_depth: usize,
    /// Step bound of a combo's prefix.
    pub prefix_steps: usize,
    pub reduction: ReductionPolicy,
    pub reduction_step_limit: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            kind: StrategyKind::Random,
            max_steps: 0,
            seed: 0,
            priority_switch_points: 2,
            max_delays: 2,
            max_depth: 0,
            prefix_steps: 0,
            reduction: ReductionPolicy::None,
            reduction_step_limit: 0,
        }
    }
}

impl StrategyConfig {
    /// Build the configured strategy, wrapped in a reduction layer when one
    /// is selected.
    pub fn build(&self) -> Result<BoxedStrategy, ConfigError> {
        let strategy = match &self.kind {
            StrategyKind::Combo(prefix, suffix) => {
                if self.prefix_steps == 0 {
                    return Err(ConfigError::ComboWithoutPrefixBound);
                }
                let prefix = self.build_base(prefix, self.prefix_steps, self.seed)?;
                let suffix = self.build_base(suffix, self.max_steps, self.seed.wrapping_add(1))?;
                Box::new(ComboStrategy::new(prefix, suffix))
            }
            base => self.build_base(base, self.max_steps, self.seed)?,
        };

        Ok(match self.reduction {
            ReductionPolicy::None => strategy,
            policy => Box::new(ReductionStrategy::new(strategy, policy, self.reduction_step_limit)),
        })
    }

    fn build_base(&self, kind: &StrategyKind, max_steps: usize, seed: u64) -> Result<BoxedStrategy, ConfigError> {
        Ok(match kind {
            StrategyKind::Random => Box::new(RandomStrategy::new(max_steps, seed)),
            StrategyKind::Pct => Box::new(PctStrategy::new(max_steps, self.priority_switch_points, seed)?),
            StrategyKind::Dfs => Box::new(DfsStrategy::new(max_steps)),
            StrategyKind::IterativeDeepening => {
                let depth = if self.max_depth == 0 { max_steps } else { self.max_depth };
                Box::new(IterativeDeepeningDfsStrategy::new(depth)?)
            }
            StrategyKind::DelayBounding => {
                Box::new(RandomDelayBoundingStrategy::new(max_steps, self.max_delays, seed))
            }
            StrategyKind::Combo(..) => return Err(ConfigError::NestedCombo),
        })
    }
}
