//! Scheduling strategies for systematic testing of actor programs.
//!
//! A runtime under test hands every decision point (which entity runs next,
//! or a boolean/integer value) to a [`SchedulingStrategy`]. Strategies range
//! from exhaustive search ([`DfsStrategy`], [`IterativeDeepeningDfsStrategy`])
//! to statistical exploration ([`RandomStrategy`], [`PctStrategy`],
//! [`RandomDelayBoundingStrategy`]), and compose through [`ComboStrategy`]
//! and [`ReductionStrategy`].

pub mod combo;
pub mod config;
pub mod delay;
pub mod dfs;
pub mod iterative;
pub mod pct;
pub mod random;
pub mod reduction;
pub mod replay;
pub mod schedulable;
pub mod strategy;

pub use combo::ComboStrategy;
pub use config::{ConfigError, StrategyConfig, StrategyKind};
pub use delay::RandomDelayBoundingStrategy;
pub use dfs::DfsStrategy;
pub use iterative::IterativeDeepeningDfsStrategy;
pub use pct::PctStrategy;
pub use random::RandomStrategy;
pub use reduction::{ReductionPolicy, ReductionStrategy};
pub use replay::{Divergence, ReplayStrategy, ScheduleDecision};
pub use schedulable::{NondetValue, OperationKind, Schedulable, SchedulableId};
pub use strategy::{BoxedStrategy, SchedulingStrategy};
