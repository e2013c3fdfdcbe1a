//! Backtesting engine for the rigor workspace.
//!
//! This crate provides:
//! - Bar-by-bar simulation of incremental strategies
//! - Vectorized simulation with an optional accelerated backend
//! - Flat commission and tick slippage accounting
//! - Position tracking and P&L calculation
//! - Performance metrics

pub mod accelerated;
pub mod fill_model;
pub mod metrics;
pub mod position;
pub mod simulator;
pub mod vectorized;

pub use accelerated::{BackendOutput, BackendRequest, BackendTrade, PortfolioBackend};
pub use fill_model::{Fill, FillModel};
pub use metrics::{BacktestMetrics, MetricsCalculator, PROFIT_FACTOR_SENTINEL};
pub use position::{ExitReason, Ledger, Position, Trade};
pub use simulator::{BacktestResult, BacktestSimulator};
pub use vectorized::VectorizedSimulator;

use rigor_core::{BacktestConfig, Bar, Result, StrategyKind};

/// Run either strategy shape with the reference simulators.
pub fn run_backtest(
    strategy: StrategyKind<'_>,
    bars: &[Bar],
    config: &BacktestConfig,
) -> Result<BacktestResult> {
    match strategy {
        StrategyKind::Incremental(s) => BacktestSimulator::new(config.clone()).run(s, bars),
        StrategyKind::Vectorized(s) => VectorizedSimulator::new(config.clone()).run(s, bars),
    }
}
