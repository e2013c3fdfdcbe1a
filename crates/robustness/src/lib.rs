//! Robustness evaluation for the rigor backtesting engine.
//!
//! This crate handles:
//! - Monte Carlo resampling of realized trades with a composite robustness grade
//! - Parallel grid search over strategy parameters
//! - Rolling walk-forward optimization with chained out-of-sample equity
//! - Parameter stability verdicts

pub mod monte_carlo;
pub mod optimize;
pub mod stability;
pub mod walk_forward;

pub use monte_carlo::{
    robustness_grade, robustness_score, DistributionStats, FanChart, MonteCarloResult,
    MonteCarloSimulator,
};
pub use optimize::{grid_search, SweepResult};
pub use stability::{ParamStability, ParameterDispersion, Recommendation};
pub use walk_forward::{
    compute_windows, WalkForwardAnalyzer, WalkForwardResult, WalkForwardWindow, WindowBounds,
};
