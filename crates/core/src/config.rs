//! Configuration structures for the rigor backtesting engine.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Metric;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Execution cost model and account size.
    pub backtest: BacktestConfig,
    /// Monte Carlo settings.
    pub monte_carlo: MonteCarloConfig,
    /// Walk-forward settings.
    pub walk_forward: WalkForwardConfig,
}

impl Config {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.backtest.validate()?;
        self.monte_carlo.validate()?;
        self.walk_forward.validate()
    }
}

/// Backtest configuration. Immutable for the duration of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Starting cash balance.
    pub initial_balance: f64,
    /// Flat commission charged per side (entry and exit each).
    pub commission: f64,
    /// Slippage applied against the trader on market fills, in ticks.
    pub slippage_ticks: u32,
    /// Currency value of a one-point price move for one contract.
    pub point_value: f64,
    /// Minimum price increment.
    pub tick_size: f64,
    /// Size used by vectorized runs, whose signals carry no size.
    pub position_size: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_balance: 100_000.0,
            commission: 0.0,
            slippage_ticks: 0,
            point_value: 1.0,
            tick_size: 0.01,
            position_size: 1.0,
        }
    }
}

impl BacktestConfig {
    /// Price offset applied by slippage.
    #[inline]
    pub fn slippage(&self) -> f64 {
        self.slippage_ticks as f64 * self.tick_size
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.initial_balance > 0.0) {
            return Err(Error::config("initial_balance must be positive"));
        }
        if self.commission < 0.0 {
            return Err(Error::config("commission must not be negative"));
        }
        if !(self.point_value > 0.0) {
            return Err(Error::config("point_value must be positive"));
        }
        if !(self.tick_size > 0.0) {
            return Err(Error::config("tick_size must be positive"));
        }
        if !(self.position_size > 0.0) {
            return Err(Error::config("position_size must be positive"));
        }
        Ok(())
    }
}

/// Monte Carlo resampling model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonteCarloMethod {
    /// Random permutation of the realized trades.
    Reshuffle,
    /// Bootstrap: draw trades with replacement.
    Resample,
    /// Drop a random subset of trades (replaced by zero).
    Skip,
    /// All three, plus a composite robustness grade.
    Full,
}

impl MonteCarloMethod {
    pub fn name(self) -> &'static str {
        match self {
            MonteCarloMethod::Reshuffle => "reshuffle",
            MonteCarloMethod::Resample => "resample",
            MonteCarloMethod::Skip => "skip",
            MonteCarloMethod::Full => "full",
        }
    }
}

impl fmt::Display for MonteCarloMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Monte Carlo configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    /// Number of simulated paths per method.
    pub num_simulations: usize,
    /// A path is ruined when equity falls below `initial * (1 - pct / 100)`.
    pub ruin_threshold_pct: f64,
    /// Percentage of trades dropped per path by the skip method.
    pub skip_pct: f64,
    /// Seed for every random draw.
    pub seed: u64,
    /// Resampling model.
    pub method: MonteCarloMethod,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            num_simulations: 1000,
            ruin_threshold_pct: 50.0,
            skip_pct: 10.0,
            seed: 42,
            method: MonteCarloMethod::Reshuffle,
        }
    }
}

impl MonteCarloConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_simulations(mut self, n: usize) -> Self {
        self.num_simulations = n;
        self
    }

    pub fn with_method(mut self, method: MonteCarloMethod) -> Self {
        self.method = method;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_simulations == 0 {
            return Err(Error::config("num_simulations must be at least 1"));
        }
        if !(0.0..=100.0).contains(&self.ruin_threshold_pct) {
            return Err(Error::config("ruin_threshold_pct must be within 0-100"));
        }
        if !(0.0..=100.0).contains(&self.skip_pct) {
            return Err(Error::config("skip_pct must be within 0-100"));
        }
        Ok(())
    }
}

/// Walk-forward configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    /// Number of contiguous windows.
    pub num_windows: usize,
    /// Fraction of each window used for in-sample optimization.
    pub is_ratio: f64,
    /// Metric maximized by the grid search.
    pub optimize_metric: Metric,
    /// Windows whose IS or OOS slice is shorter than this are skipped; empty
    /// slices are skipped even when it is 0.
    pub min_window_bars: usize,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            num_windows: 5,
            is_ratio: 0.7,
            optimize_metric: Metric::ProfitFactor,
            min_window_bars: 2,
        }
    }
}

impl WalkForwardConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_windows == 0 {
            return Err(Error::config("num_windows must be at least 1"));
        }
        if !(self.is_ratio > 0.0 && self.is_ratio < 1.0) {
            return Err(Error::config("is_ratio must be strictly between 0 and 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.monte_carlo.method, MonteCarloMethod::Reshuffle);
        assert_eq!(config.walk_forward.num_windows, 5);
        assert_eq!(config.walk_forward.optimize_metric, Metric::ProfitFactor);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = Config::from_json_str(
            r#"{
                "backtest": { "commission": 2.5, "slippage_ticks": 1, "point_value": 20.0, "tick_size": 0.25 },
                "monte_carlo": { "method": "full", "seed": 7 },
                "walk_forward": { "optimize_metric": "sharpe_ratio" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.backtest.commission, 2.5);
        assert_eq!(config.backtest.initial_balance, 100_000.0);
        assert_eq!(config.backtest.slippage(), 0.25);
        assert_eq!(config.monte_carlo.method, MonteCarloMethod::Full);
        assert_eq!(config.monte_carlo.num_simulations, 1000);
        assert_eq!(config.walk_forward.optimize_metric, Metric::SharpeRatio);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let bad = r#"{ "walk_forward": { "is_ratio": 1.0 } }"#;
        assert!(matches!(Config::from_json_str(bad), Err(Error::Config(_))));

        let bad = r#"{ "backtest": { "initial_balance": 0.0 } }"#;
        assert!(matches!(Config::from_json_str(bad), Err(Error::Config(_))));

        let bad = r#"{ "monte_carlo": { "skip_pct": 150.0 } }"#;
        assert!(Config::from_json_str(bad).is_err());

        assert!(matches!(Config::from_json_str("{ nope"), Err(Error::Json(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Config::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
