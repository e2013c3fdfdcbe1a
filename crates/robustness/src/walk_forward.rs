//! Rolling walk-forward analysis.
//!
//! The series is cut into contiguous, non-overlapping windows. Each window is
//! split into an in-sample (IS) head, where the parameter grid is searched,
//! and an out-of-sample (OOS) tail, where the winning parameters are traded
//! with the balance carried over from the previous window's OOS run. The OOS
//! runs chain into one continuous equity curve.

use rigor_backtest::{BacktestMetrics, BacktestSimulator, MetricsCalculator, Trade};
use rigor_core::stats::{mean, safe_div};
use rigor_core::{
    format_date, validate_bars, BacktestConfig, Bar, EquityPoint, Error, ParamGrid, ParamSet,
    Result, Strategy, WalkForwardConfig,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::optimize::grid_search;
use crate::stability::ParamStability;

/// Bar-index bounds of one window: IS is `[start, split)`, OOS is `[split, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub index: usize,
    pub start: usize,
    pub split: usize,
    pub end: usize,
}

impl WindowBounds {
    pub fn is_bars(&self) -> usize {
        self.split - self.start
    }

    pub fn oos_bars(&self) -> usize {
        self.end - self.split
    }
}

/// Split `total_bars` into `num_windows` windows of `total_bars / num_windows`
/// bars each. Any remainder shorter than one window is left at the end.
pub fn compute_windows(total_bars: usize, num_windows: usize, is_ratio: f64) -> Vec<WindowBounds> {
    if num_windows == 0 {
        return Vec::new();
    }
    let size = total_bars / num_windows;
    if size == 0 {
        return Vec::new();
    }
    let is_len = ((size as f64 * is_ratio).round() as usize).min(size);

    (0..num_windows)
        .map(|index| {
            let start = index * size;
            WindowBounds {
                index,
                start,
                split: start + is_len,
                end: start + size,
            }
        })
        .collect()
}

/// Outcome of one walk-forward window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardWindow {
    pub index: usize,
    pub bounds: WindowBounds,
    pub is_start_date: String,
    pub is_end_date: String,
    pub oos_start_date: String,
    pub oos_end_date: String,
    pub is_bars: usize,
    pub oos_bars: usize,
    pub best_params: ParamSet,
    /// Objective value of `best_params` in sample.
    pub best_score: f64,
    pub is_metrics: BacktestMetrics,
    pub oos_metrics: BacktestMetrics,
    pub oos_start_balance: f64,
    pub oos_end_balance: f64,
}

/// Aggregate walk-forward outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardResult {
    pub windows: Vec<WalkForwardWindow>,
    /// Windows too short to split, or with no valid parameter combination.
    pub skipped_windows: usize,
    /// All OOS trades, renumbered, with bar indices into the full series.
    pub oos_trades: Vec<Trade>,
    pub oos_equity_curve: Vec<EquityPoint>,
    /// Metrics over every OOS trade.
    pub aggregate_oos_metrics: BacktestMetrics,
    pub mean_is_profit_factor: f64,
    /// Aggregate OOS profit factor / mean IS profit factor.
    pub robustness_ratio: f64,
    pub stability: ParamStability,
}

/// Walk-forward analyzer.
#[derive(Debug, Clone)]
pub struct WalkForwardAnalyzer {
    backtest: BacktestConfig,
    config: WalkForwardConfig,
}

impl WalkForwardAnalyzer {
    pub fn new(backtest: BacktestConfig, config: WalkForwardConfig) -> Self {
        Self { backtest, config }
    }

    /// Optimize on each IS slice and trade the winner on the following OOS slice.
    pub fn run<S, F>(&self, bars: &[Bar], grid: &ParamGrid, factory: F) -> Result<WalkForwardResult>
    where
        S: Strategy,
        F: Fn(&ParamSet) -> anyhow::Result<S> + Sync,
    {
        self.config.validate()?;
        validate_bars(bars)?;

        let metric = self.config.optimize_metric;
        let bounds = compute_windows(bars.len(), self.config.num_windows, self.config.is_ratio);
        if bounds.is_empty() {
            warn!(
                bars = bars.len(),
                windows = self.config.num_windows,
                "Not enough bars for a single walk-forward window"
            );
        }

        let mut windows = Vec::with_capacity(bounds.len());
        let mut skipped_windows = 0;
        let mut oos_trades: Vec<Trade> = Vec::new();
        let mut oos_equity_curve = Vec::new();
        let mut balance = self.backtest.initial_balance;
        // Both slices need at least one bar to be simulated and dated
        let min_bars = self.config.min_window_bars.max(1);

        for b in &bounds {
            if b.is_bars() < min_bars || b.oos_bars() < min_bars {
                warn!(window = b.index, is_bars = b.is_bars(), oos_bars = b.oos_bars(), "Skipping short window");
                skipped_windows += 1;
                continue;
            }

            let is_slice = &bars[b.start..b.split];
            let oos_slice = &bars[b.split..b.end];

            let ranked = grid_search(is_slice, grid, &factory, &self.backtest, metric)?;
            let Some(best) = ranked.into_iter().next() else {
                warn!(window = b.index, "No valid parameter combination, skipping window");
                skipped_windows += 1;
                continue;
            };

            let mut strategy = factory(&best.params).map_err(Error::strategy)?;
            let is_result = BacktestSimulator::new(self.backtest.clone()).run(&mut strategy, is_slice)?;

            let oos_config = BacktestConfig {
                initial_balance: balance,
                ..self.backtest.clone()
            };
            let oos_start_balance = balance;
            let oos_result = BacktestSimulator::new(oos_config).run(&mut strategy, oos_slice)?;
            balance = oos_result.final_equity;

            info!(
                window = b.index,
                params = ?best.params,
                is_score = best.score,
                oos_trades = oos_result.trades.len(),
                oos_pf = oos_result.metrics.profit_factor,
                balance,
                "Walk-forward window complete"
            );

            for mut trade in oos_result.trades {
                trade.id = oos_trades.len() as u64 + 1;
                trade.entry_index += b.split;
                trade.exit_index += b.split;
                oos_trades.push(trade);
            }
            oos_equity_curve.extend(oos_result.equity_curve);

            windows.push(WalkForwardWindow {
                index: b.index,
                bounds: *b,
                is_start_date: format_date(is_slice[0].time),
                is_end_date: format_date(is_slice[is_slice.len() - 1].time),
                oos_start_date: format_date(oos_slice[0].time),
                oos_end_date: format_date(oos_slice[oos_slice.len() - 1].time),
                is_bars: is_slice.len(),
                oos_bars: oos_slice.len(),
                best_params: best.params,
                best_score: best.score,
                is_metrics: is_result.metrics,
                oos_metrics: oos_result.metrics,
                oos_start_balance,
                oos_end_balance: balance,
            });
        }

        let aggregate_oos_metrics =
            MetricsCalculator::new(self.backtest.initial_balance).calculate(&oos_trades);
        let is_pfs: Vec<f64> = windows.iter().map(|w| w.is_metrics.profit_factor).collect();
        let mean_is_profit_factor = mean(&is_pfs);
        let robustness_ratio = if mean_is_profit_factor > 0.0 {
            safe_div(aggregate_oos_metrics.profit_factor, mean_is_profit_factor, 0.0)
        } else {
            0.0
        };

        let best_params: Vec<ParamSet> = windows.iter().map(|w| w.best_params.clone()).collect();
        let oos_pfs: Vec<f64> = windows.iter().map(|w| w.oos_metrics.profit_factor).collect();
        let stability = ParamStability::assess(&best_params, &oos_pfs);

        info!(
            windows = windows.len(),
            skipped = skipped_windows,
            oos_trades = oos_trades.len(),
            robustness_ratio,
            recommendation = %stability.recommendation,
            "Walk-forward analysis complete"
        );

        Ok(WalkForwardResult {
            windows,
            skipped_windows,
            oos_trades,
            oos_equity_curve,
            aggregate_oos_metrics,
            mean_is_profit_factor,
            robustness_ratio,
            stability,
        })
    }
}
