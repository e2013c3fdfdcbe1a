//! Backtest performance metrics.
//!
//! Calculates performance statistics from a closed-trade list. Every ratio has
//! an explicit zero-denominator fallback so results stay finite.

use std::collections::BTreeMap;

use rigor_core::stats::{mean, safe_div, sample_std_dev};
use rigor_core::Metric;
use serde::{Deserialize, Serialize};

use crate::position::Trade;

/// Profit factor reported when there are profits but no losses.
pub const PROFIT_FACTOR_SENTINEL: f64 = 999.0;

/// Periods per year used to annualize per-trade Sharpe and Sortino.
const ANNUALIZATION_PERIODS: f64 = 252.0;

/// Backtest performance metrics.
///
/// Percentages are 0-100 except `win_rate` and `loss_rate`, which are 0-1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    /// Total number of trades.
    pub total_trades: u32,
    /// Trades with positive net P&L.
    pub winning_trades: u32,
    /// Trades with negative net P&L.
    pub losing_trades: u32,
    /// Win rate (0-1).
    pub win_rate: f64,
    /// Loss rate (0-1).
    pub loss_rate: f64,
    /// Net P&L (after commissions).
    pub total_return: f64,
    /// Net P&L as a percentage of the initial balance.
    pub total_return_pct: f64,
    /// Maximum peak-to-trough drawdown of closed-trade equity (absolute).
    pub max_drawdown: f64,
    /// Maximum drawdown percentage of the running peak.
    pub max_drawdown_pct: f64,
    pub max_consecutive_wins: u32,
    pub max_consecutive_losses: u32,
    /// Sum of winning net P&L.
    pub gross_profit: f64,
    /// Sum of losing net P&L, as a positive number.
    pub gross_loss: f64,
    /// Gross profit / gross loss.
    pub profit_factor: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Return % / max drawdown %.
    pub calmar_ratio: f64,
    /// Net P&L / max drawdown.
    pub recovery_factor: f64,
    /// Average net P&L per trade.
    pub expectancy: f64,
    /// Expectancy / |average loss|.
    pub expectancy_ratio: f64,
    /// Average win / |average loss|.
    pub payoff_ratio: f64,
    /// Average winning trade P&L.
    pub avg_win: f64,
    /// Average losing trade P&L (negative).
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub total_commission: f64,
    /// Average holding time in seconds.
    pub avg_trade_duration: f64,
    pub avg_mae: f64,
    pub avg_mfe: f64,
    /// Initial balance plus net P&L.
    pub final_equity: f64,
}

impl BacktestMetrics {
    /// Neutral record for a run without trades.
    pub fn neutral(initial_balance: f64) -> Self {
        Self {
            final_equity: initial_balance,
            ..Default::default()
        }
    }

    /// Value of a named metric.
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::TotalTrades => self.total_trades as f64,
            Metric::WinningTrades => self.winning_trades as f64,
            Metric::LosingTrades => self.losing_trades as f64,
            Metric::WinRate => self.win_rate,
            Metric::LossRate => self.loss_rate,
            Metric::TotalReturn => self.total_return,
            Metric::TotalReturnPct => self.total_return_pct,
            Metric::MaxDrawdown => self.max_drawdown,
            Metric::MaxDrawdownPct => self.max_drawdown_pct,
            Metric::MaxConsecutiveWins => self.max_consecutive_wins as f64,
            Metric::MaxConsecutiveLosses => self.max_consecutive_losses as f64,
            Metric::GrossProfit => self.gross_profit,
            Metric::GrossLoss => self.gross_loss,
            Metric::ProfitFactor => self.profit_factor,
            Metric::SharpeRatio => self.sharpe_ratio,
            Metric::SortinoRatio => self.sortino_ratio,
            Metric::CalmarRatio => self.calmar_ratio,
            Metric::RecoveryFactor => self.recovery_factor,
            Metric::Expectancy => self.expectancy,
            Metric::ExpectancyRatio => self.expectancy_ratio,
            Metric::PayoffRatio => self.payoff_ratio,
            Metric::AvgWin => self.avg_win,
            Metric::AvgLoss => self.avg_loss,
            Metric::LargestWin => self.largest_win,
            Metric::LargestLoss => self.largest_loss,
            Metric::TotalCommission => self.total_commission,
            Metric::AvgTradeDuration => self.avg_trade_duration,
            Metric::AvgMae => self.avg_mae,
            Metric::AvgMfe => self.avg_mfe,
            Metric::FinalEquity => self.final_equity,
        }
    }

    /// Name -> value map of every metric.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        Metric::ALL
            .iter()
            .map(|m| (m.name().to_string(), self.value(*m)))
            .collect()
    }
}

/// Closed-trade equity point used for drawdown.
#[derive(Debug, Clone)]
pub struct TradeEquityPoint {
    pub equity: f64,
    pub drawdown: f64,
    pub drawdown_pct: f64,
}

/// Metrics calculator.
pub struct MetricsCalculator {
    initial_balance: f64,
}

impl MetricsCalculator {
    /// Create a new metrics calculator.
    pub fn new(initial_balance: f64) -> Self {
        Self { initial_balance }
    }

    /// Calculate metrics from closed trades, in the order they closed.
    pub fn calculate(&self, trades: &[Trade]) -> BacktestMetrics {
        if trades.is_empty() {
            return BacktestMetrics::neutral(self.initial_balance);
        }

        let mut metrics = BacktestMetrics {
            total_trades: trades.len() as u32,
            ..Default::default()
        };

        let mut total_win_pnl = 0.0;
        let mut total_loss_pnl = 0.0;
        let mut current_wins = 0u32;
        let mut current_losses = 0u32;

        for trade in trades {
            let pnl = trade.net_pnl;
            metrics.total_return += pnl;
            metrics.total_commission += trade.commission;

            if pnl > 0.0 {
                metrics.winning_trades += 1;
                total_win_pnl += pnl;
                metrics.largest_win = metrics.largest_win.max(pnl);

                current_wins += 1;
                current_losses = 0;
                metrics.max_consecutive_wins = metrics.max_consecutive_wins.max(current_wins);
            } else if pnl < 0.0 {
                metrics.losing_trades += 1;
                total_loss_pnl += pnl;
                metrics.largest_loss = metrics.largest_loss.min(pnl);

                current_losses += 1;
                current_wins = 0;
                metrics.max_consecutive_losses =
                    metrics.max_consecutive_losses.max(current_losses);
            } else {
                current_wins = 0;
                current_losses = 0;
            }
        }

        let n = metrics.total_trades as f64;
        metrics.win_rate = metrics.winning_trades as f64 / n;
        metrics.loss_rate = metrics.losing_trades as f64 / n;
        metrics.gross_profit = total_win_pnl;
        metrics.gross_loss = -total_loss_pnl;
        metrics.avg_win = safe_div(total_win_pnl, metrics.winning_trades as f64, 0.0);
        metrics.avg_loss = safe_div(total_loss_pnl, metrics.losing_trades as f64, 0.0);
        metrics.profit_factor = profit_factor(metrics.gross_profit, metrics.gross_loss);

        metrics.total_return_pct = safe_div(metrics.total_return, self.initial_balance, 0.0) * 100.0;
        metrics.final_equity = self.initial_balance + metrics.total_return;

        metrics.expectancy = metrics.total_return / n;
        metrics.expectancy_ratio = safe_div(metrics.expectancy, metrics.avg_loss.abs(), 0.0);
        metrics.payoff_ratio = safe_div(metrics.avg_win, metrics.avg_loss.abs(), 0.0);

        for point in self.build_equity_curve(trades) {
            metrics.max_drawdown = metrics.max_drawdown.max(point.drawdown);
            metrics.max_drawdown_pct = metrics.max_drawdown_pct.max(point.drawdown_pct);
        }
        metrics.calmar_ratio = safe_div(metrics.total_return_pct, metrics.max_drawdown_pct, 0.0);
        metrics.recovery_factor = safe_div(metrics.total_return, metrics.max_drawdown, 0.0);

        let returns: Vec<f64> = trades
            .iter()
            .map(|t| safe_div(t.net_pnl, self.initial_balance, 0.0))
            .collect();
        metrics.sharpe_ratio = sharpe_ratio(&returns);
        metrics.sortino_ratio = sortino_ratio(&returns);

        metrics.avg_trade_duration = trades.iter().map(|t| t.duration() as f64).sum::<f64>() / n;
        metrics.avg_mae = trades.iter().map(|t| t.mae).sum::<f64>() / n;
        metrics.avg_mfe = trades.iter().map(|t| t.mfe).sum::<f64>() / n;

        metrics
    }

    /// Build the closed-trade equity curve, starting at the initial balance.
    pub fn build_equity_curve(&self, trades: &[Trade]) -> Vec<TradeEquityPoint> {
        let mut curve = Vec::with_capacity(trades.len() + 1);
        curve.push(TradeEquityPoint {
            equity: self.initial_balance,
            drawdown: 0.0,
            drawdown_pct: 0.0,
        });

        let mut equity = self.initial_balance;
        let mut peak = self.initial_balance;

        for trade in trades {
            equity += trade.net_pnl;
            peak = peak.max(equity);

            let drawdown = peak - equity;
            let drawdown_pct = if peak > 0.0 {
                (drawdown / peak) * 100.0
            } else {
                0.0
            };

            curve.push(TradeEquityPoint {
                equity,
                drawdown,
                drawdown_pct,
            });
        }

        curve
    }
}

/// Gross profit / gross loss with the sentinel conventions applied.
pub fn profit_factor(gross_profit: f64, gross_loss: f64) -> f64 {
    if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        PROFIT_FACTOR_SENTINEL
    } else {
        0.0
    }
}

/// Annualized Sharpe ratio of per-trade returns (sample standard deviation).
fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let sd = sample_std_dev(returns);
    safe_div(mean(returns), sd, 0.0) * ANNUALIZATION_PERIODS.sqrt()
}

/// Annualized Sortino ratio of per-trade returns.
fn sortino_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let downside_variance = returns
        .iter()
        .filter(|&&r| r < 0.0)
        .map(|r| r.powi(2))
        .sum::<f64>()
        / n;
    safe_div(mean(returns), downside_variance.sqrt(), 0.0) * ANNUALIZATION_PERIODS.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::ExitReason;
    use approx::assert_abs_diff_eq;
    use rigor_core::Side;

    fn make_trade(net_pnl: f64, commission: f64, duration: i64) -> Trade {
        Trade {
            id: 1,
            side: Side::Long,
            size: 1.0,
            entry_price: 100.0,
            exit_price: 100.0 + net_pnl + commission,
            entry_time: 0,
            exit_time: duration,
            entry_index: 0,
            exit_index: 1,
            stop_loss: None,
            take_profit: None,
            pnl: net_pnl + commission,
            pnl_points: net_pnl + commission,
            commission,
            net_pnl,
            mae: -5.0,
            mfe: 10.0,
            exit_reason: ExitReason::Signal,
        }
    }

    #[test]
    fn test_basic_metrics() {
        let calculator = MetricsCalculator::new(10_000.0);
        let trades = vec![
            make_trade(100.0, 5.0, 60),
            make_trade(-50.0, 5.0, 120),
            make_trade(75.0, 5.0, 90),
        ];

        let m = calculator.calculate(&trades);

        assert_eq!(m.total_trades, 3);
        assert_eq!(m.winning_trades, 2);
        assert_eq!(m.losing_trades, 1);
        assert_abs_diff_eq!(m.win_rate, 2.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.loss_rate, 1.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.total_return, 125.0, epsilon = 1e-10);
        assert_abs_diff_eq!(m.total_return_pct, 1.25, epsilon = 1e-10);
        assert_abs_diff_eq!(m.gross_profit, 175.0);
        assert_abs_diff_eq!(m.gross_loss, 50.0);
        assert_abs_diff_eq!(m.profit_factor, 3.5);
        assert_abs_diff_eq!(m.avg_win, 87.5);
        assert_abs_diff_eq!(m.avg_loss, -50.0);
        assert_abs_diff_eq!(m.payoff_ratio, 1.75);
        assert_abs_diff_eq!(m.expectancy, 125.0 / 3.0, epsilon = 1e-10);
        assert_abs_diff_eq!(m.expectancy_ratio, 125.0 / 150.0, epsilon = 1e-10);
        assert_abs_diff_eq!(m.total_commission, 15.0);
        assert_abs_diff_eq!(m.avg_trade_duration, 90.0);
        assert_abs_diff_eq!(m.final_equity, 10_125.0);
        assert_abs_diff_eq!(m.avg_mae, -5.0);
    }

    #[test]
    fn test_drawdown_and_ratios() {
        let calculator = MetricsCalculator::new(10_000.0);
        let trades = vec![
            make_trade(100.0, 0.0, 60),
            make_trade(-150.0, 0.0, 60),
            make_trade(200.0, 0.0, 60),
        ];
        let m = calculator.calculate(&trades);

        assert_abs_diff_eq!(m.max_drawdown, 150.0);
        assert_abs_diff_eq!(m.max_drawdown_pct, 150.0 / 10_100.0 * 100.0, epsilon = 1e-10);
        assert_abs_diff_eq!(m.recovery_factor, 150.0 / 150.0);
        assert_abs_diff_eq!(m.calmar_ratio, 1.5 / m.max_drawdown_pct, epsilon = 1e-10);
        assert!(m.sharpe_ratio > 0.0);
        assert!(m.sortino_ratio > 0.0);
    }

    #[test]
    fn test_empty_trades_neutral() {
        let m = MetricsCalculator::new(10_000.0).calculate(&[]);
        assert_eq!(m.total_trades, 0);
        assert_eq!(m.profit_factor, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.final_equity, 10_000.0);
        assert!(m.to_map().values().all(|v| v.is_finite()));
    }

    #[test]
    fn test_profit_factor_sentinels() {
        assert_eq!(profit_factor(10.0, 0.0), PROFIT_FACTOR_SENTINEL);
        assert_eq!(profit_factor(0.0, 0.0), 0.0);
        assert_abs_diff_eq!(profit_factor(10.0, 4.0), 2.5);

        let m = MetricsCalculator::new(1_000.0)
            .calculate(&[make_trade(10.0, 0.0, 1), make_trade(20.0, 0.0, 1)]);
        assert_eq!(m.profit_factor, PROFIT_FACTOR_SENTINEL);
        // No losses: ratios against avg_loss fall back to zero, nothing infinite
        assert_eq!(m.payoff_ratio, 0.0);
        assert_eq!(m.sortino_ratio, 0.0);
        assert!(m.to_map().values().all(|v| v.is_finite()));
    }

    #[test]
    fn test_consecutive_wins_losses() {
        let calculator = MetricsCalculator::new(10_000.0);
        let trades = vec![
            make_trade(10.0, 0.0, 1),
            make_trade(10.0, 0.0, 1),
            make_trade(10.0, 0.0, 1),
            make_trade(-5.0, 0.0, 1),
            make_trade(-5.0, 0.0, 1),
        ];
        let m = calculator.calculate(&trades);
        assert_eq!(m.max_consecutive_wins, 3);
        assert_eq!(m.max_consecutive_losses, 2);
    }

    #[test]
    fn test_metric_lookup() {
        let m = MetricsCalculator::new(1_000.0).calculate(&[make_trade(10.0, 1.0, 1)]);
        assert_eq!(m.value(Metric::TotalTrades), 1.0);
        assert_eq!(m.value(Metric::ProfitFactor), m.profit_factor);
        let map = m.to_map();
        assert_eq!(map.len(), Metric::ALL.len());
        assert_eq!(map["total_commission"], 1.0);
    }
}
