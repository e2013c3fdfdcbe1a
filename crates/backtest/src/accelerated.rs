//! Adapter for accelerated vectorized portfolio engines.
//!
//! Such engines price costs as fractions of notional rather than flat
//! commissions and ticks. The adapter converts the run's cost model on the way
//! in and normalizes trades and equity back into the common result shape on
//! the way out.

use rigor_core::stats::{mean, safe_div};
use rigor_core::{BacktestConfig, Bar, EquityPoint, Error, Result, Side, SignalSet};
use tracing::debug;

use crate::metrics::MetricsCalculator;
use crate::position::{ExitReason, Trade};
use crate::simulator::BacktestResult;

/// Maximum equity points returned from an accelerated run.
pub const MAX_EQUITY_POINTS: usize = 500;

/// Inputs handed to a portfolio engine.
#[derive(Debug, Clone)]
pub struct BackendRequest<'a> {
    pub close: Vec<f64>,
    pub entries: &'a [bool],
    pub exits: &'a [bool],
    pub short_entries: Option<&'a [bool]>,
    pub short_exits: Option<&'a [bool]>,
    pub init_cash: f64,
    /// Contracts per position.
    pub size: f64,
    /// Currency value of one point per contract.
    pub point_value: f64,
    /// Fee per side as a fraction of notional.
    pub fee_pct: f64,
    /// Slippage as a fraction of price.
    pub slippage_pct: f64,
}

/// A trade as reported by a portfolio engine.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendTrade {
    pub side: Side,
    pub entry_index: usize,
    pub exit_index: usize,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    /// Fees for both sides.
    pub fees: f64,
    /// Still open when the series ended.
    pub is_open: bool,
}

/// Raw engine output.
#[derive(Debug, Clone, Default)]
pub struct BackendOutput {
    pub trades: Vec<BackendTrade>,
    /// Portfolio value per bar.
    pub equity: Vec<f64>,
}

/// An accelerated vectorized portfolio engine.
pub trait PortfolioBackend: Send + Sync {
    fn name(&self) -> &str;

    fn simulate(&self, request: &BackendRequest<'_>) -> anyhow::Result<BackendOutput>;
}

/// Flat per-side commission as a fraction of average notional.
pub fn commission_to_fee_pct(config: &BacktestConfig, mean_close: f64) -> f64 {
    safe_div(
        config.commission,
        mean_close * config.point_value * config.position_size,
        0.0,
    )
}

/// Slippage ticks as a fraction of the average price.
pub fn slippage_to_pct(config: &BacktestConfig, mean_close: f64) -> f64 {
    safe_div(config.slippage(), mean_close, 0.0)
}

/// Run pre-validated signals through `backend` and normalize its output.
pub fn run_accelerated(
    backend: &dyn PortfolioBackend,
    strategy: &str,
    bars: &[Bar],
    signals: &SignalSet,
    config: &BacktestConfig,
) -> Result<BacktestResult> {
    let close: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let mean_close = mean(&close);
    let request = BackendRequest {
        entries: &signals.entries,
        exits: &signals.exits,
        short_entries: signals.short_entries.as_deref(),
        short_exits: signals.short_exits.as_deref(),
        init_cash: config.initial_balance,
        size: config.position_size,
        point_value: config.point_value,
        fee_pct: commission_to_fee_pct(config, mean_close),
        slippage_pct: slippage_to_pct(config, mean_close),
        close,
    };

    let output = backend
        .simulate(&request)
        .map_err(|e| Error::backend(format!("{}: {e:#}", backend.name())))?;

    if output.equity.len() != bars.len() {
        return Err(Error::backend(format!(
            "{} returned {} equity values for {} bars",
            backend.name(),
            output.equity.len(),
            bars.len()
        )));
    }

    let trades = output
        .trades
        .iter()
        .enumerate()
        .map(|(i, t)| normalize_trade(i as u64 + 1, t, bars, config.point_value))
        .collect::<Result<Vec<_>>>()?;

    let net: f64 = trades.iter().map(|t| t.net_pnl).sum();
    let final_equity = config.initial_balance + net;

    let points: Vec<EquityPoint> = bars
        .iter()
        .zip(&output.equity)
        .map(|(bar, &value)| EquityPoint {
            time: bar.time,
            value,
        })
        .collect();
    let mut equity_curve = downsample_equity(&points, MAX_EQUITY_POINTS);
    // The curve ends at the realized balance, as in the reference scan
    if let Some(last) = equity_curve.last_mut() {
        last.value = final_equity;
    }

    debug!(
        backend = backend.name(),
        trades = trades.len(),
        points = equity_curve.len(),
        final_equity,
        "Accelerated run normalized"
    );

    Ok(BacktestResult {
        strategy: strategy.to_string(),
        metrics: MetricsCalculator::new(config.initial_balance).calculate(&trades),
        trades,
        equity_curve,
        initial_balance: config.initial_balance,
        final_equity,
    })
}

fn normalize_trade(id: u64, raw: &BackendTrade, bars: &[Bar], point_value: f64) -> Result<Trade> {
    if raw.entry_index > raw.exit_index || raw.exit_index >= bars.len() {
        return Err(Error::backend(format!(
            "trade {id} has invalid bar range {}..={}",
            raw.entry_index, raw.exit_index
        )));
    }

    let sign = raw.side.sign();
    let pnl_points = sign * (raw.exit_price - raw.entry_price);
    let pnl = pnl_points * point_value * raw.size;

    let (mut mae, mut mfe) = (0.0_f64, 0.0_f64);
    for bar in &bars[raw.entry_index..=raw.exit_index] {
        let unrealized = sign * (bar.close - raw.entry_price) * point_value * raw.size;
        mae = mae.min(unrealized);
        mfe = mfe.max(unrealized);
    }

    let entry = &bars[raw.entry_index];
    let exit = &bars[raw.exit_index];
    Ok(Trade {
        id,
        side: raw.side,
        size: raw.size,
        entry_price: raw.entry_price,
        exit_price: raw.exit_price,
        entry_time: entry.time,
        exit_time: exit.time,
        entry_index: raw.entry_index,
        exit_index: raw.exit_index,
        stop_loss: None,
        take_profit: None,
        pnl,
        pnl_points,
        commission: raw.fees,
        net_pnl: pnl - raw.fees,
        mae,
        mfe,
        exit_reason: if raw.is_open {
            ExitReason::EndOfData
        } else {
            ExitReason::Signal
        },
    })
}

/// Evenly thin `points` to at most `max_points`, keeping the first and last.
pub fn downsample_equity(points: &[EquityPoint], max_points: usize) -> Vec<EquityPoint> {
    if points.len() <= max_points || max_points < 2 {
        return points.to_vec();
    }
    let last = points.len() - 1;
    (0..max_points)
        .map(|i| points[i * last / (max_points - 1)])
        .collect()
}
