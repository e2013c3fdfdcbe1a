//! Bar-by-bar backtest simulator.
//!
//! Replays bars in order and drives an incremental strategy. Per bar:
//!
//! 1. resting stop / target of the open position against the bar's range
//! 2. MAE / MFE at the close
//! 3. strategy decision
//! 4. open, close or flip at the (slippage-adjusted) close
//! 5. mark-to-market equity point
//!
//! Any position still open after the last bar is closed at its close.

use std::collections::BTreeMap;

use anyhow::Context;
use rigor_core::{
    validate_bars, BacktestConfig, Bar, EquityPoint, Error, Result, Side, Signal, SignalAction,
    Strategy,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::fill_model::FillModel;
use crate::metrics::{BacktestMetrics, MetricsCalculator};
use crate::position::{ExitReason, Ledger, Trade};

/// Output of one backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Strategy name.
    pub strategy: String,
    /// Closed trades in the order they closed.
    pub trades: Vec<Trade>,
    /// One point per bar, strictly increasing in time.
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: BacktestMetrics,
    pub initial_balance: f64,
    /// Cash after the final forced close.
    pub final_equity: f64,
}

impl BacktestResult {
    /// Result of a run over an empty series.
    ///
    /// With no bars there are no timestamps to attach, so `equity_curve` is
    /// empty rather than a flat line; read `final_equity` (equal to
    /// `initial_balance`) instead of `equity_curve.last()`.
    pub fn empty(strategy: impl Into<String>, initial_balance: f64) -> Self {
        Self {
            strategy: strategy.into(),
            trades: Vec::new(),
            equity_curve: Vec::new(),
            metrics: BacktestMetrics::neutral(initial_balance),
            initial_balance,
            final_equity: initial_balance,
        }
    }

    /// Metric name -> value map.
    pub fn metrics_map(&self) -> BTreeMap<String, f64> {
        self.metrics.to_map()
    }

    /// Sum of net trade P&L.
    pub fn net_pnl(&self) -> f64 {
        self.trades.iter().map(|t| t.net_pnl).sum()
    }
}

/// Execution state shared by the bar-by-bar and vectorized simulators.
pub(crate) struct Session {
    initial_balance: f64,
    fill_model: FillModel,
    ledger: Ledger,
    equity_curve: Vec<EquityPoint>,
}

impl Session {
    pub(crate) fn new(config: &BacktestConfig, num_bars: usize) -> Self {
        Self {
            initial_balance: config.initial_balance,
            fill_model: FillModel::new(config),
            ledger: Ledger::new(config.initial_balance, config.point_value),
            equity_curve: Vec::with_capacity(num_bars),
        }
    }

    pub(crate) fn side(&self) -> Option<Side> {
        self.ledger.side()
    }

    /// Open a position at the bar's close.
    pub(crate) fn open(
        &mut self,
        index: usize,
        bar: &Bar,
        side: Side,
        size: f64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) {
        let fill = self.fill_model.entry(bar.time, side, bar.close, size);
        self.ledger.open_position(fill, index, stop_loss, take_profit);
    }

    /// Close the open position at the bar's slippage-adjusted close.
    pub(crate) fn close_at_market(&mut self, index: usize, bar: &Bar, reason: ExitReason) {
        let Some(pos) = self.ledger.position() else {
            return;
        };
        let fill = self.fill_model.market_exit(bar.time, pos.side, bar.close, pos.size);
        self.ledger.close_position(fill, index, reason);
    }

    /// Close on a resting stop or target traded within the bar.
    ///
    /// When both levels traded, the stop is assumed to have filled first.
    pub(crate) fn check_stops_targets(&mut self, index: usize, bar: &Bar) {
        let Some(pos) = self.ledger.position() else {
            return;
        };

        let exit = if pos.is_stopped(bar) {
            pos.stop_loss.map(|level| (level, ExitReason::StopLoss))
        } else if pos.is_target_hit(bar) {
            pos.take_profit.map(|level| (level, ExitReason::TakeProfit))
        } else {
            None
        };

        if let Some((level, reason)) = exit {
            let fill = self.fill_model.level_exit(bar.time, pos.side, level, pos.size);
            if let Some(trade) = self.ledger.close_position(fill, index, reason) {
                debug!(
                    trade = trade.id,
                    reason = ?trade.exit_reason,
                    price = trade.exit_price,
                    net_pnl = trade.net_pnl,
                    "Resting exit filled"
                );
            }
        }
    }

    pub(crate) fn update_excursions(&mut self, bar: &Bar) {
        self.ledger.update_excursions(bar.close);
    }

    /// Append the bar's mark-to-market equity.
    pub(crate) fn mark(&mut self, bar: &Bar) {
        self.equity_curve.push(EquityPoint {
            time: bar.time,
            value: self.ledger.equity(bar.close),
        });
    }

    /// Force-close on the final bar and compute metrics.
    pub(crate) fn finish(mut self, strategy: &str, bars: &[Bar]) -> BacktestResult {
        if let Some(last) = bars.last() {
            if !self.ledger.is_flat() {
                self.close_at_market(bars.len() - 1, last, ExitReason::EndOfData);
            }
        }

        let final_equity = self.ledger.cash();
        if let Some(point) = self.equity_curve.last_mut() {
            point.value = final_equity;
        }

        let trades = self.ledger.into_trades();
        let metrics = MetricsCalculator::new(self.initial_balance).calculate(&trades);

        debug!(
            strategy,
            bars = bars.len(),
            trades = trades.len(),
            final_equity,
            "Backtest finished"
        );

        BacktestResult {
            strategy: strategy.to_string(),
            trades,
            equity_curve: self.equity_curve,
            metrics,
            initial_balance: self.initial_balance,
            final_equity,
        }
    }
}

/// Bar-by-bar backtest simulator.
#[derive(Debug, Clone)]
pub struct BacktestSimulator {
    config: BacktestConfig,
}

impl BacktestSimulator {
    /// Create a new backtest simulator.
    pub fn new(config: BacktestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Run an incremental strategy over `bars`.
    ///
    /// Strategy errors abort the run and are returned as [`Error::Strategy`].
    pub fn run(&self, strategy: &mut dyn Strategy, bars: &[Bar]) -> Result<BacktestResult> {
        validate_bars(bars)?;
        if bars.is_empty() {
            warn!(strategy = strategy.name(), "Empty bar series, returning neutral result");
            return Ok(BacktestResult::empty(
                strategy.name(),
                self.config.initial_balance,
            ));
        }

        debug!(strategy = strategy.name(), bars = bars.len(), "Backtest started");
        strategy.reset();
        let mut session = Session::new(&self.config, bars.len());

        for (i, bar) in bars.iter().enumerate() {
            session.check_stops_targets(i, bar);
            session.update_excursions(bar);

            let signal = strategy
                .on_bar(bar, &bars[..=i])
                .with_context(|| format!("{} failed on bar {} (t={})", strategy.name(), i, bar.time))
                .map_err(Error::strategy)?;

            if let Some(signal) = signal {
                self.apply_signal(&mut session, i, bar, &signal);
            }

            session.mark(bar);
        }

        Ok(session.finish(strategy.name(), bars))
    }

    fn apply_signal(&self, session: &mut Session, index: usize, bar: &Bar, signal: &Signal) {
        match signal.action {
            SignalAction::None => {}
            SignalAction::Close => session.close_at_market(index, bar, ExitReason::Signal),
            SignalAction::Buy | SignalAction::Sell => {
                if !(signal.size.is_finite() && signal.size > 0.0) {
                    warn!(index, size = signal.size, "Ignoring entry with invalid size");
                    return;
                }
                let side = match signal.action.entry_side() {
                    Some(side) => side,
                    None => return,
                };
                match session.side() {
                    // No pyramiding
                    Some(current) if current == side => return,
                    Some(_) => {
                        debug!(index, to = %side, "Flipping position");
                        session.close_at_market(index, bar, ExitReason::Flip);
                    }
                    None => {}
                }
                session.open(
                    index,
                    bar,
                    side,
                    signal.size,
                    signal.stop_loss,
                    signal.take_profit,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::collections::HashMap;

    const T0: i64 = 1_700_000_000;

    fn make_bar(i: usize, low: f64, high: f64, close: f64) -> Bar {
        Bar {
            time: T0 + i as i64 * 60,
            open: close,
            high,
            low,
            close,
            volume: 100.0,
        }
    }

    /// Rising series: close = 100 + i, range +/- 1.
    fn make_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let c = 100.0 + i as f64;
                make_bar(i, c - 1.0, c + 1.0, c)
            })
            .collect()
    }

    /// Emits pre-scripted signals keyed by bar index.
    struct Scripted {
        signals: HashMap<usize, Signal>,
        fail_at: Option<usize>,
    }

    impl Scripted {
        fn new(signals: Vec<(usize, Signal)>) -> Self {
            Self {
                signals: signals.into_iter().collect(),
                fail_at: None,
            }
        }
    }

    impl Strategy for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn on_bar(&mut self, _bar: &Bar, history: &[Bar]) -> anyhow::Result<Option<Signal>> {
            let i = history.len() - 1;
            if self.fail_at == Some(i) {
                anyhow::bail!("boom");
            }
            Ok(self.signals.get(&i).copied())
        }
    }

    fn futures_config() -> BacktestConfig {
        BacktestConfig {
            initial_balance: 10_000.0,
            commission: 2.5,
            slippage_ticks: 1,
            point_value: 20.0,
            tick_size: 0.25,
            ..Default::default()
        }
    }

    #[test]
    fn test_buy_then_close_costs() {
        let bars = make_bars(15);
        let mut strat = Scripted::new(vec![(5, Signal::buy(2.0)), (10, Signal::close())]);
        let result = BacktestSimulator::new(futures_config())
            .run(&mut strat, &bars)
            .unwrap();

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.side, Side::Long);
        assert_abs_diff_eq!(trade.entry_price, 105.25);
        assert_abs_diff_eq!(trade.exit_price, 109.75);
        assert_abs_diff_eq!(
            trade.pnl,
            (trade.exit_price - trade.entry_price) * 20.0 * trade.size
        );
        assert_abs_diff_eq!(trade.commission, 5.0);
        assert_abs_diff_eq!(trade.net_pnl, 175.0);
        assert_eq!(trade.exit_reason, ExitReason::Signal);
        assert_eq!((trade.entry_index, trade.exit_index), (5, 10));
        assert_abs_diff_eq!(result.final_equity, 10_175.0);
    }

    #[test]
    fn test_conservation_and_curve_shape() {
        let bars = make_bars(30);
        let mut strat = Scripted::new(vec![
            (2, Signal::buy(1.0)),
            (6, Signal::sell(3.0)),
            (12, Signal::close()),
            (15, Signal::sell(1.0)),
            (20, Signal::buy(2.0)),
        ]);
        let result = BacktestSimulator::new(futures_config())
            .run(&mut strat, &bars)
            .unwrap();

        assert_eq!(result.equity_curve.len(), bars.len());
        assert!(result
            .equity_curve
            .windows(2)
            .all(|w| w[0].time < w[1].time));

        let last = result.equity_curve.last().unwrap().value;
        assert_abs_diff_eq!(last, result.final_equity);
        assert_abs_diff_eq!(
            result.final_equity - result.initial_balance,
            result.net_pnl(),
            epsilon = 1e-9
        );

        let ids: Vec<u64> = result.trades.iter().map(|t| t.id).collect();
        assert_eq!(ids, (1..=ids.len() as u64).collect::<Vec<_>>());
        assert_eq!(
            result.trades.last().unwrap().exit_reason,
            ExitReason::EndOfData
        );
    }

    #[test]
    fn test_stop_takes_precedence_over_target() {
        let mut bars = make_bars(10);
        // Bar 3 trades through both the stop and the target
        bars[3] = make_bar(3, 99.0, 106.0, 103.0);
        let entry = Signal::buy(1.0)
            .with_stop_loss(100.5)
            .with_take_profit(104.0);
        let mut strat = Scripted::new(vec![(2, entry)]);
        let result = BacktestSimulator::new(futures_config())
            .run(&mut strat, &bars)
            .unwrap();

        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert_abs_diff_eq!(trade.exit_price, 100.5);
        assert_eq!(trade.exit_index, 3);
        assert_eq!(result.trades.len(), 1);
    }

    #[test]
    fn test_take_profit_on_high() {
        let bars = make_bars(10);
        let entry = Signal::buy(1.0).with_take_profit(104.5);
        let mut strat = Scripted::new(vec![(2, entry)]);
        let result = BacktestSimulator::new(BacktestConfig::default())
            .run(&mut strat, &bars)
            .unwrap();

        // Bar 4 high is 105, close is only 104
        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        assert_eq!(trade.exit_index, 4);
        assert_abs_diff_eq!(trade.exit_price, 104.5);
    }

    #[test]
    fn test_flip_closes_then_opens() {
        let bars = make_bars(12);
        let mut strat = Scripted::new(vec![(2, Signal::buy(1.0)), (5, Signal::sell(1.0))]);
        let result = BacktestSimulator::new(futures_config())
            .run(&mut strat, &bars)
            .unwrap();

        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[0].exit_reason, ExitReason::Flip);
        assert_eq!(result.trades[1].side, Side::Short);
        assert_eq!(result.trades[1].entry_index, 5);
        assert_eq!(result.trades[1].exit_reason, ExitReason::EndOfData);
        // Two commissions per round trip, both trades
        assert_abs_diff_eq!(result.metrics.total_commission, 10.0);
    }

    #[test]
    fn test_same_side_signal_is_ignored() {
        let bars = make_bars(10);
        let mut strat = Scripted::new(vec![(1, Signal::buy(1.0)), (3, Signal::buy(5.0))]);
        let result = BacktestSimulator::new(BacktestConfig::default())
            .run(&mut strat, &bars)
            .unwrap();
        assert_eq!(result.trades.len(), 1);
        assert_abs_diff_eq!(result.trades[0].size, 1.0);
    }

    #[test]
    fn test_invalid_size_is_ignored() {
        let bars = make_bars(5);
        let mut strat = Scripted::new(vec![(1, Signal::buy(0.0))]);
        let result = BacktestSimulator::new(BacktestConfig::default())
            .run(&mut strat, &bars)
            .unwrap();
        assert!(result.trades.is_empty());
    }

    #[test]
    fn test_strategy_error_propagates() {
        let bars = make_bars(10);
        let mut strat = Scripted::new(vec![(1, Signal::buy(1.0))]);
        strat.fail_at = Some(4);
        let err = BacktestSimulator::new(BacktestConfig::default())
            .run(&mut strat, &bars)
            .unwrap_err();
        assert!(matches!(err, Error::Strategy(_)));
        assert!(err.to_string().contains("boom"));
        assert!(err.to_string().contains("bar 4"));
    }

    #[test]
    fn test_empty_series() {
        let mut strat = Scripted::new(vec![]);
        let result = BacktestSimulator::new(BacktestConfig::default())
            .run(&mut strat, &[])
            .unwrap();
        assert!(result.trades.is_empty());
        assert!(result.equity_curve.is_empty());
        assert_eq!(result.final_equity, 100_000.0);
        assert_eq!(result.final_equity, result.initial_balance);
        assert_eq!(result.metrics.total_trades, 0);
    }

    #[test]
    fn test_unordered_bars_rejected() {
        let mut bars = make_bars(5);
        bars.swap(1, 2);
        let mut strat = Scripted::new(vec![]);
        let err = BacktestSimulator::new(BacktestConfig::default())
            .run(&mut strat, &bars)
            .unwrap_err();
        assert!(matches!(err, Error::Data(_)));
    }

    #[test]
    fn test_mark_to_market_includes_entry_commission() {
        let bars = make_bars(5);
        let mut strat = Scripted::new(vec![(1, Signal::buy(1.0))]);
        let config = BacktestConfig {
            commission: 1.0,
            ..Default::default()
        };
        let result = BacktestSimulator::new(config).run(&mut strat, &bars).unwrap();
        // Entry at 101, marked at 102 on bar 2
        assert_abs_diff_eq!(result.equity_curve[2].value, 100_000.0 + 1.0 - 1.0);
        assert_abs_diff_eq!(result.equity_curve[0].value, 100_000.0);
    }

    #[test]
    fn test_bracketed_strategies_conserve_cash() {
        use rigor_features::{AtrBreakout, RsiReversion};

        let bars: Vec<Bar> = (0..400)
            .map(|i| {
                let c = 100.0 + (i as f64 / 5.0).sin() * 6.0 + (i as f64 / 17.0).cos() * 3.0;
                make_bar(i, c - 1.2, c + 1.2, c)
            })
            .collect();
        let sim = BacktestSimulator::new(futures_config());
        let mut strategies: Vec<Box<dyn Strategy>> = vec![
            Box::new(RsiReversion::new(14, 30.0, 70.0).with_stop_target(1.0, 2.0)),
            Box::new(AtrBreakout::new(20, 14)),
        ];

        for strategy in strategies.iter_mut() {
            let result = sim.run(strategy.as_mut(), &bars).unwrap();
            assert_abs_diff_eq!(
                result.final_equity - result.initial_balance,
                result.net_pnl(),
                epsilon = 1e-6
            );
            assert!(result.trades.iter().all(|t| t.mae <= 0.0 && t.mfe >= 0.0));
            assert!(result.trades.iter().all(|t| t.entry_index <= t.exit_index));
        }
    }

    #[test]
    fn test_reference_strategy_runs() {
        use rigor_features::SmaCrossover;

        let closes = [
            10.0, 9.0, 8.0, 7.0, 6.0, 7.0, 8.0, 9.0, 10.0, 9.0, 8.0, 7.0, 6.0,
        ];
        let bars: Vec<Bar> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| make_bar(i, c - 0.5, c + 0.5, c))
            .collect();

        let mut strat = SmaCrossover::new(2, 4).with_shorts(true);
        let sim = BacktestSimulator::new(BacktestConfig::default());
        let first = sim.run(&mut strat, &bars).unwrap();
        // Instance is reset between runs
        let second = sim.run(&mut strat, &bars).unwrap();

        assert_eq!(first.trades.len(), 2);
        assert_eq!(first.trades[0].side, Side::Long);
        assert_eq!(first.trades[0].exit_reason, ExitReason::Flip);
        assert_eq!(first.trades, second.trades);

        let map = first.metrics_map();
        assert_eq!(map.len(), rigor_core::Metric::ALL.len());
        assert_eq!(map["total_trades"], 2.0);
        assert_abs_diff_eq!(map["final_equity"], first.final_equity, epsilon = 1e-9);
    }
}
