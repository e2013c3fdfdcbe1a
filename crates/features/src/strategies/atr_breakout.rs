//! Channel breakout with retest entry and an ATR trailing stop.
//!
//! The strategy carries state across bars: the breakout level it is waiting to
//! see retested, and the trailing stop of the position it believes is open.

use anyhow::ensure;
use rigor_core::{param_f64, param_usize, Bar, ParamSet, Signal, Strategy};
use tracing::trace;

use crate::atr::Atr;

/// Long-only breakout of the highest high of the previous `lookback` bars.
///
/// A close above the channel arms the setup; the entry fires when a later bar
/// trades back down to within `retest_atr` ATRs of the broken level while
/// still closing above it. Once long, the trailing stop ratchets up to
/// `close - trail_atr * ATR` and a close below it exits.
#[derive(Debug, Clone)]
pub struct AtrBreakout {
    lookback: usize,
    atr: Atr,
    retest_atr: f64,
    stop_atr: f64,
    trail_atr: f64,
    size: f64,
    /// Broken channel level awaiting a retest.
    breakout_level: Option<f64>,
    /// Trailing stop of the position this strategy opened.
    trail: Option<f64>,
    /// Initial protective stop handed to the simulator with the entry.
    stop: Option<f64>,
}

impl AtrBreakout {
    pub fn new(lookback: usize, atr_period: usize) -> Self {
        Self {
            lookback: lookback.max(1),
            atr: Atr::new(atr_period),
            retest_atr: 0.5,
            stop_atr: 1.0,
            trail_atr: 2.0,
            size: 1.0,
            breakout_level: None,
            trail: None,
            stop: None,
        }
    }

    pub fn with_multipliers(mut self, retest_atr: f64, stop_atr: f64, trail_atr: f64) -> Self {
        self.retest_atr = retest_atr;
        self.stop_atr = stop_atr;
        self.trail_atr = trail_atr;
        self
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    /// Parameters: `lookback` (20), `atr_period` (14), `retest_atr` (0.5),
    /// `stop_atr` (1.0), `trail_atr` (2.0), `size` (1.0).
    pub fn from_params(params: &ParamSet) -> anyhow::Result<Self> {
        let trail_atr = param_f64(params, "trail_atr", 2.0)?;
        ensure!(trail_atr > 0.0, "trail_atr must be positive, got {trail_atr}");
        Ok(Self::new(
            param_usize(params, "lookback", 20)?,
            param_usize(params, "atr_period", 14)?,
        )
        .with_multipliers(
            param_f64(params, "retest_atr", 0.5)?,
            param_f64(params, "stop_atr", 1.0)?,
            trail_atr,
        )
        .with_size(param_f64(params, "size", 1.0)?))
    }

    /// Current trailing stop, if the strategy believes it is long.
    pub fn trailing_stop(&self) -> Option<f64> {
        self.trail
    }

    /// Whether a breakout is armed and waiting for a retest.
    pub fn is_armed(&self) -> bool {
        self.breakout_level.is_some()
    }

    fn channel_high(&self, history: &[Bar]) -> Option<f64> {
        // Previous `lookback` bars, excluding the current one
        let prior = history.len().checked_sub(1)?;
        if prior < self.lookback {
            return None;
        }
        history[prior - self.lookback..prior]
            .iter()
            .map(|b| b.high)
            .reduce(f64::max)
    }
}

impl Strategy for AtrBreakout {
    fn name(&self) -> &str {
        "atr_breakout"
    }

    fn on_bar(&mut self, bar: &Bar, history: &[Bar]) -> anyhow::Result<Option<Signal>> {
        let atr = self.atr.update(bar);
        let channel = self.channel_high(history);
        let Some(atr) = atr else {
            return Ok(None);
        };

        if let Some(trail) = self.trail {
            if bar.close < trail {
                self.trail = None;
                self.stop = None;
                return Ok(Some(Signal::close()));
            }
            if self.stop.is_some_and(|stop| bar.low <= stop) {
                // The simulator has already filled the protective stop
                self.trail = None;
                self.stop = None;
                return Ok(None);
            }
            self.trail = Some(trail.max(bar.close - self.trail_atr * atr));
            return Ok(None);
        }

        if let Some(level) = self.breakout_level {
            if bar.close < level {
                // Failed breakout: back inside the channel
                self.breakout_level = None;
            } else if bar.low <= level + self.retest_atr * atr {
                self.breakout_level = None;
                let stop = level - self.stop_atr * atr;
                self.trail = Some(bar.close - self.trail_atr * atr);
                self.stop = Some(stop);
                trace!(level, close = bar.close, stop, "breakout retest entry");
                return Ok(Some(Signal::buy(self.size).with_stop_loss(stop)));
            }
            return Ok(None);
        }

        if let Some(high) = channel {
            if bar.close > high {
                self.breakout_level = Some(high);
            }
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.atr.reset();
        self.breakout_level = None;
        self.trail = None;
        self.stop = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigor_core::SignalAction;

    fn make_bar(i: i64, low: f64, high: f64, close: f64) -> Bar {
        Bar {
            time: i * 60,
            open: close,
            high,
            low,
            close,
            volume: 10.0,
        }
    }

    fn run(strat: &mut AtrBreakout, bars: &[Bar]) -> Vec<(usize, SignalAction)> {
        let mut out = Vec::new();
        for i in 0..bars.len() {
            if let Some(sig) = strat.on_bar(&bars[i], &bars[..=i]).unwrap() {
                out.push((i, sig.action));
            }
        }
        out
    }

    #[test]
    fn test_break_retest_then_trail_exit() {
        let mut bars: Vec<Bar> = (0..5).map(|i| make_bar(i, 99.0, 101.0, 100.0)).collect();
        bars.push(make_bar(5, 101.0, 104.0, 103.5)); // breaks 101
        bars.push(make_bar(6, 101.2, 103.0, 102.0)); // retest near 101
        bars.push(make_bar(7, 102.0, 106.0, 105.5)); // trail ratchets
        bars.push(make_bar(8, 96.0, 100.0, 97.0)); // closes below trail

        let mut strat = AtrBreakout::new(3, 2).with_multipliers(1.0, 1.0, 2.0);
        let actions = run(&mut strat, &bars);

        assert_eq!(actions, vec![(6, SignalAction::Buy), (8, SignalAction::Close)]);
        assert!(strat.trailing_stop().is_none());
        assert!(!strat.is_armed());
    }

    #[test]
    fn test_failed_breakout_disarms() {
        let mut bars: Vec<Bar> = (0..5).map(|i| make_bar(i, 99.0, 101.0, 100.0)).collect();
        bars.push(make_bar(5, 101.0, 104.0, 103.5));
        bars.push(make_bar(6, 99.0, 101.5, 100.0)); // closes back inside

        let mut strat = AtrBreakout::new(3, 2);
        let actions = run(&mut strat, &bars);
        assert!(actions.is_empty());
        assert!(!strat.is_armed());
    }

    #[test]
    fn test_reset_clears_state() {
        let mut bars: Vec<Bar> = (0..5).map(|i| make_bar(i, 99.0, 101.0, 100.0)).collect();
        bars.push(make_bar(5, 101.0, 104.0, 103.5));
        let mut strat = AtrBreakout::new(3, 2);
        run(&mut strat, &bars);
        assert!(strat.is_armed());
        strat.reset();
        assert!(!strat.is_armed());
    }
}
