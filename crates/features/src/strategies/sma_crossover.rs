//! Moving-average crossover, in incremental and vectorized form.

use anyhow::ensure;
use rigor_core::{param_f64, param_usize, Bar, ParamSet, Signal, SignalSet, Strategy, VectorStrategy};

use super::param_bool;
use crate::sma::Sma;

/// Buy when the fast SMA crosses above the slow one; sell (or close) on the
/// opposite cross.
#[derive(Debug, Clone)]
pub struct SmaCrossover {
    fast: Sma,
    slow: Sma,
    size: f64,
    allow_short: bool,
    /// Sign of `fast - slow` on the previous ready bar.
    prev_diff: Option<f64>,
}

impl SmaCrossover {
    pub fn new(fast: usize, slow: usize) -> Self {
        Self {
            fast: Sma::new(fast),
            slow: Sma::new(slow),
            size: 1.0,
            allow_short: false,
            prev_diff: None,
        }
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    pub fn with_shorts(mut self, allow: bool) -> Self {
        self.allow_short = allow;
        self
    }

    /// Parameters: `fast` (10), `slow` (30), `size` (1.0), `allow_short` (false).
    pub fn from_params(params: &ParamSet) -> anyhow::Result<Self> {
        let fast = param_usize(params, "fast", 10)?;
        let slow = param_usize(params, "slow", 30)?;
        ensure!(fast < slow, "fast period {fast} must be below slow period {slow}");
        Ok(Self::new(fast, slow)
            .with_size(param_f64(params, "size", 1.0)?)
            .with_shorts(param_bool(params, "allow_short", false)?))
    }
}

impl Strategy for SmaCrossover {
    fn name(&self) -> &str {
        "sma_crossover"
    }

    fn on_bar(&mut self, bar: &Bar, _history: &[Bar]) -> anyhow::Result<Option<Signal>> {
        let (fast, slow) = match (self.fast.update(bar.close), self.slow.update(bar.close)) {
            (Some(f), Some(s)) => (f, s),
            _ => return Ok(None),
        };
        let diff = fast - slow;
        let prev = self.prev_diff.replace(diff);

        let signal = match prev {
            Some(p) if p <= 0.0 && diff > 0.0 => Some(Signal::buy(self.size)),
            Some(p) if p >= 0.0 && diff < 0.0 => {
                if self.allow_short {
                    Some(Signal::sell(self.size))
                } else {
                    Some(Signal::close())
                }
            }
            _ => None,
        };
        Ok(signal)
    }

    fn reset(&mut self) {
        self.fast.reset();
        self.slow.reset();
        self.prev_diff = None;
    }
}

/// Whole-series crossover signals.
#[derive(Debug, Clone)]
pub struct SmaCrossoverSignals {
    pub fast: usize,
    pub slow: usize,
    pub allow_short: bool,
}

impl SmaCrossoverSignals {
    pub fn new(fast: usize, slow: usize) -> Self {
        Self {
            fast,
            slow,
            allow_short: false,
        }
    }

    pub fn from_params(params: &ParamSet) -> anyhow::Result<Self> {
        let fast = param_usize(params, "fast", 10)?;
        let slow = param_usize(params, "slow", 30)?;
        ensure!(fast < slow, "fast period {fast} must be below slow period {slow}");
        Ok(Self {
            fast,
            slow,
            allow_short: param_bool(params, "allow_short", false)?,
        })
    }
}

fn sma_series(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    let mut sma = Sma::new(period);
    bars.iter().map(|b| sma.update(b.close)).collect()
}

impl VectorStrategy for SmaCrossoverSignals {
    fn name(&self) -> &str {
        "sma_crossover_signals"
    }

    fn generate_signals(&self, bars: &[Bar]) -> anyhow::Result<SignalSet> {
        let fast = sma_series(bars, self.fast);
        let slow = sma_series(bars, self.slow);
        let diffs: Vec<Option<f64>> = fast
            .iter()
            .zip(&slow)
            .map(|(f, s)| Some((*f)? - (*s)?))
            .collect();

        let mut entries = vec![false; bars.len()];
        let mut exits = vec![false; bars.len()];
        for i in 1..bars.len() {
            if let (Some(prev), Some(cur)) = (diffs[i - 1], diffs[i]) {
                entries[i] = prev <= 0.0 && cur > 0.0;
                exits[i] = prev >= 0.0 && cur < 0.0;
            }
        }

        let mut set = SignalSet::long_only(entries, exits);
        if self.allow_short {
            set.short_entries = Some(set.exits.clone());
            set.short_exits = Some(set.entries.clone());
        }
        Ok(set)
    }
}
