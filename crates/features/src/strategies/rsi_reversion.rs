//! RSI mean reversion with fixed percentage stop and target.

use anyhow::ensure;
use rigor_core::{param_f64, param_usize, Bar, ParamSet, Signal, Strategy};

use super::param_bool;
use crate::rsi::Rsi;

/// Buy oversold, sell overbought, exit when RSI returns to `exit_level`.
#[derive(Debug, Clone)]
pub struct RsiReversion {
    rsi: Rsi,
    oversold: f64,
    overbought: f64,
    exit_level: f64,
    stop_pct: f64,
    target_pct: f64,
    size: f64,
    allow_short: bool,
    prev_rsi: Option<f64>,
}

impl RsiReversion {
    pub fn new(period: usize, oversold: f64, overbought: f64) -> Self {
        Self {
            rsi: Rsi::new(period),
            oversold,
            overbought,
            exit_level: 50.0,
            stop_pct: 2.0,
            target_pct: 4.0,
            size: 1.0,
            allow_short: false,
            prev_rsi: None,
        }
    }

    pub fn with_stop_target(mut self, stop_pct: f64, target_pct: f64) -> Self {
        self.stop_pct = stop_pct;
        self.target_pct = target_pct;
        self
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    pub fn with_shorts(mut self, allow: bool) -> Self {
        self.allow_short = allow;
        self
    }

    /// Parameters: `period` (14), `oversold` (30), `overbought` (70),
    /// `exit_level` (50), `stop_pct` (2), `target_pct` (4), `size` (1),
    /// `allow_short` (false).
    pub fn from_params(params: &ParamSet) -> anyhow::Result<Self> {
        let oversold = param_f64(params, "oversold", 30.0)?;
        let overbought = param_f64(params, "overbought", 70.0)?;
        ensure!(
            oversold < overbought,
            "oversold {oversold} must be below overbought {overbought}"
        );
        let mut strat = Self::new(param_usize(params, "period", 14)?, oversold, overbought)
            .with_stop_target(
                param_f64(params, "stop_pct", 2.0)?,
                param_f64(params, "target_pct", 4.0)?,
            )
            .with_size(param_f64(params, "size", 1.0)?)
            .with_shorts(param_bool(params, "allow_short", false)?);
        strat.exit_level = param_f64(params, "exit_level", 50.0)?;
        Ok(strat)
    }
}

impl Strategy for RsiReversion {
    fn name(&self) -> &str {
        "rsi_reversion"
    }

    fn on_bar(&mut self, bar: &Bar, _history: &[Bar]) -> anyhow::Result<Option<Signal>> {
        let Some(rsi) = self.rsi.update(bar.close) else {
            return Ok(None);
        };
        let prev = self.prev_rsi.replace(rsi);
        let price = bar.close;

        if rsi < self.oversold {
            return Ok(Some(
                Signal::buy(self.size)
                    .with_stop_loss(price * (1.0 - self.stop_pct / 100.0))
                    .with_take_profit(price * (1.0 + self.target_pct / 100.0)),
            ));
        }
        if rsi > self.overbought && self.allow_short {
            return Ok(Some(
                Signal::sell(self.size)
                    .with_stop_loss(price * (1.0 + self.stop_pct / 100.0))
                    .with_take_profit(price * (1.0 - self.target_pct / 100.0)),
            ));
        }

        // Exit on a cross of the mid level in either direction
        let crossed = prev.is_some_and(|p| {
            (p < self.exit_level && rsi >= self.exit_level)
                || (p > self.exit_level && rsi <= self.exit_level)
        });
        Ok(crossed.then(Signal::close))
    }

    fn reset(&mut self) {
        self.rsi.reset();
        self.prev_rsi = None;
    }
}
