//! Fill model for backtesting.
//!
//! Market fills at a reference price, moved against the trader by a fixed
//! number of ticks, with a flat commission per side.

use rigor_core::{BacktestConfig, Side, Timestamp};

/// A simulated execution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    /// Timestamp of fill.
    pub time: Timestamp,
    /// Fill price after slippage.
    pub price: f64,
    /// Fill size (positive).
    pub size: f64,
    /// Side of the position this fill opens or closes.
    pub side: Side,
    /// Commission charged (positive).
    pub commission: f64,
    /// Price offset applied by slippage.
    pub slippage: f64,
}

/// Fill model for simulating order execution.
#[derive(Debug, Clone)]
pub struct FillModel {
    slippage: f64,
    commission: f64,
}

impl FillModel {
    /// Create a new fill model from the run configuration.
    pub fn new(config: &BacktestConfig) -> Self {
        Self {
            slippage: config.slippage(),
            commission: config.commission,
        }
    }

    /// Fill that opens a position of `side` at `price`.
    ///
    /// Longs buy `slippage` above the reference, shorts sell below it.
    pub fn entry(&self, time: Timestamp, side: Side, price: f64, size: f64) -> Fill {
        Fill {
            time,
            price: price + side.sign() * self.slippage,
            size,
            side,
            commission: self.commission,
            slippage: self.slippage,
        }
    }

    /// Fill that closes a position of `side` at market.
    ///
    /// Longs sell `slippage` below the reference, shorts buy back above it.
    pub fn market_exit(&self, time: Timestamp, side: Side, price: f64, size: f64) -> Fill {
        Fill {
            time,
            price: price - side.sign() * self.slippage,
            size,
            side,
            commission: self.commission,
            slippage: self.slippage,
        }
    }

    /// Fill that closes a position at a resting stop or target level.
    ///
    /// Resting orders fill at their level; no slippage is applied.
    pub fn level_exit(&self, time: Timestamp, side: Side, level: f64, size: f64) -> Fill {
        Fill {
            time,
            price: level,
            size,
            side,
            commission: self.commission,
            slippage: 0.0,
        }
    }
}
