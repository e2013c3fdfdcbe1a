//! Relative Strength Index with Wilder smoothing.

use crate::wilder::WilderSmoother;

/// Streaming RSI (0-100).
#[derive(Debug, Clone)]
pub struct Rsi {
    gains: WilderSmoother,
    losses: WilderSmoother,
    prev_close: Option<f64>,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            gains: WilderSmoother::new(period),
            losses: WilderSmoother::new(period),
            prev_close: None,
        }
    }

    /// Add a close and return the RSI once `period` changes have been seen.
    pub fn update(&mut self, close: f64) -> Option<f64> {
        let prev = self.prev_close.replace(close)?;
        let change = close - prev;
        let avg_gain = self.gains.update(change.max(0.0));
        let avg_loss = self.losses.update((-change).max(0.0));
        match (avg_gain, avg_loss) {
            (Some(g), Some(l)) => Some(rsi_from_averages(g, l)),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<f64> {
        match (self.gains.value(), self.losses.value()) {
            (Some(g), Some(l)) => Some(rsi_from_averages(g, l)),
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.gains.reset();
        self.losses.reset();
        self.prev_close = None;
    }
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        // Flat series reads as neutral, pure up-moves as 100
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}
