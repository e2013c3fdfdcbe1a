//! Simple moving average.
//!
//! Rolling mean over a fixed window, updated in O(1) per observation.

use std::collections::VecDeque;

/// Rolling simple moving average.
#[derive(Debug, Clone)]
pub struct Sma {
    /// Window size in periods.
    period: usize,
    /// Values currently in the window.
    values: VecDeque<f64>,
    /// Running sum of the window.
    sum: f64,
}

impl Sma {
    /// Create a new SMA. A zero period is treated as one.
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            values: VecDeque::with_capacity(period),
            sum: 0.0,
        }
    }

    /// Add an observation and return the average once the window is full.
    pub fn update(&mut self, value: f64) -> Option<f64> {
        if self.values.len() == self.period {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
        self.values.push_back(value);
        self.sum += value;
        self.value()
    }

    /// Current average, if the window is full.
    pub fn value(&self) -> Option<f64> {
        self.is_ready().then(|| self.sum / self.period as f64)
    }

    pub fn is_ready(&self) -> bool {
        self.values.len() == self.period
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn reset(&mut self) {
        self.values.clear();
        self.sum = 0.0;
    }
}
