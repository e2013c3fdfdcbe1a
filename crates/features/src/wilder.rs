//! Wilder smoothing.
//!
//! The first value is the simple mean of the first `period` inputs; after that
//! each update is `(prev * (period - 1) + x) / period`. Used by RSI and ATR.

#[derive(Debug, Clone)]
pub struct WilderSmoother {
    period: usize,
    seed_sum: f64,
    count: usize,
    current: Option<f64>,
}

impl WilderSmoother {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            seed_sum: 0.0,
            count: 0,
            current: None,
        }
    }

    pub fn update(&mut self, value: f64) -> Option<f64> {
        let p = self.period as f64;
        match self.current {
            Some(prev) => self.current = Some((prev * (p - 1.0) + value) / p),
            None => {
                self.seed_sum += value;
                self.count += 1;
                if self.count == self.period {
                    self.current = Some(self.seed_sum / p);
                }
            }
        }
        self.current
    }

    pub fn value(&self) -> Option<f64> {
        self.current
    }

    pub fn reset(&mut self) {
        self.seed_sum = 0.0;
        self.count = 0;
        self.current = None;
    }
}
