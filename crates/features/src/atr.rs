//! Average True Range with Wilder smoothing.

use rigor_core::Bar;

use crate::wilder::WilderSmoother;

#[derive(Debug, Clone)]
pub struct Atr {
    smoother: WilderSmoother,
    prev_close: Option<f64>,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Self {
            smoother: WilderSmoother::new(period),
            prev_close: None,
        }
    }

    pub fn update(&mut self, bar: &Bar) -> Option<f64> {
        let tr = bar.true_range(self.prev_close);
        self.prev_close = Some(bar.close);
        self.smoother.update(tr)
    }

    pub fn value(&self) -> Option<f64> {
        self.smoother.value()
    }

    pub fn reset(&mut self) {
        self.smoother.reset();
        self.prev_close = None;
    }
}
