//! Vectorized simulator.
//!
//! Turns whole-series entry/exit arrays into trades. The sequential scan here
//! is the reference; an optional [`PortfolioBackend`] replaces it when one is
//! attached.

use anyhow::Context;
use rigor_core::{validate_bars, BacktestConfig, Bar, Error, Result, Side, SignalSet, VectorStrategy};
use tracing::{debug, warn};

use crate::accelerated::{run_accelerated, PortfolioBackend};
use crate::position::ExitReason;
use crate::simulator::{BacktestResult, Session};

/// Simulator for [`VectorStrategy`] implementations.
pub struct VectorizedSimulator {
    config: BacktestConfig,
    backend: Option<Box<dyn PortfolioBackend>>,
}

impl VectorizedSimulator {
    pub fn new(config: BacktestConfig) -> Self {
        Self {
            config,
            backend: None,
        }
    }

    /// Delegate simulation to an accelerated portfolio engine.
    pub fn with_backend(mut self, backend: Box<dyn PortfolioBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Generate signals once over `bars` and simulate them.
    pub fn run(&self, strategy: &dyn VectorStrategy, bars: &[Bar]) -> Result<BacktestResult> {
        validate_bars(bars)?;
        if bars.is_empty() {
            warn!(strategy = strategy.name(), "Empty bar series, returning neutral result");
            return Ok(BacktestResult::empty(
                strategy.name(),
                self.config.initial_balance,
            ));
        }

        let signals = strategy
            .generate_signals(bars)
            .with_context(|| format!("{} failed to generate signals", strategy.name()))
            .map_err(Error::strategy)?;
        signals.validate(bars.len())?;
        debug!(
            strategy = strategy.name(),
            bars = bars.len(),
            shorts = signals.has_shorts(),
            "Signals generated"
        );

        match &self.backend {
            Some(backend) => {
                debug!(
                    strategy = strategy.name(),
                    backend = backend.name(),
                    "Delegating to accelerated backend"
                );
                run_accelerated(backend.as_ref(), strategy.name(), bars, &signals, &self.config)
            }
            None => Ok(self.scan(strategy.name(), bars, &signals)),
        }
    }

    /// Reference sequential scan over precomputed signals.
    pub fn run_reference(
        &self,
        strategy: &str,
        bars: &[Bar],
        signals: &SignalSet,
    ) -> Result<BacktestResult> {
        validate_bars(bars)?;
        signals.validate(bars.len())?;
        if bars.is_empty() {
            return Ok(BacktestResult::empty(strategy, self.config.initial_balance));
        }
        Ok(self.scan(strategy, bars, signals))
    }

    /// One action per bar: flat + entry opens, matching exit closes.
    fn scan(&self, strategy: &str, bars: &[Bar], signals: &SignalSet) -> BacktestResult {
        let size = self.config.position_size;
        let mut session = Session::new(&self.config, bars.len());

        let flag = |arr: &Option<Vec<bool>>, i: usize| arr.as_ref().is_some_and(|a| a[i]);

        for (i, bar) in bars.iter().enumerate() {
            session.update_excursions(bar);

            match session.side() {
                None => {
                    if signals.entries[i] {
                        session.open(i, bar, Side::Long, size, None, None);
                    } else if flag(&signals.short_entries, i) {
                        session.open(i, bar, Side::Short, size, None, None);
                    }
                }
                Some(Side::Long) => {
                    if signals.exits[i] {
                        session.close_at_market(i, bar, ExitReason::Signal);
                    }
                }
                Some(Side::Short) => {
                    if flag(&signals.short_exits, i) {
                        session.close_at_market(i, bar, ExitReason::Signal);
                    }
                }
            }

            session.mark(bar);
        }

        session.finish(strategy, bars)
    }
}
