//! Strategy contracts.
//!
//! A strategy either decides bar by bar ([`Strategy`]) or produces whole-series
//! boolean signals in one call ([`VectorStrategy`]). [`StrategyKind`] wraps one
//! of the two so a simulator dispatches once per run rather than once per bar.

use crate::types::{Bar, Signal, SignalSet};

/// Incremental, bar-by-bar strategy.
///
/// Implementations may keep mutable state between calls (trailing stop levels,
/// break/retest flags). That state belongs to the instance; the simulator
/// calls [`reset`] at the start of every run.
///
/// [`reset`]: Strategy::reset
pub trait Strategy: Send {
    /// Human-readable name.
    fn name(&self) -> &str;

    /// Decide on the current bar.
    ///
    /// `history` holds every bar seen so far, including `bar` as its last element.
    /// Errors propagate to the caller of the simulation unchanged.
    fn on_bar(&mut self, bar: &Bar, history: &[Bar]) -> anyhow::Result<Option<Signal>>;

    /// Clear per-run state.
    fn reset(&mut self) {}
}

/// Vectorized strategy, evaluated once over the whole series.
pub trait VectorStrategy: Send + Sync {
    /// Human-readable name.
    fn name(&self) -> &str;

    /// Produce entry/exit arrays with exactly `bars.len()` elements each.
    fn generate_signals(&self, bars: &[Bar]) -> anyhow::Result<SignalSet>;
}

/// Either strategy shape, selected per instance.
pub enum StrategyKind<'a> {
    Incremental(&'a mut dyn Strategy),
    Vectorized(&'a dyn VectorStrategy),
}

impl StrategyKind<'_> {
    pub fn name(&self) -> &str {
        match self {
            StrategyKind::Incremental(s) => s.name(),
            StrategyKind::Vectorized(s) => s.name(),
        }
    }
}

impl<'a> From<&'a mut dyn Strategy> for StrategyKind<'a> {
    fn from(strategy: &'a mut dyn Strategy) -> Self {
        StrategyKind::Incremental(strategy)
    }
}

impl<'a> From<&'a dyn VectorStrategy> for StrategyKind<'a> {
    fn from(strategy: &'a dyn VectorStrategy) -> Self {
        StrategyKind::Vectorized(strategy)
    }
}
