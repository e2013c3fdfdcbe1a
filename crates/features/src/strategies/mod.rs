//! Reference strategies.
//!
//! Each strategy can be built from a [`ParamSet`](rigor_core::ParamSet) so that
//! a parameter grid can drive optimization.

pub mod atr_breakout;
pub mod rsi_reversion;
pub mod sma_crossover;

pub use atr_breakout::AtrBreakout;
pub use rsi_reversion::RsiReversion;
pub use sma_crossover::{SmaCrossover, SmaCrossoverSignals};

fn param_bool(params: &rigor_core::ParamSet, name: &str, default: bool) -> anyhow::Result<bool> {
    match params.get(name) {
        None => Ok(default),
        Some(value) => value
            .as_bool()
            .ok_or_else(|| anyhow::anyhow!("parameter '{name}' must be a bool, got {value}")),
    }
}
