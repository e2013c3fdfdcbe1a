//! Indicators and reference strategies for the rigor backtesting engine.
//!
//! This crate handles:
//! - Streaming simple moving average
//! - Wilder-smoothed RSI and ATR
//! - Reference strategies in incremental and vectorized form

pub mod atr;
pub mod rsi;
pub mod sma;
pub mod strategies;
pub mod wilder;

pub use atr::Atr;
pub use rsi::Rsi;
pub use sma::Sma;
pub use strategies::{AtrBreakout, RsiReversion, SmaCrossover, SmaCrossoverSignals};
pub use wilder::WilderSmoother;
