//! Core types and configuration for the rigor backtesting engine.
//!
//! This crate provides shared types used across all other crates:
//! - Market data and decision types (bars, signals, signal sets)
//! - The incremental and vectorized strategy contracts
//! - Configuration structures
//! - Common error types and numeric helpers

pub mod config;
pub mod error;
pub mod stats;
pub mod strategy;
pub mod types;

pub use config::{BacktestConfig, Config, MonteCarloConfig, MonteCarloMethod, WalkForwardConfig};
pub use error::{Error, Result};
pub use strategy::{Strategy, StrategyKind, VectorStrategy};
pub use types::*;
