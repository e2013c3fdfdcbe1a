//! Error types for the rigor backtesting engine.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data error (unordered or duplicate bars, invalid values).
    #[error("Data error: {0}")]
    Data(String),

    /// A vectorized signal array does not match the series length.
    #[error("Shape mismatch: {name} has {actual} elements, expected {expected}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Insufficient data for computation.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// A strategy failed while producing a decision.
    #[error("Strategy error: {0:#}")]
    Strategy(anyhow::Error),

    /// Accelerated portfolio backend failure.
    #[error("Backend error: {0}")]
    Backend(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a data error.
    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    /// Create a shape mismatch error for a named signal array.
    pub fn shape_mismatch(name: impl Into<String>, expected: usize, actual: usize) -> Self {
        Error::ShapeMismatch {
            name: name.into(),
            expected,
            actual,
        }
    }

    /// Create an insufficient data error.
    pub fn insufficient_data(msg: impl Into<String>) -> Self {
        Error::InsufficientData(msg.into())
    }

    /// Wrap a strategy failure.
    pub fn strategy(err: anyhow::Error) -> Self {
        Error::Strategy(err)
    }

    /// Create a backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Error::Backend(msg.into())
    }
}
