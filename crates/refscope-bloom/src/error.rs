//! Error types for refscope-bloom operations.

use thiserror::Error;

/// The error type for candidate filter operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The encoded filter payload could not be parsed.
    #[error("filter decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The requested false-positive rate is outside `(0, 1)`.
    #[error("false-positive rate must be within (0, 1), got {0}")]
    InvalidRate(f64),

    /// The payload parsed but its parameters are inconsistent.
    #[error("corrupt filter: {0}")]
    Corrupt(String),
}

/// A specialized Result type for refscope-bloom operations.
pub type Result<T> = std::result::Result<T, Error>;
