//! Error types for network construction.

use thiserror::Error;

/// Result type for fallible construction paths.
pub type WannResult<T> = Result<T, WannError>;

/// Errors surfaced by this crate.
///
/// Tensor-level failures (shape mismatch in a matmul, device errors) keep
/// their `candle_core::Error` form and are only wrapped, never translated.
#[derive(Debug, Error)]
pub enum WannError {
    /// Invalid configuration, detected before any tensor is allocated.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Tensor operation failed
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

impl WannError {
    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
