//! Error types for the update bus

use thiserror::Error;

/// Result type alias for bus operations
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur in the update bus
#[derive(Error, Debug)]
pub enum BusError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BusError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
