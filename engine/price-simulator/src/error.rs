//! Error types for the price simulator

use thiserror::Error;

/// Result type alias for simulator operations
pub type Result<T> = std::result::Result<T, SimulatorError>;

/// Errors that can occur while building or simulating positions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulatorError {
    #[error("Invalid position {name}: {reason}")]
    InvalidPosition { name: String, reason: String },

    #[error("Duplicate position name: {0}")]
    DuplicatePosition(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SimulatorError {
    /// Create a new invalid position error
    pub fn invalid_position(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPosition { name: name.into(), reason: reason.into() }
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
