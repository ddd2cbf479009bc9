//! Error types for the valuation store

use price_simulator::SimulatorError;
use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in the valuation store
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O errors from file-backed storage
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted data failed structural validation
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Persisted record was written by a newer schema
    #[error("Unsupported schema version: {0}")]
    UnsupportedSchema(u32),

    /// A position violated its invariants
    #[error("Invalid portfolio: {0}")]
    InvalidPortfolio(#[from] SimulatorError),

    /// Backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Create a new corruption error
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Create a new backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
