//! Error types for NAV calculation and exchange rates

use std::time::Duration;
use thiserror::Error;

/// Result type for NAV operations
pub type Result<T> = std::result::Result<T, NavError>;

/// Errors that can occur while computing NAV or fetching rates
#[derive(Error, Debug)]
pub enum NavError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate provider timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid exchange rate: {0}")]
    InvalidRate(f64),

    #[error("Rate provider error: {0}")]
    Provider(String),

    #[error("NAV transition rejected ({previous} -> {next} sats): {reason}")]
    GuardViolation { previous: f64, next: f64, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl NavError {
    /// Create a new provider error
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error came from a NAV guard rejection
    pub fn is_guard_violation(&self) -> bool {
        matches!(self, Self::GuardViolation { .. })
    }
}
