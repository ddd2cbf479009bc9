//! Bus configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{BusError, Result};

/// Configuration for the update bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Debounce window per topic in milliseconds; 0 delivers synchronously
    pub debounce_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { debounce_ms: 300 }
    }
}

impl BusConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.debounce_ms > 60_000 {
            return Err(BusError::config("debounce_ms must not exceed one minute"));
        }
        Ok(())
    }
}
