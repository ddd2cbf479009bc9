//! Configuration for the valuation store

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::defaults::DEFAULT_REFERENCE_SATS;
use crate::error::{Result, StoreError};

/// Configuration for the valuation store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base directory for file-backed storage
    pub data_dir: PathBuf,

    /// Loads without a reset after which the portfolio is reset to defaults
    pub reset_after_loads: u32,

    /// Absolute ceiling for any single position valuation (base units)
    pub value_ceiling: f64,

    /// Absolute ceiling for the global reference valuation (base units)
    pub reference_ceiling: f64,

    /// Reference valuation installed on first access or reset (base units)
    pub default_reference: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            reset_after_loads: 10,
            value_ceiling: 1e13,     // 100k BTC
            reference_ceiling: 1e14, // 1M BTC
            default_reference: DEFAULT_REFERENCE_SATS,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with custom data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into(), ..Default::default() }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.reset_after_loads == 0 {
            return Err(StoreError::config("reset_after_loads must be greater than 0"));
        }

        if !(self.value_ceiling.is_finite() && self.value_ceiling > 1.0) {
            return Err(StoreError::config("value_ceiling must be a finite value above 1"));
        }

        if !(self.default_reference.is_finite() && self.default_reference > 0.0) {
            return Err(StoreError::config("default_reference must be a positive finite value"));
        }

        if self.default_reference > self.reference_ceiling {
            return Err(StoreError::config("default_reference must not exceed reference_ceiling"));
        }

        Ok(())
    }
}
