//! Configuration for NAV calculation, the NAV guard and the rate service

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{NavError, Result};

/// BTC/USD rate used when no provider has ever answered
pub const FALLBACK_BTC_USD: f64 = 60_000.0;

/// Token supply used when the configured supply is zero
pub const DEFAULT_TOTAL_SUPPLY: u64 = 1_000_000;

/// NAV substituted when nothing better is available: 10 BTC in satoshis
pub const DEFAULT_NAV_SATS: f64 = 1_000_000_000.0;

/// NAV calculation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// Token supply the NAV is divided by
    pub total_supply: u64,

    /// Band the day-over-day change is clamped to (percent, symmetric)
    pub max_change_percent: f64,

    /// NAV used when neither portfolio nor reference yield a usable value
    pub default_nav_sats: f64,

    /// BTC/USD rate used when none is supplied
    pub fallback_rate: f64,

    /// Transition guard limits
    pub guard: GuardConfig,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            total_supply: DEFAULT_TOTAL_SUPPLY,
            max_change_percent: 50.0,
            default_nav_sats: DEFAULT_NAV_SATS,
            fallback_rate: FALLBACK_BTC_USD,
            guard: GuardConfig::default(),
        }
    }
}

impl NavConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.max_change_percent.is_finite() && self.max_change_percent > 0.0) {
            return Err(NavError::config("max_change_percent must be positive"));
        }
        if !(self.default_nav_sats.is_finite() && self.default_nav_sats > 0.0) {
            return Err(NavError::config("default_nav_sats must be positive"));
        }
        if !(self.fallback_rate.is_finite() && self.fallback_rate > 0.0) {
            return Err(NavError::config("fallback_rate must be positive"));
        }
        self.guard.validate()
    }
}

/// Limits on a single accepted NAV transition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Largest accepted rise from the last accepted NAV (percent)
    pub max_rise_percent: f64,

    /// Largest accepted fall from the last accepted NAV (percent)
    pub max_fall_percent: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self { max_rise_percent: 400.0, max_fall_percent: 80.0 }
    }
}

impl GuardConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.max_rise_percent.is_finite() && self.max_rise_percent > 0.0) {
            return Err(NavError::config("max_rise_percent must be positive"));
        }
        if !(self.max_fall_percent > 0.0 && self.max_fall_percent < 100.0) {
            return Err(NavError::config("max_fall_percent must be within (0, 100)"));
        }
        Ok(())
    }
}

/// Exchange rate service parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateConfig {
    /// Price endpoint returning `{"bitcoin": {"usd": <rate>}}`
    pub endpoint: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Attempts per refresh, including the first
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds
    pub initial_backoff_ms: u64,

    /// Upper bound for a retry delay in milliseconds
    pub max_backoff_ms: u64,

    /// Backoff multiplier
    pub backoff_multiplier: f64,

    /// Age after which a cached rate is refreshed, in seconds
    pub freshness_secs: u64,

    /// Rate used when the provider never answered
    pub fallback_rate: f64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=usd"
                .to_string(),
            request_timeout_secs: 5,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 4_000,
            backoff_multiplier: 2.0,
            freshness_secs: 3_600,
            fallback_rate: FALLBACK_BTC_USD,
        }
    }
}

impl RateConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn freshness(&self) -> Duration {
        Duration::from_secs(self.freshness_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(NavError::config("rate endpoint must not be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(NavError::config("request_timeout_secs must be greater than 0"));
        }
        if self.max_attempts == 0 {
            return Err(NavError::config("max_attempts must be greater than 0"));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(NavError::config("backoff_multiplier must be at least 1"));
        }
        if !(self.fallback_rate.is_finite() && self.fallback_rate > 0.0) {
            return Err(NavError::config("fallback_rate must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(NavConfig::default().validate().is_ok());
        assert!(RateConfig::default().validate().is_ok());

        let config = RateConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.freshness(), Duration::from_secs(3_600));
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = NavConfig { max_change_percent: f64::NAN, ..Default::default() };
        assert!(config.validate().is_err());

        let config = NavConfig {
            guard: GuardConfig { max_rise_percent: 400.0, max_fall_percent: 100.0 },
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RateConfig { max_attempts: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: NavConfig = serde_json::from_str(r#"{"total_supply": 500}"#).unwrap();
        assert_eq!(config.total_supply, 500);
        assert_eq!(config.fallback_rate, FALLBACK_BTC_USD);
        assert_eq!(config.guard.max_fall_percent, 80.0);
    }
}
