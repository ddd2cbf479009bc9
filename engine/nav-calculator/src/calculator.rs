//! NAV aggregation and token pricing

use chrono::{DateTime, Utc};
use price_simulator::{DisplayCurrency, Position, SATS_PER_BTC};
use serde::{Deserialize, Serialize};

use crate::config::{NavConfig, DEFAULT_TOTAL_SUPPLY};

/// Where the NAV figure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavSource {
    /// Sum of position valuations
    Portfolio,
    /// Global reference valuation (empty or unusable portfolio)
    Reference,
    /// Hardcoded default
    Default,
}

/// A computed NAV snapshot; recomputed on demand, never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavResult {
    pub nav_sats: f64,
    pub nav_usd: f64,
    pub price_per_token_sats: f64,
    pub price_per_token_usd: f64,
    pub total_supply: u64,
    pub exchange_rate: f64,
    pub change_percent: f64,
    pub source: NavSource,
    pub calculated_at: DateTime<Utc>,
}

impl NavResult {
    /// NAV in the display currency: BTC or USD
    pub fn nav_in(&self, currency: DisplayCurrency) -> f64 {
        match currency {
            DisplayCurrency::Btc => self.nav_sats / SATS_PER_BTC,
            DisplayCurrency::Usd => self.nav_usd,
        }
    }

    /// Token price in the display currency: sats or USD
    pub fn token_price_in(&self, currency: DisplayCurrency) -> f64 {
        match currency {
            DisplayCurrency::Btc => self.price_per_token_sats,
            DisplayCurrency::Usd => self.price_per_token_usd,
        }
    }
}

/// Convert satoshis to USD at `rate` dollars per BTC
pub fn sats_to_usd(sats: f64, rate: f64) -> f64 {
    sats / SATS_PER_BTC * rate
}

/// Stateless NAV calculator
#[derive(Debug, Clone, Default)]
pub struct NavCalculator {
    config: NavConfig,
}

impl NavCalculator {
    pub fn new(config: NavConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    /// Compute the NAV of `positions`.
    ///
    /// `reference` is the global reference valuation used when the portfolio
    /// is empty or sums to nothing usable; `rate` is the BTC/USD rate, with
    /// the configured fallback used when absent or invalid.
    pub fn calculate(
        &self,
        positions: &[Position],
        total_supply: u64,
        reference: f64,
        rate: Option<f64>,
    ) -> NavResult {
        let (nav_sats, source) = self.aggregate(positions, reference);

        let exchange_rate = match rate {
            Some(rate) if rate.is_finite() && rate > 0.0 => rate,
            Some(rate) => {
                tracing::warn!("Ignoring invalid exchange rate {}, using fallback", rate);
                self.config.fallback_rate
            }
            None => self.config.fallback_rate,
        };

        let total_supply = if total_supply == 0 {
            tracing::warn!("Total supply is zero, using default supply {}", DEFAULT_TOTAL_SUPPLY);
            DEFAULT_TOTAL_SUPPLY
        } else {
            total_supply
        };

        let price_per_token_sats = finite_or(nav_sats / total_supply as f64, 1.0).max(1.0);

        NavResult {
            nav_sats,
            nav_usd: finite_or(sats_to_usd(nav_sats, exchange_rate), 0.0),
            price_per_token_sats,
            price_per_token_usd: finite_or(sats_to_usd(price_per_token_sats, exchange_rate), 0.0),
            total_supply,
            exchange_rate,
            change_percent: self.change_percent(positions),
            source,
            calculated_at: Utc::now(),
        }
    }

    fn aggregate(&self, positions: &[Position], reference: f64) -> (f64, NavSource) {
        let sum: f64 = positions.iter().map(|p| p.current_value).sum();
        if !positions.is_empty() && sum.is_finite() && sum > 0.0 {
            return (sum, NavSource::Portfolio);
        }

        if reference.is_finite() && reference > 0.0 {
            if !positions.is_empty() {
                tracing::warn!("Portfolio sum {} unusable, falling back to reference valuation", sum);
            }
            return (reference, NavSource::Reference);
        }

        tracing::warn!("No usable NAV source, using default {}", self.config.default_nav_sats);
        (self.config.default_nav_sats, NavSource::Default)
    }

    /// Value-weighted average of position change percentages, clamped
    pub fn change_percent(&self, positions: &[Position]) -> f64 {
        let (weighted, total) = positions
            .iter()
            .filter(|p| p.current_value.is_finite() && p.change_percent.is_finite())
            .fold((0.0, 0.0), |(weighted, total), p| {
                (weighted + p.change_percent * p.current_value, total + p.current_value)
            });

        if total <= 0.0 {
            return 0.0;
        }

        let limit = self.config.max_change_percent;
        finite_or(weighted / total, 0.0).clamp(-limit, limit)
    }
}

fn finite_or(value: f64, default: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        tracing::warn!("Non-finite NAV intermediate, substituting {}", default);
        default
    }
}
