//! # NAV Calculator
//!
//! Aggregates simulated position valuations into a single net asset value,
//! converts it to USD, derives a per-token price and guards against
//! implausible NAV transitions.
//!
//! ## Architecture
//!
//! - **NavCalculator**: pure aggregation over a portfolio snapshot
//! - **NavGuard**: rejects zero NAV and jumps beyond +400% / -80%
//! - **RateService**: cached BTC/USD rate with retry, backoff and fallback
//!
//! ## Usage
//!
//! ```rust
//! use nav_calculator::{NavCalculator, NavConfig};
//! use price_simulator::Position;
//!
//! let calculator = NavCalculator::new(NavConfig::default());
//! let positions = vec![Position::new("MoonSwap", 200_000_000.0, 1_000_000).unwrap()];
//! let nav = calculator.calculate(&positions, 1_000_000, 1_000_000_000.0, Some(60_000.0));
//! assert_eq!(nav.nav_sats, 200_000_000.0);
//! assert_eq!(nav.price_per_token_sats, 200.0);
//! ```

pub mod calculator;
pub mod config;
pub mod error;
pub mod guard;
pub mod rates;

pub use calculator::{sats_to_usd, NavCalculator, NavResult, NavSource};
pub use config::{
    GuardConfig, NavConfig, RateConfig, DEFAULT_NAV_SATS, DEFAULT_TOTAL_SUPPLY, FALLBACK_BTC_USD,
};
pub use error::{NavError, Result};
pub use guard::NavGuard;
pub use rates::{ExchangeRateProvider, HttpRateProvider, RateService};
