//! Typed bus payloads

use std::sync::Arc;

use nav_calculator::NavResult;
use price_simulator::{DisplayCurrency, Position, SpikeEvent};

use crate::topic::Topic;

/// An event published on the bus
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// A freshly computed NAV
    NavUpdated(NavResult),
    /// The complete portfolio after a tick or administrative change
    PortfolioUpdated(Arc<Vec<Position>>),
    /// Per-token price in sats and USD
    TokenPriceUpdated { sats: f64, usd: f64 },
    /// The display currency preference changed
    CurrencyChanged(DisplayCurrency),
    /// Eased sub-step frames of the spikes fired by a major tick
    SpikeProgress(Arc<Vec<SpikeEvent>>),
}

impl BusEvent {
    /// Topic the event is delivered on
    pub fn topic(&self) -> Topic {
        match self {
            BusEvent::NavUpdated(_) => Topic::NavUpdated,
            BusEvent::PortfolioUpdated(_) => Topic::PortfolioUpdated,
            BusEvent::TokenPriceUpdated { .. } => Topic::TokenPriceUpdated,
            BusEvent::CurrencyChanged(_) => Topic::CurrencyChanged,
            BusEvent::SpikeProgress(_) => Topic::SpikeProgress,
        }
    }

    /// Token price event derived from a NAV result
    pub fn token_price(nav: &NavResult) -> Self {
        BusEvent::TokenPriceUpdated { sats: nav.price_per_token_sats, usd: nav.price_per_token_usd }
    }
}
