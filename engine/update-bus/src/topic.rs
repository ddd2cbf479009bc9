//! Bus topics and their legacy names

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named event stream on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Topic {
    NavUpdated,
    PortfolioUpdated,
    TokenPriceUpdated,
    CurrencyChanged,
    SpikeProgress,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::NavUpdated,
        Topic::PortfolioUpdated,
        Topic::TokenPriceUpdated,
        Topic::CurrencyChanged,
        Topic::SpikeProgress,
    ];

    /// Canonical event name
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::NavUpdated => "nav-updated",
            Topic::PortfolioUpdated => "portfolio-updated",
            Topic::TokenPriceUpdated => "token-price-updated",
            Topic::CurrencyChanged => "currency-changed",
            Topic::SpikeProgress => "spike-progress",
        }
    }

    /// Resolve a canonical or legacy event name
    pub fn from_name(name: &str) -> Option<Topic> {
        let topic = match name.trim() {
            "NavUpdated" | "nav-updated" | "navUpdated" | "nav-changed" => Topic::NavUpdated,
            "PortfolioUpdated" | "portfolio-updated" | "portfolioUpdated" | "portfolio-changed" => {
                Topic::PortfolioUpdated
            }
            "TokenPriceUpdated" | "token-price-updated" | "tokenPriceUpdated" | "ovt-price-updated" => {
                Topic::TokenPriceUpdated
            }
            "CurrencyChanged" | "currency-changed" | "currencyChanged" | "currency-preference-changed" => {
                Topic::CurrencyChanged
            }
            "SpikeProgress" | "spike-progress" | "spikeProgress" => Topic::SpikeProgress,
            _ => return None,
        };
        Some(topic)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_names_resolve() {
        assert_eq!(Topic::from_name("navUpdated"), Some(Topic::NavUpdated));
        assert_eq!(Topic::from_name("portfolio-changed"), Some(Topic::PortfolioUpdated));
        assert_eq!(Topic::from_name("ovt-price-updated"), Some(Topic::TokenPriceUpdated));
        assert_eq!(Topic::from_name("currency-preference-changed"), Some(Topic::CurrencyChanged));
        assert_eq!(Topic::from_name("spikeProgress"), Some(Topic::SpikeProgress));
        assert_eq!(Topic::from_name("something-else"), None);
    }

    #[test]
    fn test_canonical_names_roundtrip() {
        for topic in Topic::ALL {
            assert_eq!(Topic::from_name(topic.as_str()), Some(topic));
        }
    }
}
