//! Simulated position data model

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SimulatorError};
use crate::{MIN_POSITION_VALUE, SATS_PER_BTC};

/// Valuation threshold (base units) from which a position counts as mid cap
pub const MID_CAP_THRESHOLD: f64 = SATS_PER_BTC;

/// Valuation threshold (base units) from which a position counts as large cap
pub const LARGE_CAP_THRESHOLD: f64 = 5.0 * SATS_PER_BTC;

/// Sector tag used to correlate positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sector {
    Defi,
    Gaming,
    Infrastructure,
    Collectibles,
    General,
}

impl Sector {
    pub const ALL: [Sector; 5] = [
        Sector::Defi,
        Sector::Gaming,
        Sector::Infrastructure,
        Sector::Collectibles,
        Sector::General,
    ];

    /// Derive a sector from substrings of a position name, falling back to `General`
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        let matches = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

        if matches(&["swap", "dex", "lend", "yield", "finance", "defi", "vault"]) {
            Sector::Defi
        } else if matches(&["game", "play", "quest", "arena", "guild"]) {
            Sector::Gaming
        } else if matches(&["chain", "node", "layer", "bridge", "network", "protocol"]) {
            Sector::Infrastructure
        } else if matches(&["nft", "punk", "art", "ordinal", "rune", "inscription"]) {
            Sector::Collectibles
        } else {
            Sector::General
        }
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Sector::Defi => "defi",
            Sector::Gaming => "gaming",
            Sector::Infrastructure => "infrastructure",
            Sector::Collectibles => "collectibles",
            Sector::General => "general",
        };
        f.write_str(name)
    }
}

/// Market-cap tier derived from a valuation; smaller tiers are more volatile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketCapTier {
    Small,
    Mid,
    Large,
}

impl MarketCapTier {
    /// Tier for a valuation in base units
    pub fn from_value(value: f64) -> Self {
        if value >= LARGE_CAP_THRESHOLD {
            MarketCapTier::Large
        } else if value >= MID_CAP_THRESHOLD {
            MarketCapTier::Mid
        } else {
            MarketCapTier::Small
        }
    }

    /// Standard deviation of an ordinary daily move
    pub fn volatility(&self) -> f64 {
        match self {
            MarketCapTier::Small => 0.04,
            MarketCapTier::Mid => 0.03,
            MarketCapTier::Large => 0.02,
        }
    }

    /// Uniform range a spike magnitude is drawn from
    pub fn spike_range(&self) -> (f64, f64) {
        match self {
            MarketCapTier::Small => (0.35, 0.60),
            MarketCapTier::Mid => (0.30, 0.55),
            MarketCapTier::Large => (0.25, 0.50),
        }
    }
}

/// One simulated holding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub name: String,
    pub initial_value: f64,
    pub current_value: f64,
    pub change_percent: f64,
    pub token_amount: u64,
    pub price_per_token: f64,
    #[serde(default)]
    pub last_spike_day: Option<u64>,
    pub sector: Sector,
    pub market_cap_tier: MarketCapTier,
}

impl Position {
    /// Create a position whose current value equals its initial value
    pub fn new(name: impl Into<String>, initial_value: f64, token_amount: u64) -> Result<Self> {
        let name = name.into();
        let sector = Sector::from_name(&name);
        Self::with_sector(name, initial_value, token_amount, sector)
    }

    /// Create a position with an explicit sector tag
    pub fn with_sector(
        name: impl Into<String>,
        initial_value: f64,
        token_amount: u64,
        sector: Sector,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SimulatorError::invalid_position(name, "name must not be empty"));
        }
        if !initial_value.is_finite() || initial_value < MIN_POSITION_VALUE {
            return Err(SimulatorError::invalid_position(
                name,
                format!("initial value must be finite and at least 1, got {initial_value}"),
            ));
        }
        if token_amount == 0 {
            return Err(SimulatorError::invalid_position(name, "token amount must be positive"));
        }

        let mut position = Self {
            name,
            initial_value,
            current_value: initial_value,
            change_percent: 0.0,
            token_amount,
            price_per_token: 0.0,
            last_spike_day: None,
            sector,
            market_cap_tier: MarketCapTier::from_value(initial_value),
        };
        position.refresh_derived();
        Ok(position)
    }

    /// Builder-style override of the current value, used when restoring state
    pub fn with_current_value(mut self, current_value: f64) -> Self {
        self.set_current_value(current_value);
        self
    }

    /// Set the current value, clamping to the minimum and refreshing derived fields
    pub fn set_current_value(&mut self, value: f64) {
        self.current_value = if value.is_finite() {
            value.round().max(MIN_POSITION_VALUE)
        } else {
            tracing::warn!("Non-finite value for position {}, keeping {}", self.name, self.current_value);
            self.current_value
        };
        self.refresh_derived();
    }

    /// Recompute change percent, price per token and tier from the stored values
    pub fn refresh_derived(&mut self) {
        self.change_percent = if self.initial_value > 0.0 {
            100.0 * (self.current_value - self.initial_value) / self.initial_value
        } else {
            0.0
        };
        self.price_per_token = if self.token_amount > 0 {
            (self.current_value / self.token_amount as f64).max(MIN_POSITION_VALUE)
        } else {
            MIN_POSITION_VALUE
        };
        self.market_cap_tier = MarketCapTier::from_value(self.current_value);
    }

    /// Repair a position restored from outside the simulator so every invariant holds
    pub fn normalize(&mut self) {
        if !self.current_value.is_finite() || self.current_value < MIN_POSITION_VALUE {
            self.current_value = MIN_POSITION_VALUE;
        }
        self.refresh_derived();
    }

    /// Check the structural invariants of the position
    pub fn validate(&self, value_ceiling: f64) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SimulatorError::invalid_position(&self.name, "name must not be empty"));
        }
        if self.token_amount == 0 {
            return Err(SimulatorError::invalid_position(&self.name, "token amount must be positive"));
        }
        for (label, value) in [("initial", self.initial_value), ("current", self.current_value)] {
            if !value.is_finite() || value < MIN_POSITION_VALUE {
                return Err(SimulatorError::invalid_position(
                    &self.name,
                    format!("{label} value {value} is not a valid valuation"),
                ));
            }
            if value > value_ceiling {
                return Err(SimulatorError::invalid_position(
                    &self.name,
                    format!("{label} value {value} exceeds ceiling {value_ceiling}"),
                ));
            }
        }
        Ok(())
    }

    /// Days elapsed since the last spike, if any
    pub fn days_since_spike(&self, day: u64) -> Option<u64> {
        self.last_spike_day.map(|last| day.saturating_sub(last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sector_from_name() {
        assert_eq!(Sector::from_name("MoonSwap"), Sector::Defi);
        assert_eq!(Sector::from_name("Pixel Arena"), Sector::Gaming);
        assert_eq!(Sector::from_name("Polar Bridge"), Sector::Infrastructure);
        assert_eq!(Sector::from_name("Rune Punks"), Sector::Collectibles);
        assert_eq!(Sector::from_name("Acme"), Sector::General);
    }

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(MarketCapTier::from_value(50_000_000.0), MarketCapTier::Small);
        assert_eq!(MarketCapTier::from_value(100_000_000.0), MarketCapTier::Mid);
        assert_eq!(MarketCapTier::from_value(600_000_000.0), MarketCapTier::Large);
        assert!(MarketCapTier::Small.volatility() > MarketCapTier::Large.volatility());
    }

    #[test]
    fn test_new_position_derived_fields() {
        let position = Position::new("Polar Bridge", 100_000_000.0, 500_000).unwrap();
        assert_eq!(position.current_value, 100_000_000.0);
        assert_eq!(position.change_percent, 0.0);
        assert_eq!(position.price_per_token, 200.0);
        assert_eq!(position.sector, Sector::Infrastructure);
        assert_eq!(position.market_cap_tier, MarketCapTier::Mid);
    }

    #[test]
    fn test_rejects_invalid_positions() {
        assert!(Position::new("", 100.0, 1).is_err());
        assert!(Position::new("a", 0.0, 1).is_err());
        assert!(Position::new("a", f64::NAN, 1).is_err());
        assert!(Position::new("a", 100.0, 0).is_err());
    }

    #[test]
    fn test_set_current_value_clamps() {
        let mut position = Position::new("Acme", 1_000.0, 10).unwrap();
        position.set_current_value(-50.0);
        assert_eq!(position.current_value, 1.0);
        assert_eq!(position.price_per_token, 1.0);

        position.set_current_value(f64::INFINITY);
        assert_eq!(position.current_value, 1.0);
    }

    #[test]
    fn test_validate_ceiling() {
        let position = Position::new("Acme", 1_000.0, 10).unwrap();
        assert!(position.validate(10_000.0).is_ok());
        assert!(position.validate(500.0).is_err());
    }
}
