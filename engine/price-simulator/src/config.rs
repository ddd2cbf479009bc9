//! Configuration for the price simulator

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulatorError};

/// Configuration for the price simulator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Ordinary daily movement parameters
    pub movement: MovementConfig,

    /// Spike eligibility and magnitude parameters
    pub spike: SpikeConfig,

    /// Market/sector sentiment parameters
    pub correlation: CorrelationConfig,

    /// Minor (live ticking) nudge parameters
    pub minor: MinorTickConfig,

    /// Optional RNG seed for reproducible runs
    pub seed: Option<u64>,
}

/// Ordinary daily movement parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Lower bound of an ordinary daily change (fraction, e.g. -0.03)
    pub min_daily_change: f64,

    /// Upper bound of an ordinary daily change (fraction, e.g. 0.05)
    pub max_daily_change: f64,

    /// Apply the biased coin flip favouring upward drift
    pub upward_bias: bool,

    /// Probability the biased coin lands up
    pub bias_up_probability: f64,

    /// Offset added (or subtracted) by the biased coin
    pub bias_offset: f64,

    /// Weight of the market sentiment in a daily draw
    pub market_weight: f64,

    /// Weight of the sector sentiment in a daily draw
    pub sector_weight: f64,
}

/// Spike eligibility and magnitude parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpikeConfig {
    /// Minimum days between two spikes of the same position
    pub cooldown_days: u64,

    /// Daily spike probability in the normal regime
    pub base_probability: f64,

    /// Daily spike probability in the high-volatility regime
    pub high_volatility_probability: f64,

    /// Days without a spike after which the probability starts to ramp
    pub ramp_after_days: u64,

    /// Probability added per day beyond `ramp_after_days`
    pub ramp_per_day: f64,

    /// Hard cap on the daily spike probability
    pub max_probability: f64,

    /// Probability a spike is upward when sentiment is neutral
    pub up_probability: f64,

    /// Maximum shift of `up_probability` caused by market sentiment
    pub sentiment_sign_shift: f64,

    /// Run in the high-volatility regime
    pub high_volatility: bool,
}

/// Market/sector sentiment parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Probability the sentiment is refreshed on a major tick
    pub update_probability: f64,

    /// Share of the previous market sentiment retained per update
    pub market_momentum: f64,

    /// Half-width of the uniform market perturbation
    pub market_perturbation: f64,

    /// Share of the previous sector sentiment retained per update
    pub sector_momentum: f64,

    /// Half-width of the uniform sector perturbation
    pub sector_perturbation: f64,

    /// Influence of the market sentiment on every sector
    pub sector_market_influence: f64,
}

/// Minor (live ticking) nudge parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinorTickConfig {
    /// Smallest nudge magnitude (fraction)
    pub min_nudge: f64,

    /// Largest nudge magnitude (fraction)
    pub max_nudge: f64,

    /// Share of the previous momentum retained per minor tick
    pub momentum_decay: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            movement: MovementConfig::default(),
            spike: SpikeConfig::default(),
            correlation: CorrelationConfig::default(),
            minor: MinorTickConfig::default(),
            seed: None,
        }
    }
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            min_daily_change: -0.03,
            max_daily_change: 0.05,
            upward_bias: true,
            bias_up_probability: 0.65,
            bias_offset: 0.01,
            market_weight: 0.6,
            sector_weight: 0.3,
        }
    }
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            cooldown_days: crate::SPIKE_COOLDOWN_DAYS,
            base_probability: 1.0 / 9.5,
            high_volatility_probability: 1.0 / 7.0,
            ramp_after_days: 10,
            ramp_per_day: 0.005,
            max_probability: 0.25,
            up_probability: 0.7,
            sentiment_sign_shift: 0.1,
            high_volatility: false,
        }
    }
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            update_probability: 0.35,
            market_momentum: 0.7,
            market_perturbation: 0.3,
            sector_momentum: 0.4,
            sector_perturbation: 0.25,
            sector_market_influence: 0.6,
        }
    }
}

impl Default for MinorTickConfig {
    fn default() -> Self {
        Self { min_nudge: 0.001, max_nudge: 0.002, momentum_decay: 0.7 }
    }
}

fn check_probability(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(SimulatorError::config(format!("{name} must be within [0, 1], got {value}")));
    }
    Ok(())
}

impl SimulationConfig {
    /// Create a configuration with a fixed RNG seed
    pub fn seeded(seed: u64) -> Self {
        Self { seed: Some(seed), ..Default::default() }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let movement = &self.movement;
        if movement.min_daily_change >= movement.max_daily_change {
            return Err(SimulatorError::config("min_daily_change must be below max_daily_change"));
        }
        if movement.min_daily_change <= -1.0 {
            return Err(SimulatorError::config("min_daily_change must be above -100%"));
        }
        check_probability("bias_up_probability", movement.bias_up_probability)?;

        let spike = &self.spike;
        check_probability("base_probability", spike.base_probability)?;
        check_probability("high_volatility_probability", spike.high_volatility_probability)?;
        check_probability("max_probability", spike.max_probability)?;
        check_probability("up_probability", spike.up_probability)?;
        if spike.cooldown_days < crate::SPIKE_COOLDOWN_DAYS {
            return Err(SimulatorError::config(format!(
                "spike cooldown_days must be at least {}",
                crate::SPIKE_COOLDOWN_DAYS
            )));
        }

        check_probability("update_probability", self.correlation.update_probability)?;

        let minor = &self.minor;
        if minor.min_nudge < 0.0 || minor.min_nudge > minor.max_nudge {
            return Err(SimulatorError::config("minor nudge bounds are inverted or negative"));
        }
        check_probability("momentum_decay", minor.momentum_decay)?;

        Ok(())
    }
}
