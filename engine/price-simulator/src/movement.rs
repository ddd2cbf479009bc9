//! Random movement generator: daily changes, spike decisions and spike magnitudes
//!
//! Every function takes the random source explicitly, so a seeded
//! [`rand::rngs::StdRng`] reproduces an exact trajectory.

use rand::Rng;
use std::f64::consts::PI;

use crate::config::{MovementConfig, SpikeConfig};
use crate::correlation::SentimentSnapshot;
use crate::position::MarketCapTier;

/// Generates percentage changes (as fractions) for positions
#[derive(Debug, Clone)]
pub struct MovementGenerator {
    movement: MovementConfig,
    spike: SpikeConfig,
}

impl MovementGenerator {
    pub fn new(movement: MovementConfig, spike: SpikeConfig) -> Self {
        Self { movement, spike }
    }

    pub fn movement_config(&self) -> &MovementConfig {
        &self.movement
    }

    pub fn spike_config(&self) -> &SpikeConfig {
        &self.spike
    }

    /// Standard normal draw using the Box-Muller transform
    pub fn gaussian<R: Rng + ?Sized>(rng: &mut R) -> f64 {
        // gen() yields [0, 1); flip it so ln never sees zero
        let u1: f64 = 1.0 - rng.gen::<f64>();
        let u2: f64 = rng.gen::<f64>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    /// Ordinary daily change for a position, clamped to the configured band
    pub fn daily_change<R: Rng + ?Sized>(
        &self,
        tier: MarketCapTier,
        sentiment: SentimentSnapshot,
        rng: &mut R,
    ) -> f64 {
        let cfg = &self.movement;
        let volatility = tier.volatility();

        let mut change = Self::gaussian(rng) * volatility;

        if cfg.upward_bias {
            if rng.gen::<f64>() < cfg.bias_up_probability {
                change += cfg.bias_offset;
            } else {
                change -= cfg.bias_offset;
            }
        }

        change += volatility * (cfg.market_weight * sentiment.market + cfg.sector_weight * sentiment.sector);

        self.clamp_daily(change)
    }

    /// Clamp a change into the ordinary daily band
    pub fn clamp_daily(&self, change: f64) -> f64 {
        if !change.is_finite() {
            return 0.0;
        }
        change.clamp(self.movement.min_daily_change, self.movement.max_daily_change)
    }

    /// Daily spike probability; zero inside the cool-down window
    pub fn spike_probability(&self, day: u64, last_spike_day: Option<u64>, high_volatility: bool) -> f64 {
        let cfg = &self.spike;
        let base = if high_volatility { cfg.high_volatility_probability } else { cfg.base_probability };

        let Some(last) = last_spike_day else {
            return base.min(cfg.max_probability);
        };

        let elapsed = day.saturating_sub(last);
        if day < last || elapsed < cfg.cooldown_days {
            return 0.0;
        }

        let ramp = if elapsed >= cfg.ramp_after_days {
            (elapsed - cfg.ramp_after_days) as f64 * cfg.ramp_per_day
        } else {
            0.0
        };

        (base + ramp).min(cfg.max_probability)
    }

    /// Decide whether a position spikes on `day`
    pub fn should_spike<R: Rng + ?Sized>(
        &self,
        day: u64,
        last_spike_day: Option<u64>,
        high_volatility: bool,
        rng: &mut R,
    ) -> bool {
        let probability = self.spike_probability(day, last_spike_day, high_volatility);
        if probability <= 0.0 {
            return false;
        }
        rng.gen::<f64>() < probability
    }

    /// Signed spike magnitude drawn from the tier's range
    pub fn spike_magnitude<R: Rng + ?Sized>(
        &self,
        tier: MarketCapTier,
        market_sentiment: f64,
        rng: &mut R,
    ) -> f64 {
        let (low, high) = tier.spike_range();
        let magnitude = rng.gen_range(low..=high);

        let shift = self.spike.sentiment_sign_shift * market_sentiment.clamp(-1.0, 1.0);
        let up_probability = (self.spike.up_probability + shift).clamp(0.0, 1.0);

        if rng.gen::<f64>() < up_probability {
            magnitude
        } else {
            -magnitude
        }
    }
}

impl Default for MovementGenerator {
    fn default() -> Self {
        Self::new(MovementConfig::default(), SpikeConfig::default())
    }
}
