//! Portfolio simulation step: one synchronized update across all positions

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::config::SimulationConfig;
use crate::correlation::CorrelationModel;
use crate::error::{Result, SimulatorError};
use crate::evolution::{apply_change, apply_spike, SpikeFrame};
use crate::movement::MovementGenerator;
use crate::position::Position;

/// Tick granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickMode {
    /// Full daily step with spike eligibility and reference update
    Major,
    /// Small cosmetic nudge for live ticking
    Minor,
}

/// Display unit a consumer has selected; simulation math always runs in base units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayCurrency {
    #[default]
    Btc,
    Usd,
}

impl fmt::Display for DisplayCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayCurrency::Btc => f.write_str("btc"),
            DisplayCurrency::Usd => f.write_str("usd"),
        }
    }
}

impl FromStr for DisplayCurrency {
    type Err = SimulatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "btc" | "sats" => Ok(DisplayCurrency::Btc),
            "usd" => Ok(DisplayCurrency::Usd),
            other => Err(SimulatorError::config(format!("unknown display currency: {other}"))),
        }
    }
}

/// A spike that fired during a major tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeEvent {
    pub name: String,
    pub day: u64,
    pub magnitude: f64,
    pub frames: Vec<SpikeFrame>,
}

/// Result of one tick: the complete next portfolio plus aggregate figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickOutcome {
    pub mode: TickMode,
    pub day: u64,
    pub positions: Vec<Position>,
    pub spikes: Vec<SpikeEvent>,
    /// Aggregate change of the portfolio against its initial values, in percent
    pub portfolio_change_percent: f64,
    /// Aggregate movement caused by this tick, in percent
    pub tick_delta_percent: f64,
}

impl TickOutcome {
    /// Percent delta to push into the global reference valuation, if any.
    ///
    /// Major ticks push the aggregate change against initial values; minor
    /// ticks never touch the reference.
    pub fn reference_delta_percent(&self) -> Option<f64> {
        match self.mode {
            TickMode::Major if self.portfolio_change_percent.is_finite() => {
                Some(self.portfolio_change_percent)
            }
            _ => None,
        }
    }
}

/// Owned, injectable simulation state: sentiment, momentum, day index and RNG
pub struct SimulationContext {
    config: SimulationConfig,
    generator: MovementGenerator,
    correlation: CorrelationModel,
    momentum: HashMap<(String, DisplayCurrency), f64>,
    currency: DisplayCurrency,
    day: u64,
    rng: StdRng,
}

impl SimulationContext {
    /// Create a context; seeded from the config when a seed is present
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self::with_rng(config, rng))
    }

    /// Create a context with a fixed seed and default parameters
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(SimulationConfig::seeded(seed), StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: SimulationConfig, rng: StdRng) -> Self {
        Self {
            generator: MovementGenerator::new(config.movement.clone(), config.spike.clone()),
            correlation: CorrelationModel::new(config.correlation.clone()),
            momentum: HashMap::new(),
            currency: DisplayCurrency::default(),
            day: 0,
            rng,
            config,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn generator(&self) -> &MovementGenerator {
        &self.generator
    }

    pub fn correlation(&self) -> &CorrelationModel {
        &self.correlation
    }

    pub fn correlation_mut(&mut self) -> &mut CorrelationModel {
        &mut self.correlation
    }

    /// Current simulated day index
    pub fn day(&self) -> u64 {
        self.day
    }

    /// Resume from a known day index (e.g. the highest persisted spike day)
    pub fn set_day(&mut self, day: u64) {
        self.day = day;
    }

    pub fn currency(&self) -> DisplayCurrency {
        self.currency
    }

    /// Switch the display currency; momentum is tracked separately per currency
    pub fn set_currency(&mut self, currency: DisplayCurrency) {
        self.currency = currency;
    }

    pub fn set_high_volatility(&mut self, enabled: bool) {
        self.config.spike.high_volatility = enabled;
    }

    /// Drop all minor-tick momentum
    pub fn reset_momentum(&mut self) {
        self.momentum.clear();
    }

    /// Momentum carried for a position under the current display currency
    pub fn momentum(&self, name: &str) -> f64 {
        self.momentum.get(&(name.to_string(), self.currency)).copied().unwrap_or(0.0)
    }

    /// Forget momentum entries for positions that no longer exist
    pub fn retain_momentum(&mut self, positions: &[Position]) {
        let names: HashSet<&str> = positions.iter().map(|p| p.name.as_str()).collect();
        self.momentum.retain(|(name, _), _| names.contains(name.as_str()));
    }
}

/// Reject portfolios with duplicate position names
pub fn check_unique_names(positions: &[Position]) -> Result<()> {
    let mut seen = HashSet::with_capacity(positions.len());
    for position in positions {
        if !seen.insert(position.name.as_str()) {
            return Err(SimulatorError::DuplicatePosition(position.name.clone()));
        }
    }
    Ok(())
}

/// Σ current values of a portfolio
pub fn total_current_value(positions: &[Position]) -> f64 {
    positions.iter().map(|p| p.current_value).sum()
}

/// Σ initial values of a portfolio
pub fn total_initial_value(positions: &[Position]) -> f64 {
    positions.iter().map(|p| p.initial_value).sum()
}

fn percent_change(from: f64, to: f64) -> f64 {
    if from > 0.0 && from.is_finite() && to.is_finite() {
        100.0 * (to - from) / from
    } else {
        0.0
    }
}

/// Run one tick over the whole portfolio.
///
/// The input slice is never mutated; the returned outcome holds the complete
/// next state so callers can swap it in as a single transition.
pub fn simulate_tick(
    ctx: &mut SimulationContext,
    positions: &[Position],
    mode: TickMode,
) -> TickOutcome {
    let before = total_current_value(positions);
    let mut next: Vec<Position> = positions.to_vec();
    let mut spikes = Vec::new();

    match mode {
        TickMode::Major => {
            ctx.day += 1;
            run_major(ctx, &mut next, &mut spikes);
        }
        TickMode::Minor => run_minor(ctx, &mut next),
    }

    let after = total_current_value(&next);
    let outcome = TickOutcome {
        mode,
        day: ctx.day,
        portfolio_change_percent: percent_change(total_initial_value(&next), after),
        tick_delta_percent: percent_change(before, after),
        positions: next,
        spikes,
    };

    tracing::debug!(
        "{:?} tick on day {}: {} positions, {} spikes, delta {:.4}%",
        mode,
        outcome.day,
        outcome.positions.len(),
        outcome.spikes.len(),
        outcome.tick_delta_percent
    );

    outcome
}

fn run_major(ctx: &mut SimulationContext, positions: &mut [Position], spikes: &mut Vec<SpikeEvent>) {
    let day = ctx.day;
    let high_volatility = ctx.config.spike.high_volatility;
    ctx.correlation.maybe_update(&mut ctx.rng);

    for position in positions.iter_mut() {
        let sentiment = ctx.correlation.snapshot(position.sector);
        let tier = position.market_cap_tier;

        if ctx.generator.should_spike(day, position.last_spike_day, high_volatility, &mut ctx.rng) {
            let magnitude = ctx.generator.spike_magnitude(tier, sentiment.market, &mut ctx.rng);
            let frames = apply_spike(position, magnitude, day);
            tracing::info!("Spike on {} at day {}: {:+.2}%", position.name, day, magnitude * 100.0);
            spikes.push(SpikeEvent { name: position.name.clone(), day, magnitude, frames });
        } else {
            let change = ctx.generator.daily_change(tier, sentiment, &mut ctx.rng);
            apply_change(position, change);
        }
    }
}

fn run_minor(ctx: &mut SimulationContext, positions: &mut [Position]) {
    let cfg = ctx.config.minor.clone();

    for position in positions.iter_mut() {
        let key = (position.name.clone(), ctx.currency);
        let previous = ctx.momentum.get(&key).copied().unwrap_or(0.0);
        let noise: f64 = ctx.rng.gen_range(-1.0..=1.0);
        let momentum = (cfg.momentum_decay * previous + (1.0 - cfg.momentum_decay) * noise).clamp(-1.0, 1.0);
        ctx.momentum.insert(key, momentum);

        let magnitude = if cfg.max_nudge > cfg.min_nudge {
            ctx.rng.gen_range(cfg.min_nudge..=cfg.max_nudge)
        } else {
            cfg.min_nudge
        };
        let up_probability = 0.5 + 0.25 * momentum;
        let nudge = if ctx.rng.gen::<f64>() < up_probability { magnitude } else { -magnitude };

        apply_change(position, nudge);
    }
}
