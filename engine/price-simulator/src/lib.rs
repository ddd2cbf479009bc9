//! # Price Simulator
//!
//! Stochastic valuation engine for a portfolio of simulated positions.
//!
//! The simulator produces plausible, bounded trajectories for every position:
//! Gaussian daily moves biased by market and sector sentiment, rare spikes
//! guarded by a cool-down, and a cosmetic minor "live ticking" nudge. All
//! mutable simulation state (sentiment, momentum, day index, random source)
//! lives in an explicitly owned [`SimulationContext`] so several independent
//! simulations can run side by side and tests can seed them.
//!
//! Values are expressed in base units (satoshis).

pub mod config;
pub mod correlation;
pub mod error;
pub mod evolution;
pub mod movement;
pub mod portfolio;
pub mod position;


pub use config::SimulationConfig;
pub use correlation::{CorrelationModel, SentimentSnapshot};
pub use error::{Result, SimulatorError};
pub use evolution::{ease_in_out_cubic, SpikeFrame};
pub use movement::MovementGenerator;
pub use portfolio::{
    check_unique_names, simulate_tick, total_current_value, total_initial_value, DisplayCurrency,
    SimulationContext, SpikeEvent, TickMode, TickOutcome,
};
pub use position::{MarketCapTier, Position, Sector};

/// Base units per whole coin (satoshis per BTC)
pub const SATS_PER_BTC: f64 = 100_000_000.0;

/// Minimum valuation any position may reach, in base units
pub const MIN_POSITION_VALUE: f64 = 1.0;

/// Minimum number of simulated days between two spikes of the same position
pub const SPIKE_COOLDOWN_DAYS: u64 = 5;

/// Number of sub-steps a spike is spread across
pub const SPIKE_SUB_STEPS: usize = 3;
