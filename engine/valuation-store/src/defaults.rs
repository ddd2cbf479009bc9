//! Canonical starter portfolio

use price_simulator::{Position, Sector};

/// Default global reference valuation: 10 BTC in satoshis
pub const DEFAULT_REFERENCE_SATS: f64 = 1_000_000_000.0;

/// (name, initial value in sats, token amount, sector)
const STARTER_POSITIONS: &[(&str, f64, u64, Sector)] = &[
    ("Polar Bridge", 300_000_000.0, 1_500_000, Sector::Infrastructure),
    ("MoonSwap", 200_000_000.0, 1_000_000, Sector::Defi),
    ("Satoshi Vault", 150_000_000.0, 600_000, Sector::Defi),
    ("Pixel Arena", 100_000_000.0, 500_000, Sector::Gaming),
    ("Rune Punks", 80_000_000.0, 250_000, Sector::Collectibles),
    ("Ordinal Labs", 70_000_000.0, 350_000, Sector::Collectibles),
    ("Lightning Node Co", 60_000_000.0, 300_000, Sector::Infrastructure),
    ("Acme Holdings", 40_000_000.0, 200_000, Sector::General),
];

/// The canonical default portfolio; every entry is fresh (current == initial)
pub fn default_portfolio() -> Vec<Position> {
    STARTER_POSITIONS
        .iter()
        .filter_map(|(name, value, tokens, sector)| {
            Position::with_sector(*name, *value, *tokens, *sector)
                .map_err(|e| tracing::error!("Invalid starter position {}: {}", name, e))
                .ok()
        })
        .collect()
}
