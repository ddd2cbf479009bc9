//! Schema-versioned persisted records and their migration
//!
//! Version 1 records predate the schema field: either a bare array of
//! positions or an object with a `positions` array, each entry carrying
//! `name`, `value`, `current` and optionally `tokenAmount`/`lastSpikeDay`.
//! Version 2 is the current [`PortfolioRecord`] layout.

use chrono::{DateTime, Utc};
use price_simulator::Position;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StoreError};

/// Current schema version of every record written by this crate
pub const SCHEMA_VERSION: u32 = 2;

/// Token amount assumed for legacy entries that did not record one
const LEGACY_DEFAULT_TOKENS: u64 = 1_000;

/// Persisted portfolio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRecord {
    pub schema_version: u32,
    pub positions: Vec<Position>,
    #[serde(default)]
    pub loads_since_reset: u32,
    pub saved_at: DateTime<Utc>,
}

impl PortfolioRecord {
    pub fn new(positions: Vec<Position>, loads_since_reset: u32) -> Self {
        Self { schema_version: SCHEMA_VERSION, positions, loads_since_reset, saved_at: Utc::now() }
    }
}

/// Persisted global reference valuation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub schema_version: u32,
    pub value_sats: f64,
    pub updated_at: DateTime<Utc>,
}

impl ReferenceRecord {
    pub fn new(value_sats: f64) -> Self {
        Self { schema_version: SCHEMA_VERSION, value_sats, updated_at: Utc::now() }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyPosition {
    name: String,
    value: f64,
    current: f64,
    #[serde(default)]
    token_amount: Option<u64>,
    #[serde(default)]
    last_spike_day: Option<u64>,
}

/// Parse a portfolio record of any known schema version into the current one
pub fn migrate_portfolio(raw: &str) -> Result<PortfolioRecord> {
    let value: Value = serde_json::from_str(raw)?;

    let version = value
        .get("schema_version")
        .and_then(Value::as_u64)
        .map(|v| v as u32)
        .unwrap_or(1);

    match version {
        1 => migrate_v1(value),
        SCHEMA_VERSION => Ok(serde_json::from_value(value)?),
        other => Err(StoreError::UnsupportedSchema(other)),
    }
}

fn migrate_v1(value: Value) -> Result<PortfolioRecord> {
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut map) => match map.remove("positions") {
            Some(Value::Array(entries)) => entries,
            _ => return Err(StoreError::corruption("legacy record has no positions array")),
        },
        _ => return Err(StoreError::corruption("legacy record is neither array nor object")),
    };

    let mut positions = Vec::with_capacity(entries.len());
    for entry in entries {
        let legacy: LegacyPosition = serde_json::from_value(entry)?;
        let tokens = legacy.token_amount.unwrap_or(LEGACY_DEFAULT_TOKENS);
        let mut position = Position::new(legacy.name, legacy.value, tokens)?;
        position.set_current_value(legacy.current);
        position.last_spike_day = legacy.last_spike_day;
        positions.push(position);
    }

    tracing::info!("Migrated legacy portfolio record with {} positions", positions.len());
    Ok(PortfolioRecord::new(positions, 0))
}

/// Parse a reference record; bare numbers are accepted as version 1
pub fn migrate_reference(raw: &str) -> Result<ReferenceRecord> {
    let value: Value = serde_json::from_str(raw)?;

    if let Some(number) = value.as_f64() {
        return Ok(ReferenceRecord::new(number));
    }

    match value.get("schema_version").and_then(Value::as_u64) {
        Some(v) if v as u32 == SCHEMA_VERSION => Ok(serde_json::from_value(value)?),
        Some(v) => Err(StoreError::UnsupportedSchema(v as u32)),
        None => Err(StoreError::corruption("reference record has no schema version")),
    }
}
