//! Service configuration management

use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use nav_calculator::{NavConfig, RateConfig};
use price_simulator::{DisplayCurrency, SimulationConfig};
use update_bus::BusConfig;
use valuation_store::StoreConfig;

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Price simulator configuration
    pub simulation: SimulationConfig,

    /// Valuation store configuration
    pub store: StoreConfig,

    /// NAV calculation configuration
    pub nav: NavConfig,

    /// Exchange rate service configuration
    pub rates: RateConfig,

    /// Update bus configuration
    pub bus: BusConfig,

    /// Tick and maintenance timers
    pub schedule: ScheduleConfig,

    /// Service-level configuration
    pub service: ServiceSettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Where valuation state is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// JSON files under the store's data directory
    Local,
    /// Process memory, lost on exit
    Memory,
    /// No backend at all
    None,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "file" => Ok(StorageKind::Local),
            "memory" | "in-memory" => Ok(StorageKind::Memory),
            "none" => Ok(StorageKind::None),
            other => Err(anyhow::anyhow!("Invalid storage kind: {}", other)),
        }
    }
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Storage backend for valuation state
    pub storage: StorageKind,

    /// Skip the network rate provider and use the fallback rate
    pub offline: bool,

    /// Display currency selected at startup
    pub currency: DisplayCurrency,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            storage: StorageKind::Local,
            offline: false,
            currency: DisplayCurrency::Btc,
            shutdown_timeout_secs: 10,
        }
    }
}

/// Tick and maintenance timers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Lower bound of the randomized major tick interval in seconds
    pub major_min_secs: u64,

    /// Upper bound of the randomized major tick interval in seconds
    pub major_max_secs: u64,

    /// Minor tick interval in milliseconds
    pub minor_interval_ms: u64,

    /// Run minor (live) ticks at all
    pub minor_enabled: bool,

    /// Interval between background saves in seconds
    pub flush_interval_secs: u64,

    /// Interval between exchange rate freshness checks in seconds
    pub rate_check_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            major_min_secs: 30,
            major_max_secs: 75,
            minor_interval_ms: 3_000,
            minor_enabled: true,
            flush_interval_secs: 60,
            rate_check_secs: 300,
        }
    }
}

impl ScheduleConfig {
    /// Draw the delay until the next major tick
    pub fn major_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        Duration::from_secs(rng.gen_range(self.major_min_secs..=self.major_max_secs))
    }

    pub fn minor_interval(&self) -> Duration {
        Duration::from_millis(self.minor_interval_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn rate_check_interval(&self) -> Duration {
        Duration::from_secs(self.rate_check_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

/// Load configuration from an optional TOML file, then the environment
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    let mut config = match path {
        Some(path) => load_from_file(path)?,
        None => ServiceConfig::default(),
    };

    // Override with environment variables
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;

    validate_config(&config)?;

    Ok(config)
}

/// Load configuration from a TOML file; missing sections take their defaults
pub fn load_from_file(path: &Path) -> Result<ServiceConfig> {
    tracing::debug!("Loading configuration from file: {:?}", path);
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {:?}", path))?;
    toml::from_str(&raw).with_context(|| format!("Failed to parse configuration file: {:?}", path))
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e| anyhow::anyhow!("Invalid value for {}: {} ({})", key, raw, e))
}

/// Apply `NAV_*` overrides read through `lookup`
pub fn apply_env_overrides(
    config: &mut ServiceConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(level) = lookup("NAV_LOG_LEVEL") {
        config.logging.level = level;
    }

    if let Some(format) = lookup("NAV_LOG_FORMAT") {
        config.logging.format = format;
    }

    if let Some(data_dir) = lookup("NAV_DATA_DIR") {
        config.store.data_dir = PathBuf::from(data_dir);
    }

    if let Some(storage) = lookup("NAV_STORAGE") {
        config.service.storage = parse_var("NAV_STORAGE", &storage)?;
    }

    if let Some(offline) = lookup("NAV_OFFLINE") {
        config.service.offline = parse_var("NAV_OFFLINE", &offline)?;
    }

    if let Some(currency) = lookup("NAV_CURRENCY") {
        config.service.currency = parse_var("NAV_CURRENCY", &currency)?;
    }

    if let Some(seed) = lookup("NAV_SEED") {
        config.simulation.seed = Some(parse_var("NAV_SEED", &seed)?);
    }

    if let Some(supply) = lookup("NAV_TOTAL_SUPPLY") {
        config.nav.total_supply = parse_var("NAV_TOTAL_SUPPLY", &supply)?;
    }

    if let Some(endpoint) = lookup("NAV_RATE_ENDPOINT") {
        config.rates.endpoint = endpoint;
    }

    if let Some(ms) = lookup("NAV_MINOR_TICK_MS") {
        config.schedule.minor_interval_ms = parse_var("NAV_MINOR_TICK_MS", &ms)?;
    }

    if let Some(ms) = lookup("NAV_DEBOUNCE_MS") {
        config.bus.debounce_ms = parse_var("NAV_DEBOUNCE_MS", &ms)?;
    }

    Ok(())
}

/// Validate configuration
pub fn validate_config(config: &ServiceConfig) -> Result<()> {
    config.simulation.validate().context("Invalid simulation configuration")?;
    config.nav.validate().context("Invalid NAV configuration")?;
    config.rates.validate().context("Invalid rate configuration")?;
    config.store.validate().context("Invalid store configuration")?;
    config.bus.validate().context("Invalid bus configuration")?;

    let schedule = &config.schedule;
    if schedule.major_min_secs == 0 || schedule.major_min_secs > schedule.major_max_secs {
        return Err(anyhow::anyhow!(
            "Invalid major tick interval: {}..{} seconds",
            schedule.major_min_secs,
            schedule.major_max_secs
        ));
    }
    if schedule.minor_interval_ms == 0 {
        return Err(anyhow::anyhow!("minor_interval_ms must be greater than 0"));
    }
    if schedule.flush_interval_secs == 0 || schedule.rate_check_secs == 0 {
        return Err(anyhow::anyhow!("Maintenance intervals must be greater than 0"));
    }

    // Validate log level
    let level = config.logging.level.split(',').next().unwrap_or_default();
    match level {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ if level.contains('=') => {}
        _ => return Err(anyhow::anyhow!("Invalid log level: {}", config.logging.level)),
    }

    // Validate log format
    match config.logging.format.as_str() {
        "json" | "pretty" | "compact" => {}
        _ => return Err(anyhow::anyhow!("Invalid log format: {}", config.logging.format)),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ServiceConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.schedule.minor_interval(), Duration::from_secs(3));
        assert_eq!(config.bus.debounce_ms, 300);
    }

    #[test]
    fn test_major_delay_within_bounds() {
        let schedule = ScheduleConfig::default();
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..200 {
            let delay = schedule.major_delay(&mut rng);
            assert!(delay >= Duration::from_secs(30) && delay <= Duration::from_secs(75));
        }
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServiceConfig::default();
        apply_env_overrides(
            &mut config,
            lookup(&[
                ("NAV_STORAGE", "memory"),
                ("NAV_OFFLINE", "true"),
                ("NAV_CURRENCY", "usd"),
                ("NAV_SEED", "42"),
                ("NAV_DEBOUNCE_MS", "50"),
                ("NAV_DATA_DIR", "/tmp/nav"),
            ]),
        )
        .unwrap();

        assert_eq!(config.service.storage, StorageKind::Memory);
        assert!(config.service.offline);
        assert_eq!(config.service.currency, DisplayCurrency::Usd);
        assert_eq!(config.simulation.seed, Some(42));
        assert_eq!(config.bus.debounce_ms, 50);
        assert_eq!(config.store.data_dir, PathBuf::from("/tmp/nav"));
    }

    #[test]
    fn test_bad_env_value_is_an_error() {
        let mut config = ServiceConfig::default();
        let result = apply_env_overrides(&mut config, lookup(&[("NAV_SEED", "not-a-number")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_partial_toml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nav.toml");
        std::fs::write(
            &path,
            r#"
[schedule]
major_min_secs = 5
major_max_secs = 10

[nav]
total_supply = 21000000

[simulation.spike]
cooldown_days = 7

[service]
storage = "memory"
"#,
        )
        .unwrap();

        let config = load_from_file(&path).unwrap();
        assert_eq!(config.schedule.major_min_secs, 5);
        assert_eq!(config.schedule.minor_interval_ms, 3_000);
        assert_eq!(config.nav.total_supply, 21_000_000);
        assert_eq!(config.simulation.spike.cooldown_days, 7);
        assert_eq!(config.service.storage, StorageKind::Memory);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = ServiceConfig::default();
        config.schedule.major_min_secs = 80;
        assert!(validate_config(&config).is_err());

        let mut config = ServiceConfig::default();
        config.logging.format = "xml".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = ServiceConfig::default();
        config.logging.level = "nav_service=debug".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
