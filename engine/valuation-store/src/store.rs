//! The valuation store: single writer of portfolio and reference state

use std::sync::Arc;

use price_simulator::{check_unique_names, Position};
use tokio::sync::RwLock;

use crate::backend::StorageBackend;
use crate::config::StoreConfig;
use crate::defaults::default_portfolio;
use crate::error::{Result, StoreError};
use crate::record::{migrate_portfolio, migrate_reference, PortfolioRecord, ReferenceRecord};
use crate::{LEGACY_PORTFOLIO_KEY, PORTFOLIO_KEY, REFERENCE_KEY};

/// What happened to a portfolio handed to [`ValuationStore::set_portfolio`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortfolioWrite {
    /// The portfolio replaced the stored one
    Applied,
    /// A valuation exceeded the ceiling; the store was reset to defaults
    Reset,
}

#[derive(Debug)]
struct StoreState {
    positions: Vec<Position>,
    reference: Option<f64>,
    loads_since_reset: u32,
}

/// Durable store for the simulated portfolio and the global reference valuation
pub struct ValuationStore {
    config: StoreConfig,
    backend: Option<Arc<dyn StorageBackend>>,
    state: RwLock<StoreState>,
}

impl ValuationStore {
    /// Create a store persisting through `backend`
    pub fn new(config: StoreConfig, backend: Arc<dyn StorageBackend>) -> Self {
        Self::build(config, Some(backend))
    }

    /// Create a store without durable storage; state lives only in memory
    pub fn ephemeral(config: StoreConfig) -> Self {
        Self::build(config, None)
    }

    fn build(config: StoreConfig, backend: Option<Arc<dyn StorageBackend>>) -> Self {
        Self {
            config,
            backend,
            state: RwLock::new(StoreState {
                positions: default_portfolio(),
                reference: None,
                loads_since_reset: 0,
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Load persisted state, substituting defaults on any problem.
    ///
    /// Never fails: missing, corrupt, oversized or stale data is replaced by
    /// the default portfolio, which is then persisted.
    pub async fn load(&self) -> Vec<Position> {
        let loaded = self.read_portfolio().await;
        let reference = self.read_reference().await;

        let mut state = self.state.write().await;
        if reference.is_some() {
            state.reference = reference;
        }

        match loaded {
            Some(record) => {
                let loads = record.loads_since_reset.saturating_add(1);
                if loads >= self.config.reset_after_loads {
                    tracing::warn!(
                        "Portfolio loaded {} times without reset, resetting to defaults",
                        loads
                    );
                    self.install_defaults(&mut state);
                } else {
                    tracing::info!("Loaded {} positions from storage", record.positions.len());
                    state.positions = record.positions;
                    state.loads_since_reset = loads;
                }
            }
            None => self.install_defaults(&mut state),
        }

        let record = PortfolioRecord::new(state.positions.clone(), state.loads_since_reset);
        let positions = state.positions.clone();
        drop(state);

        self.persist_portfolio(&record).await;
        positions
    }

    /// Persist the current state; failures are logged and swallowed
    pub async fn save(&self) {
        if let Err(e) = self.try_save().await {
            tracing::error!("Failed to save valuation state: {}", e);
        }
    }

    /// Persist the current state, reporting failures
    pub async fn try_save(&self) -> Result<()> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };

        let (record, reference) = {
            let state = self.state.read().await;
            (PortfolioRecord::new(state.positions.clone(), state.loads_since_reset), state.reference)
        };

        backend.set(PORTFOLIO_KEY, &serde_json::to_string(&record)?).await?;
        if let Some(value) = reference {
            backend.set(REFERENCE_KEY, &serde_json::to_string(&ReferenceRecord::new(value))?).await?;
        }
        Ok(())
    }

    /// Snapshot of the current portfolio
    pub async fn get_portfolio(&self) -> Vec<Position> {
        self.state.read().await.positions.clone()
    }

    /// Replace the portfolio as a single transition.
    ///
    /// Positions are normalized first; duplicate or structurally invalid
    /// entries are rejected, while any valuation above the ceiling triggers
    /// a self-healing reset to defaults.
    pub async fn set_portfolio(&self, positions: Vec<Position>) -> Result<PortfolioWrite> {
        self.apply(positions, None).await.map(|(write, _)| write)
    }

    /// Replace the portfolio and adjust the reference valuation under one lock.
    ///
    /// Returns the write result and the resulting reference valuation.
    pub async fn apply(
        &self,
        positions: Vec<Position>,
        reference_delta_percent: Option<f64>,
    ) -> Result<(PortfolioWrite, f64)> {
        let positions = self.prepare(positions)?;

        let mut state = self.state.write().await;
        let write = if positions.iter().any(|p| self.exceeds_ceiling(p)) {
            tracing::warn!("Valuation above ceiling, resetting portfolio to defaults");
            self.install_defaults(&mut state);
            PortfolioWrite::Reset
        } else {
            state.positions = positions;
            PortfolioWrite::Applied
        };

        let reference = match (write, reference_delta_percent) {
            (PortfolioWrite::Applied, Some(delta)) => self.adjust_locked(&mut state, delta),
            _ => self.reference_locked(&mut state),
        };

        Ok((write, reference))
    }

    /// Current global reference valuation, created with the default on first access
    pub async fn get_global_reference(&self) -> f64 {
        let mut state = self.state.write().await;
        self.reference_locked(&mut state)
    }

    /// Multiply the reference valuation by `1 + percent_delta / 100` and persist it
    pub async fn adjust_global_reference(&self, percent_delta: f64) -> f64 {
        let value = {
            let mut state = self.state.write().await;
            self.adjust_locked(&mut state, percent_delta)
        };
        self.persist_reference(value).await;
        value
    }

    /// Overwrite the reference valuation (administrative)
    pub async fn set_global_reference(&self, value: f64) -> f64 {
        let value = {
            let mut state = self.state.write().await;
            let value = self.sanitize_reference(value);
            state.reference = Some(value);
            value
        };
        self.persist_reference(value).await;
        value
    }

    /// Reset portfolio and reference to defaults (administrative)
    pub async fn reset(&self) -> Vec<Position> {
        let positions = {
            let mut state = self.state.write().await;
            self.install_defaults(&mut state);
            state.reference = Some(self.config.default_reference);
            state.positions.clone()
        };
        tracing::warn!("Valuation store reset to defaults");
        self.save().await;
        positions
    }

    /// Loads since the last reset
    pub async fn loads_since_reset(&self) -> u32 {
        self.state.read().await.loads_since_reset
    }

    fn prepare(&self, mut positions: Vec<Position>) -> Result<Vec<Position>> {
        check_unique_names(&positions)?;
        for position in positions.iter_mut() {
            position.normalize();
            // ceiling violations are handled by the caller with a reset
            position.validate(f64::INFINITY)?;
        }
        Ok(positions)
    }

    fn exceeds_ceiling(&self, position: &Position) -> bool {
        position.current_value > self.config.value_ceiling
            || position.initial_value > self.config.value_ceiling
    }

    fn install_defaults(&self, state: &mut StoreState) {
        state.positions = default_portfolio();
        state.loads_since_reset = 0;
    }

    fn reference_locked(&self, state: &mut StoreState) -> f64 {
        *state.reference.get_or_insert(self.config.default_reference)
    }

    fn adjust_locked(&self, state: &mut StoreState, percent_delta: f64) -> f64 {
        let current = self.reference_locked(state);
        let delta = if percent_delta.is_finite() { percent_delta } else { 0.0 };
        let next = self.sanitize_reference(current * (1.0 + delta / 100.0));
        state.reference = Some(next);
        next
    }

    fn sanitize_reference(&self, value: f64) -> f64 {
        if value.is_finite() && value > 0.0 && value <= self.config.reference_ceiling {
            value
        } else {
            tracing::warn!("Reference valuation {} out of range, resetting to default", value);
            self.config.default_reference
        }
    }

    async fn read_portfolio(&self) -> Option<PortfolioRecord> {
        let backend = self.backend.as_ref()?;

        let raw = match backend.get(PORTFOLIO_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => match backend.get(LEGACY_PORTFOLIO_KEY).await {
                Ok(Some(raw)) => {
                    if let Err(e) = backend.remove(LEGACY_PORTFOLIO_KEY).await {
                        tracing::warn!("Failed to remove legacy portfolio key: {}", e);
                    }
                    raw
                }
                Ok(None) => {
                    tracing::info!("No persisted portfolio found, using defaults");
                    return None;
                }
                Err(e) => {
                    tracing::warn!("Failed to read legacy portfolio: {}", e);
                    return None;
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read persisted portfolio: {}", e);
                return None;
            }
        };

        match migrate_portfolio(&raw).and_then(|record| self.validate_record(record)) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Discarding persisted portfolio: {}", e);
                None
            }
        }
    }

    fn validate_record(&self, mut record: PortfolioRecord) -> Result<PortfolioRecord> {
        if record.positions.is_empty() {
            return Err(StoreError::corruption("portfolio is empty"));
        }
        check_unique_names(&record.positions)?;
        for position in record.positions.iter_mut() {
            position.validate(self.config.value_ceiling)?;
            position.refresh_derived();
        }
        Ok(record)
    }

    async fn read_reference(&self) -> Option<f64> {
        let backend = self.backend.as_ref()?;
        match backend.get(REFERENCE_KEY).await {
            Ok(Some(raw)) => match migrate_reference(&raw) {
                Ok(record) => Some(self.sanitize_reference(record.value_sats)),
                Err(e) => {
                    tracing::warn!("Discarding persisted reference valuation: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to read reference valuation: {}", e);
                None
            }
        }
    }

    async fn persist_portfolio(&self, record: &PortfolioRecord) {
        let Some(backend) = &self.backend else {
            return;
        };
        let result = match serde_json::to_string(record) {
            Ok(raw) => backend.set(PORTFOLIO_KEY, &raw).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::error!("Failed to persist portfolio to {} storage: {}", backend.name(), e);
        }
    }

    async fn persist_reference(&self, value: f64) {
        let Some(backend) = &self.backend else {
            return;
        };
        let result = match serde_json::to_string(&ReferenceRecord::new(value)) {
            Ok(raw) => backend.set(REFERENCE_KEY, &raw).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::error!("Failed to persist reference valuation: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{InMemoryStorage, LocalStorage};
    use crate::defaults::DEFAULT_REFERENCE_SATS;
    use tempfile::TempDir;

    struct FailingStorage;

    #[async_trait::async_trait]
    impl StorageBackend for FailingStorage {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(StoreError::backend("unavailable"))
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(StoreError::backend("unavailable"))
        }

        async fn remove(&self, _key: &str) -> Result<()> {
            Err(StoreError::backend("unavailable"))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    fn in_memory_store() -> (ValuationStore, InMemoryStorage) {
        let storage = InMemoryStorage::new();
        let store = ValuationStore::new(StoreConfig::default(), Arc::new(storage.clone()));
        (store, storage)
    }

    #[tokio::test]
    async fn test_first_load_installs_and_persists_defaults() {
        let (store, storage) = in_memory_store();
        let positions = store.load().await;

        assert_eq!(positions, default_portfolio());
        assert!(storage.get(PORTFOLIO_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_save_then_load_is_structurally_equal() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(temp_dir.path()).unwrap());

        let store = ValuationStore::new(StoreConfig::default(), storage.clone());
        store.load().await;
        let mut positions = store.get_portfolio().await;
        let grown = positions[0].current_value * 1.5;
        positions[0].set_current_value(grown);
        positions[1].last_spike_day = Some(3);
        store.set_portfolio(positions.clone()).await.unwrap();
        store.save().await;

        let reopened = ValuationStore::new(StoreConfig::default(), storage);
        let loaded = reopened.load().await;
        assert_eq!(loaded.len(), positions.len());
        for (a, b) in loaded.iter().zip(positions.iter()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.initial_value, b.initial_value);
            assert_eq!(a.current_value, b.current_value);
            assert_eq!(a.token_amount, b.token_amount);
            assert_eq!(a.last_spike_day, b.last_spike_day);
        }
    }

    #[tokio::test]
    async fn test_corrupt_record_falls_back_to_defaults() {
        let (store, storage) = in_memory_store();
        storage.set(PORTFOLIO_KEY, "{not json").await.unwrap();
        assert_eq!(store.load().await, default_portfolio());

        storage.set(PORTFOLIO_KEY, r#"{"schema_version": 2, "positions": [], "saved_at": "2024-01-01T00:00:00Z"}"#).await.unwrap();
        assert_eq!(store.load().await, default_portfolio());
    }

    #[tokio::test]
    async fn test_oversized_record_falls_back_to_defaults() {
        let (store, storage) = in_memory_store();
        let huge = Position::new("Whale", 1e15, 10).unwrap();
        let record = PortfolioRecord::new(vec![huge], 0);
        storage.set(PORTFOLIO_KEY, &serde_json::to_string(&record).unwrap()).await.unwrap();

        assert_eq!(store.load().await, default_portfolio());
    }

    #[tokio::test]
    async fn test_reset_after_repeated_loads() {
        let (store, _storage) = in_memory_store();
        store.load().await;

        let mut positions = store.get_portfolio().await;
        let grown = positions[0].current_value * 2.0;
        positions[0].set_current_value(grown);
        store.set_portfolio(positions).await.unwrap();
        store.save().await;

        // loads 1..=9 keep the grown value, the tenth resets
        for _ in 0..9 {
            let loaded = store.load().await;
            assert_ne!(loaded, default_portfolio());
        }
        assert_eq!(store.loads_since_reset().await, 9);
        assert_eq!(store.load().await, default_portfolio());
        assert_eq!(store.loads_since_reset().await, 0);
    }

    #[tokio::test]
    async fn test_legacy_key_is_migrated_and_removed() {
        let (store, storage) = in_memory_store();
        storage
            .set(LEGACY_PORTFOLIO_KEY, r#"[{"name": "Acme", "value": 1000, "current": 1200, "tokenAmount": 10}]"#)
            .await
            .unwrap();

        let loaded = store.load().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].current_value, 1200.0);
        assert!(storage.get(LEGACY_PORTFOLIO_KEY).await.unwrap().is_none());
        assert!(storage.get(PORTFOLIO_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failing_backend_never_breaks_callers() {
        let store = ValuationStore::new(StoreConfig::default(), Arc::new(FailingStorage));
        assert_eq!(store.load().await, default_portfolio());
        store.save().await;
        assert!(store.try_save().await.is_err());
        let adjusted = store.adjust_global_reference(1.0).await;
        assert!((adjusted - DEFAULT_REFERENCE_SATS * 1.01).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_ephemeral_store() {
        let store = ValuationStore::ephemeral(StoreConfig::default());
        assert_eq!(store.load().await, default_portfolio());
        assert!(store.try_save().await.is_ok());
    }

    #[tokio::test]
    async fn test_load_keeps_live_reference_when_nothing_persisted() {
        let store = ValuationStore::ephemeral(StoreConfig::default());
        store.set_global_reference(5_000.0).await;
        store.load().await;
        assert_eq!(store.get_global_reference().await, 5_000.0);

        let (store, storage) = in_memory_store();
        store.set_global_reference(7_500.0).await;
        storage.remove(REFERENCE_KEY).await.unwrap();
        store.load().await;
        assert_eq!(store.get_global_reference().await, 7_500.0);
    }

    #[tokio::test]
    async fn test_reference_adjustment_example() {
        let store = ValuationStore::ephemeral(StoreConfig::default());
        store.set_global_reference(10_000.0).await;
        let next = store.adjust_global_reference(2.0).await;
        assert!((next - 10_200.0).abs() < 1e-9);
        assert!((store.get_global_reference().await - 10_200.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_reference_created_lazily_and_self_heals() {
        let store = ValuationStore::ephemeral(StoreConfig::default());
        assert_eq!(store.get_global_reference().await, DEFAULT_REFERENCE_SATS);

        store.set_global_reference(f64::NAN).await;
        assert_eq!(store.get_global_reference().await, DEFAULT_REFERENCE_SATS);

        store.set_global_reference(1e13).await;
        let healed = store.adjust_global_reference(1e9).await;
        assert_eq!(healed, DEFAULT_REFERENCE_SATS);
    }

    #[tokio::test]
    async fn test_reference_persists_across_reload() {
        let (store, storage) = in_memory_store();
        store.set_global_reference(5_000.0).await;

        let reopened = ValuationStore::new(StoreConfig::default(), Arc::new(storage));
        reopened.load().await;
        assert_eq!(reopened.get_global_reference().await, 5_000.0);
    }

    #[tokio::test]
    async fn test_set_portfolio_validation() {
        let store = ValuationStore::ephemeral(StoreConfig::default());
        let mut positions = default_portfolio();
        positions.push(positions[0].clone());
        assert!(store.set_portfolio(positions).await.is_err());

        let mut positions = default_portfolio();
        positions[0].current_value = -10.0;
        assert_eq!(store.set_portfolio(positions).await.unwrap(), PortfolioWrite::Applied);
        assert_eq!(store.get_portfolio().await[0].current_value, 1.0);

        let mut positions = default_portfolio();
        positions[0].set_current_value(1e14);
        assert_eq!(store.set_portfolio(positions).await.unwrap(), PortfolioWrite::Reset);
        assert_eq!(store.get_portfolio().await, default_portfolio());
    }

    #[tokio::test]
    async fn test_apply_updates_reference_only_when_applied() {
        let store = ValuationStore::ephemeral(StoreConfig::default());
        store.set_global_reference(10_000.0).await;

        let (write, reference) = store.apply(default_portfolio(), Some(2.0)).await.unwrap();
        assert_eq!(write, PortfolioWrite::Applied);
        assert!((reference - 10_200.0).abs() < 1e-9);

        let mut positions = default_portfolio();
        positions[0].set_current_value(1e14);
        let (write, reference) = store.apply(positions, Some(50.0)).await.unwrap();
        assert_eq!(write, PortfolioWrite::Reset);
        assert!((reference - 10_200.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_admin_reset() {
        let store = ValuationStore::ephemeral(StoreConfig::default());
        store.set_global_reference(42.0).await;
        let positions = store.reset().await;
        assert_eq!(positions, default_portfolio());
        assert_eq!(store.get_global_reference().await, DEFAULT_REFERENCE_SATS);
    }
}
