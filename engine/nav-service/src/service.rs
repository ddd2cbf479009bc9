//! NAV service facade: the single owner of simulation, valuation and publishing

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use nav_calculator::{
    ExchangeRateProvider, HttpRateProvider, NavCalculator, NavGuard, NavResult, RateService,
};
use price_simulator::{simulate_tick, DisplayCurrency, Position, SimulationContext, TickMode, TickOutcome};
use update_bus::{BusEvent, Subscription, Topic, UpdateBus};
use valuation_store::{
    InMemoryStorage, LocalStorage, PortfolioWrite, StorageBackend, StoreError, ValuationStore,
};

use crate::config::{ServiceConfig, StorageKind};

/// What a tick produced
#[derive(Debug, Clone)]
pub struct TickReport {
    pub outcome: TickOutcome,
    pub write: PortfolioWrite,
    pub reference: f64,
    pub nav: NavResult,
}

/// Service state containing all initialized components
pub struct NavService {
    config: ServiceConfig,

    /// Simulation state; holding this lock is holding the tick lock
    context: Mutex<SimulationContext>,

    store: Arc<ValuationStore>,
    calculator: NavCalculator,
    guard: Mutex<NavGuard>,
    rates: Option<Arc<RateService>>,
    bus: UpdateBus,
    latest_nav: RwLock<Option<NavResult>>,
    active: watch::Sender<bool>,
}

impl NavService {
    /// Create a service with the storage backend and rate provider named by `config`
    pub fn new(config: ServiceConfig) -> Result<Self> {
        info!("Initializing service components...");

        let store = match config.service.storage {
            StorageKind::Local => {
                let backend: Arc<dyn StorageBackend> = Arc::new(
                    LocalStorage::new(&config.store.data_dir)
                        .context("Failed to create local storage backend")?,
                );
                ValuationStore::new(config.store.clone(), backend)
            }
            StorageKind::Memory => {
                ValuationStore::new(config.store.clone(), Arc::new(InMemoryStorage::new()))
            }
            StorageKind::None => ValuationStore::ephemeral(config.store.clone()),
        };

        let provider: Option<Arc<dyn ExchangeRateProvider>> = if config.service.offline {
            info!("Offline mode: using fallback BTC/USD rate {}", config.rates.fallback_rate);
            None
        } else {
            Some(Arc::new(
                HttpRateProvider::new(&config.rates).context("Failed to create rate provider")?,
            ))
        };

        Self::with_parts(config, Arc::new(store), provider)
    }

    /// Create a service from an existing store and an optional rate provider
    pub fn with_parts(
        config: ServiceConfig,
        store: Arc<ValuationStore>,
        provider: Option<Arc<dyn ExchangeRateProvider>>,
    ) -> Result<Self> {
        let mut context = SimulationContext::new(config.simulation.clone())
            .context("Failed to create simulation context")?;
        context.set_currency(config.service.currency);

        let rates = provider.map(|p| Arc::new(RateService::new(config.rates.clone(), p)));
        let (active, _) = watch::channel(true);

        Ok(Self {
            calculator: NavCalculator::new(config.nav.clone()),
            guard: Mutex::new(NavGuard::new(config.nav.guard.clone())),
            bus: UpdateBus::new(config.bus.clone()),
            context: Mutex::new(context),
            latest_nav: RwLock::new(None),
            store,
            rates,
            active,
            config,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ValuationStore> {
        &self.store
    }

    pub fn bus(&self) -> &UpdateBus {
        &self.bus
    }

    /// Load persisted state and compute the first NAV
    pub async fn initialize(&self) -> NavResult {
        let mut ctx = self.context.lock().await;

        let positions = self.store.load().await;
        ctx.retain_momentum(&positions);

        // resume the day index after the latest recorded spike so cooldowns hold
        let day = positions.iter().filter_map(|p| p.last_spike_day).max().unwrap_or(0);
        ctx.set_day(day);

        if let Some(rates) = &self.rates {
            rates.get_rate().await;
        }

        info!("Service initialized with {} positions at day {}", positions.len(), day);
        self.bus.publish(BusEvent::PortfolioUpdated(Arc::new(positions)));
        self.update_nav_locked(&mut ctx).await
    }

    /// Run one tick: read, compute, write and publish under the tick lock
    pub async fn simulate_tick(&self, mode: TickMode) -> TickReport {
        let mut ctx = self.context.lock().await;

        let positions = self.store.get_portfolio().await;
        let outcome = simulate_tick(&mut ctx, &positions, mode);

        let (write, reference) =
            match self.store.apply(outcome.positions.clone(), outcome.reference_delta_percent()).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Tick produced an invalid portfolio ({}), resetting", e);
                    self.reset_locked(&mut ctx).await;
                    (PortfolioWrite::Reset, self.store.get_global_reference().await)
                }
            };

        if write == PortfolioWrite::Reset {
            ctx.reset_momentum();
            self.guard.lock().await.reset();
        } else if !outcome.spikes.is_empty() {
            self.bus.publish(BusEvent::SpikeProgress(Arc::new(outcome.spikes.clone())));
        }

        debug!(
            "{:?} tick day {}: {} spikes, portfolio {:+.2}%",
            mode,
            outcome.day,
            outcome.spikes.len(),
            outcome.portfolio_change_percent
        );

        self.bus.publish(BusEvent::PortfolioUpdated(Arc::new(self.store.get_portfolio().await)));
        let nav = self.update_nav_locked(&mut ctx).await;

        TickReport { outcome, write, reference, nav }
    }

    /// Compute a NAV for `positions` with the current reference and rate; publishes nothing
    pub async fn calculate_nav(&self, positions: &[Position], total_supply: u64) -> NavResult {
        let reference = self.store.get_global_reference().await;
        let rate = self.current_rate().await;
        self.calculator.calculate(positions, total_supply, reference, Some(rate))
    }

    /// Recompute the NAV from stored state, guard it, cache it and publish it
    pub async fn update_nav(&self) -> NavResult {
        let mut ctx = self.context.lock().await;
        self.update_nav_locked(&mut ctx).await
    }

    async fn update_nav_locked(&self, ctx: &mut SimulationContext) -> NavResult {
        let positions = self.store.get_portfolio().await;
        let mut nav = self.calculate_nav(&positions, self.config.nav.total_supply).await;

        let accepted = self.guard.lock().await.accept(nav.nav_sats);
        if let Err(e) = accepted {
            warn!("{}; resetting valuation state to defaults", e);
            self.reset_locked(ctx).await;

            let positions = self.store.get_portfolio().await;
            nav = self.calculate_nav(&positions, self.config.nav.total_supply).await;
            if let Err(e) = self.guard.lock().await.accept(nav.nav_sats) {
                warn!("Default NAV rejected by guard: {}", e);
            }
            self.bus.publish(BusEvent::PortfolioUpdated(Arc::new(positions)));
        }

        *self.latest_nav.write().await = Some(nav.clone());
        self.bus.publish(BusEvent::NavUpdated(nav.clone()));
        self.bus.publish(BusEvent::token_price(&nav));
        nav
    }

    /// Most recently published NAV
    pub async fn latest_nav(&self) -> Option<NavResult> {
        self.latest_nav.read().await.clone()
    }

    pub async fn get_portfolio(&self) -> Vec<Position> {
        self.store.get_portfolio().await
    }

    /// Replace the portfolio (administrative) and publish the result
    pub async fn set_portfolio(&self, positions: Vec<Position>) -> Result<PortfolioWrite, StoreError> {
        let mut ctx = self.context.lock().await;

        let write = self.store.set_portfolio(positions).await?;
        let positions = self.store.get_portfolio().await;
        ctx.retain_momentum(&positions);
        if write == PortfolioWrite::Reset {
            ctx.reset_momentum();
            self.guard.lock().await.reset();
        }

        self.store.save().await;
        self.bus.publish(BusEvent::PortfolioUpdated(Arc::new(positions)));
        self.update_nav_locked(&mut ctx).await;
        Ok(write)
    }

    pub async fn get_global_reference(&self) -> f64 {
        self.store.get_global_reference().await
    }

    /// Adjust the reference valuation by `percent_delta` percent
    pub async fn adjust_global_reference(&self, percent_delta: f64) -> f64 {
        let _ctx = self.context.lock().await;
        self.store.adjust_global_reference(percent_delta).await
    }

    /// Switch the display currency and notify consumers
    pub async fn set_currency(&self, currency: DisplayCurrency) {
        let mut ctx = self.context.lock().await;
        if ctx.currency() == currency {
            return;
        }
        ctx.set_currency(currency);
        info!("Display currency changed to {}", currency);
        self.bus.publish(BusEvent::CurrencyChanged(currency));
    }

    /// Switch the spike probability regime
    pub async fn set_high_volatility(&self, enabled: bool) {
        self.context.lock().await.set_high_volatility(enabled);
        info!("High volatility regime {}", if enabled { "enabled" } else { "disabled" });
    }

    pub async fn currency(&self) -> DisplayCurrency {
        self.context.lock().await.currency()
    }

    /// Current simulated day index
    pub async fn day(&self) -> u64 {
        self.context.lock().await.day()
    }

    /// Register a bus listener
    pub fn subscribe(
        &self,
        topic: Topic,
        callback: impl Fn(&BusEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.bus.subscribe(topic, callback)
    }

    /// Publish an event through the debounced bus
    pub fn publish(&self, event: BusEvent) {
        self.bus.publish(event);
    }

    /// Pause or resume the tick loops
    pub fn set_active(&self, active: bool) {
        let changed = self.active.send_if_modified(|current| {
            let changed = *current != active;
            *current = active;
            changed
        });
        if changed {
            info!("Simulation {}", if active { "resumed" } else { "paused" });
        }
    }

    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// Watch the activity switch
    pub fn activity(&self) -> watch::Receiver<bool> {
        self.active.subscribe()
    }

    /// BTC/USD rate without a network request
    pub async fn current_rate(&self) -> f64 {
        match &self.rates {
            Some(rates) => rates.current_rate().await,
            None => self.config.rates.fallback_rate,
        }
    }

    /// Refresh the exchange rate if the cached one is stale
    pub async fn refresh_rate(&self) -> f64 {
        match &self.rates {
            Some(rates) => rates.get_rate().await,
            None => self.config.rates.fallback_rate,
        }
    }

    /// Reset portfolio, reference and simulation state to defaults (administrative)
    pub async fn reset(&self) -> NavResult {
        let mut ctx = self.context.lock().await;
        self.reset_locked(&mut ctx).await;
        self.bus.publish(BusEvent::PortfolioUpdated(Arc::new(self.store.get_portfolio().await)));
        self.update_nav_locked(&mut ctx).await
    }

    async fn reset_locked(&self, ctx: &mut SimulationContext) {
        self.store.reset().await;
        ctx.reset_momentum();
        ctx.correlation_mut().reset();
        self.guard.lock().await.reset();
    }

    /// Persist state in the background path; failures are logged
    pub async fn save(&self) {
        self.store.save().await;
    }

    /// Flush pending notifications and persist state
    pub async fn shutdown(&self) {
        info!("Flushing pending updates and saving state");
        self.bus.flush();
        self.store.save().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;
    use std::time::Duration;
    use valuation_store::{default_portfolio, StoreConfig, DEFAULT_REFERENCE_SATS};

    fn test_config() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.simulation.seed = Some(7);
        config.service.offline = true;
        config
    }

    fn test_service() -> NavService {
        let store = Arc::new(ValuationStore::new(StoreConfig::default(), Arc::new(InMemoryStorage::new())));
        NavService::with_parts(test_config(), store, None).unwrap()
    }

    fn collect_events(service: &NavService, topic: Topic) -> (Arc<SyncMutex<Vec<BusEvent>>>, Subscription) {
        let seen = Arc::new(SyncMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = service.subscribe(topic, move |event| sink.lock().push(event.clone()));
        (seen, subscription)
    }

    #[tokio::test]
    async fn test_initialize_computes_nav_from_defaults() {
        let service = test_service();
        let nav = service.initialize().await;

        let expected: f64 = default_portfolio().iter().map(|p| p.current_value).sum();
        assert_eq!(nav.nav_sats, expected);
        assert_eq!(nav.exchange_rate, 60_000.0);
        assert_eq!(service.latest_nav().await, Some(nav));
    }

    #[tokio::test]
    async fn test_major_tick_moves_reference_by_aggregate_change() {
        let service = test_service();
        service.initialize().await;
        let reference_before = service.get_global_reference().await;

        let report = service.simulate_tick(TickMode::Major).await;
        assert_eq!(report.write, PortfolioWrite::Applied);
        assert_eq!(report.outcome.day, 1);
        assert_eq!(service.day().await, 1);

        let expected = reference_before * (1.0 + report.outcome.portfolio_change_percent / 100.0);
        assert!((report.reference - expected).abs() < 1e-3);
        assert_eq!(service.get_portfolio().await, report.outcome.positions);

        let sum: f64 = report.outcome.positions.iter().map(|p| p.current_value).sum();
        assert!((report.nav.nav_sats - sum).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spike_frames_reach_subscribers() {
        let mut config = test_config();
        config.simulation.spike.base_probability = 1.0;
        config.simulation.spike.max_probability = 1.0;
        let store = Arc::new(ValuationStore::ephemeral(StoreConfig::default()));
        let service = NavService::with_parts(config, store, None).unwrap();
        let (events, _sub) = collect_events(&service, Topic::SpikeProgress);
        service.initialize().await;

        let before = service.get_portfolio().await;
        let report = service.simulate_tick(TickMode::Major).await;
        assert_eq!(report.write, PortfolioWrite::Applied);
        assert_eq!(report.outcome.spikes.len(), before.len());
        service.bus().flush();

        let events = events.lock();
        assert_eq!(events.len(), 1);
        let BusEvent::SpikeProgress(spikes) = &events[0] else {
            panic!("unexpected event {:?}", events[0]);
        };
        assert_eq!(spikes.as_slice(), report.outcome.spikes.as_slice());

        for spike in spikes.iter() {
            assert_eq!(spike.frames.len(), price_simulator::SPIKE_SUB_STEPS);
            let start = before.iter().find(|p| p.name == spike.name).unwrap().current_value;
            let end = report.outcome.positions.iter().find(|p| p.name == spike.name).unwrap().current_value;
            // intermediate frames lie strictly between start and end
            let first = spike.frames[0].value;
            assert!((first - start).abs() < (end - start).abs());
            let last = spike.frames.last().unwrap().value;
            assert!((last - end).abs() <= 1.0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_minor_tick_publishes_no_spikes() {
        let service = test_service();
        let (events, _sub) = collect_events(&service, Topic::SpikeProgress);
        service.initialize().await;

        for _ in 0..5 {
            service.simulate_tick(TickMode::Minor).await;
        }
        service.bus().flush();
        assert!(events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_minor_tick_leaves_reference_alone() {
        let service = test_service();
        service.initialize().await;
        let reference_before = service.get_global_reference().await;

        for _ in 0..5 {
            service.simulate_tick(TickMode::Minor).await;
        }
        assert_eq!(service.get_global_reference().await, reference_before);
        assert_eq!(service.day().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_publish_debounced_nav() {
        let service = test_service();
        let (navs, _sub) = collect_events(&service, Topic::NavUpdated);
        service.initialize().await;

        for _ in 0..4 {
            service.simulate_tick(TickMode::Minor).await;
        }
        tokio::time::sleep(Duration::from_millis(400)).await;

        let latest = service.latest_nav().await;
        let navs = navs.lock();
        assert_eq!(navs.len(), 1);
        assert_eq!(navs.last().cloned(), latest.map(BusEvent::NavUpdated));
    }

    #[tokio::test]
    async fn test_guard_violation_resets_to_defaults() {
        let service = test_service();
        service.initialize().await;

        // each value stays under the per-position ceiling but NAV jumps far beyond +400%
        let mut inflated = default_portfolio();
        for position in inflated.iter_mut() {
            position.set_current_value(9e12);
        }
        let write = service.set_portfolio(inflated).await.unwrap();
        assert_eq!(write, PortfolioWrite::Applied);

        assert_eq!(service.get_portfolio().await, default_portfolio());
        assert_eq!(service.get_global_reference().await, DEFAULT_REFERENCE_SATS);
        let nav = service.latest_nav().await.unwrap();
        assert_eq!(nav.nav_sats, DEFAULT_REFERENCE_SATS);
    }

    #[tokio::test]
    async fn test_set_portfolio_rejects_duplicates() {
        let service = test_service();
        service.initialize().await;

        let mut positions = default_portfolio();
        positions.push(positions[0].clone());
        assert!(service.set_portfolio(positions).await.is_err());
        assert_eq!(service.get_portfolio().await, default_portfolio());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_currency_publishes_once() {
        let service = test_service();
        let (events, _sub) = collect_events(&service, Topic::CurrencyChanged);

        service.set_currency(DisplayCurrency::Usd).await;
        service.set_currency(DisplayCurrency::Usd).await;
        service.bus().flush();

        assert_eq!(*events.lock(), vec![BusEvent::CurrencyChanged(DisplayCurrency::Usd)]);
        assert_eq!(service.currency().await, DisplayCurrency::Usd);
    }

    #[tokio::test]
    async fn test_reset_restores_defaults() {
        let service = test_service();
        service.initialize().await;
        for _ in 0..3 {
            service.simulate_tick(TickMode::Major).await;
        }
        service.adjust_global_reference(10.0).await;

        let nav = service.reset().await;
        assert_eq!(service.get_portfolio().await, default_portfolio());
        assert_eq!(service.get_global_reference().await, DEFAULT_REFERENCE_SATS);
        assert_eq!(nav.nav_sats, DEFAULT_REFERENCE_SATS);
    }

    #[tokio::test]
    async fn test_activity_switch() {
        let service = test_service();
        let mut activity = service.activity();
        assert!(service.is_active());

        service.set_active(false);
        assert!(activity.has_changed().unwrap());
        assert!(!*activity.borrow_and_update());

        // setting the same value is not a change
        service.set_active(false);
        assert!(!activity.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_calculate_nav_does_not_publish() {
        let service = test_service();
        let (navs, _sub) = collect_events(&service, Topic::NavUpdated);

        let nav = service.calculate_nav(&[], 1_000_000).await;
        assert_eq!(nav.nav_sats, DEFAULT_REFERENCE_SATS);
        service.bus().flush();
        assert!(navs.lock().is_empty());
        assert!(service.latest_nav().await.is_none());
    }
}
