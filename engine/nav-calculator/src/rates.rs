//! BTC/USD exchange rate provider and caching rate service

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::RwLock;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::RateConfig;
use crate::error::{NavError, Result};

/// Source of BTC/USD exchange rates
#[async_trait::async_trait]
pub trait ExchangeRateProvider: Send + Sync {
    /// Fetch the current BTC price in USD
    async fn fetch_btc_usd(&self) -> Result<f64>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

#[derive(Debug, Deserialize)]
struct SimplePriceResponse {
    bitcoin: SimplePrice,
}

#[derive(Debug, Deserialize)]
struct SimplePrice {
    usd: f64,
}

/// HTTP provider for endpoints answering `{"bitcoin": {"usd": <rate>}}`
pub struct HttpRateProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRateProvider {
    pub fn new(config: &RateConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self { client, endpoint: config.endpoint.clone() })
    }
}

#[async_trait::async_trait]
impl ExchangeRateProvider for HttpRateProvider {
    async fn fetch_btc_usd(&self) -> Result<f64> {
        debug!("Fetching BTC/USD from {}", self.endpoint);

        let response = self.client.get(&self.endpoint).send().await?;
        if !response.status().is_success() {
            return Err(NavError::provider(format!("request failed with status {}", response.status())));
        }

        let body: SimplePriceResponse = response.json().await?;
        Ok(body.bitcoin.usd)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedRate {
    rate: f64,
    fetched_at: Instant,
}

/// Caching BTC/USD rate service.
///
/// A cached rate younger than the freshness window is served without a
/// request. Refreshes retry with exponential backoff; when every attempt
/// fails the last good rate is served, then the configured fallback.
pub struct RateService {
    config: RateConfig,
    provider: Arc<dyn ExchangeRateProvider>,
    cache: RwLock<Option<CachedRate>>,
}

impl RateService {
    pub fn new(config: RateConfig, provider: Arc<dyn ExchangeRateProvider>) -> Self {
        Self { config, provider, cache: RwLock::new(None) }
    }

    /// Build a service backed by the HTTP provider at the configured endpoint
    pub fn http(config: RateConfig) -> Result<Self> {
        let provider = Arc::new(HttpRateProvider::new(&config)?);
        Ok(Self::new(config, provider))
    }

    pub fn config(&self) -> &RateConfig {
        &self.config
    }

    /// Best rate available without a request: cached (even stale) or fallback
    pub async fn current_rate(&self) -> f64 {
        self.cache.read().await.map(|c| c.rate).unwrap_or(self.config.fallback_rate)
    }

    /// Whether the cached rate is inside the freshness window
    pub async fn is_fresh(&self) -> bool {
        self.cache
            .read()
            .await
            .map(|c| c.fetched_at.elapsed() < self.config.freshness())
            .unwrap_or(false)
    }

    /// A usable rate, refreshing first when the cache is stale; never fails
    pub async fn get_rate(&self) -> f64 {
        if self.is_fresh().await {
            return self.current_rate().await;
        }

        match self.refresh().await {
            Ok(rate) => rate,
            Err(e) => {
                let rate = self.current_rate().await;
                warn!("Exchange rate refresh failed ({}), using {}", e, rate);
                rate
            }
        }
    }

    /// Fetch a new rate with retries and store it on success
    pub async fn refresh(&self) -> Result<f64> {
        let request_timeout = self.config.request_timeout();
        let provider = Arc::clone(&self.provider);

        let rate = run_with_retry(
            || {
                let provider = Arc::clone(&provider);
                async move {
                    let rate = timeout(request_timeout, provider.fetch_btc_usd())
                        .await
                        .map_err(|_| NavError::Timeout(request_timeout))??;
                    if rate.is_finite() && rate > 0.0 {
                        Ok::<f64, NavError>(rate)
                    } else {
                        Err(NavError::InvalidRate(rate))
                    }
                }
            },
            &self.config,
        )
        .await?;

        *self.cache.write().await = Some(CachedRate { rate, fetched_at: Instant::now() });
        info!("BTC/USD rate refreshed from {} provider: {}", self.provider.name(), rate);
        Ok(rate)
    }
}

async fn run_with_retry<F, Fut, T>(mut f: F, config: &RateConfig) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = config.initial_backoff();
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt >= config.max_attempts => return Err(e),
            Err(e) => {
                warn!("Rate fetch attempt {} failed: {}, retrying in {:?}", attempt, e, delay);
                sleep(delay).await;

                // Exponential backoff
                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_backoff().as_secs_f64()),
                );
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider answering from a script; an exhausted script keeps failing
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<f64>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<f64>>) -> Arc<Self> {
            Arc::new(Self { script: Mutex::new(script.into()), calls: AtomicUsize::new(0) })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ExchangeRateProvider for ScriptedProvider {
        async fn fetch_btc_usd(&self) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script.lock().pop_front().unwrap_or_else(|| Err(NavError::provider("down")))
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    struct SlowProvider;

    #[async_trait::async_trait]
    impl ExchangeRateProvider for SlowProvider {
        async fn fetch_btc_usd(&self) -> Result<f64> {
            sleep(Duration::from_secs(60)).await;
            Ok(70_000.0)
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_rate_is_cached() {
        let provider = ScriptedProvider::new(vec![Ok(65_000.0), Ok(70_000.0)]);
        let service = RateService::new(RateConfig::default(), provider.clone());

        assert_eq!(service.get_rate().await, 65_000.0);
        assert_eq!(service.get_rate().await, 65_000.0);
        assert_eq!(provider.calls(), 1);

        tokio::time::advance(Duration::from_secs(3_601)).await;
        assert_eq!(service.get_rate().await, 70_000.0);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let provider = ScriptedProvider::new(vec![
            Err(NavError::provider("first")),
            Ok(f64::NAN),
            Ok(64_000.0),
        ]);
        let service = RateService::new(RateConfig::default(), provider.clone());

        assert_eq!(service.refresh().await.unwrap(), 64_000.0);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_after_exhausting_attempts() {
        let provider = ScriptedProvider::new(vec![]);
        let service = RateService::new(RateConfig::default(), provider.clone());

        assert_eq!(service.get_rate().await, 60_000.0);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_rate_served_when_refresh_fails() {
        let provider = ScriptedProvider::new(vec![Ok(66_000.0)]);
        let service = RateService::new(RateConfig::default(), provider.clone());
        service.refresh().await.unwrap();

        tokio::time::advance(Duration::from_secs(7_200)).await;
        assert!(!service.is_fresh().await);
        assert_eq!(service.get_rate().await, 66_000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out() {
        let config = RateConfig { max_attempts: 1, ..Default::default() };
        let service = RateService::new(config, Arc::new(SlowProvider));

        assert!(matches!(service.refresh().await, Err(NavError::Timeout(_))));
        assert_eq!(service.current_rate().await, 60_000.0);
    }

    #[test]
    fn test_simple_price_response_parses() {
        let body: SimplePriceResponse =
            serde_json::from_str(r#"{"bitcoin": {"usd": 67123.5}}"#).unwrap();
        assert_eq!(body.bitcoin.usd, 67_123.5);
    }

    #[test]
    fn test_unfetched_service_serves_fallback() {
        let service = RateService::new(RateConfig::default(), ScriptedProvider::new(vec![]));
        assert_eq!(tokio_test::block_on(service.current_rate()), 60_000.0);
        assert!(!tokio_test::block_on(service.is_fresh()));
    }
}
