//! Per-network monitors: one price slot and one duplicate window each, plus
//! the provider adapters they poll.

use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use reqwest::Client;
use tracing::{debug, info, warn};

use txwatch_domain::config::MonitorConfig;
use txwatch_domain::{
    DuplicateWindow, Network, PriceCache, PriceQuote, PriceSource, Transaction, TransferSource,
};

use crate::pipeline::filter_batch;
use crate::providers::{CoinGeckoPriceSource, GraphQlSource, SubscanSource, TonCenterSource};
use crate::worker::MonitorError;

/// Where a monitor is inside its current poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    Idle,
    FetchingPrice,
    FetchingTransactions,
    Filtering,
}

/// Capability every network monitor exposes to the orchestrator.
///
/// `poll` takes `&mut self`: a monitor can only run one poll at a time.
#[async_trait]
pub trait NetworkMonitor: Send {
    fn network(&self) -> Network;

    /// Prices, fetches and filters one batch. Either the whole batch is
    /// processed or nothing is emitted.
    async fn poll(&mut self) -> Result<Vec<Transaction>, MonitorError>;

    /// Cached USD price, refreshed when expired. Unlike `poll`, a stale quote
    /// is returned regardless of the configured maximum price age.
    async fn get_current_price_usd(&mut self) -> Result<f64, MonitorError>;
}

/// Monitor composed from a transfer source and a price source; the provider
/// family is chosen by the `T` adapter.
pub struct PollingMonitor<T, P> {
    network: Network,
    transfers: T,
    prices: P,
    price_cache: PriceCache,
    window: DuplicateWindow,
    min_usd: f64,
    max_price_age: Option<Duration>,
    phase: MonitorPhase,
}

impl<T, P> PollingMonitor<T, P>
where
    T: TransferSource,
    P: PriceSource,
{
    pub fn new(network: Network, transfers: T, prices: P, min_usd: f64) -> Self {
        Self {
            network,
            transfers,
            prices,
            price_cache: PriceCache::new(network),
            window: DuplicateWindow::new(),
            min_usd,
            max_price_age: None,
            phase: MonitorPhase::Idle,
        }
    }

    /// Refuse to alert on a cached price older than `max_age` when the
    /// refresh fails.
    pub fn with_max_price_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_price_age = max_age;
        self
    }

    pub fn with_price_cache(mut self, cache: PriceCache) -> Self {
        self.price_cache = cache;
        self
    }

    pub fn window(&self) -> &DuplicateWindow {
        &self.window
    }

    pub fn phase(&self) -> MonitorPhase {
        self.phase
    }

    async fn usable_quote(&mut self) -> Result<PriceQuote, MonitorError> {
        let quote = self.price_cache.get_price_usd(&self.prices).await?;
        if let Some(max_age) = self.max_price_age {
            let age = quote.age();
            if age > max_age {
                warn!(
                    network = %self.network,
                    age_secs = age.as_secs(),
                    "cached price too old to alert on"
                );
                return Err(MonitorError::StalePrice {
                    network: self.network,
                    age,
                });
            }
        }
        Ok(quote)
    }

    async fn run_poll(&mut self) -> Result<Vec<Transaction>, MonitorError> {
        self.phase = MonitorPhase::FetchingPrice;
        let quote = self.usable_quote().await?;

        self.phase = MonitorPhase::FetchingTransactions;
        let batch = self
            .transfers
            .fetch_recent_transactions()
            .await
            .map_err(|source| MonitorError::Provider {
                network: self.network,
                source,
            })?;
        debug!(network = %self.network, fetched = batch.len(), "fetched recent transfers");

        self.phase = MonitorPhase::Filtering;
        Ok(filter_batch(
            self.network,
            batch,
            quote.price_usd,
            self.min_usd,
            &mut self.window,
        ))
    }
}

#[async_trait]
impl<T, P> NetworkMonitor for PollingMonitor<T, P>
where
    T: TransferSource,
    P: PriceSource,
{
    fn network(&self) -> Network {
        self.network
    }

    async fn poll(&mut self) -> Result<Vec<Transaction>, MonitorError> {
        let outcome = self.run_poll().await;
        self.phase = MonitorPhase::Idle;

        let result = if outcome.is_ok() { "ok" } else { "error" };
        counter!("txwatch_polls_total", "network" => self.network.label(), "result" => result)
            .increment(1);
        if let Ok(emitted) = &outcome {
            info!(
                network = %self.network,
                found = emitted.len(),
                min_usd = self.min_usd,
                "poll finished"
            );
        }
        outcome
    }

    async fn get_current_price_usd(&mut self) -> Result<f64, MonitorError> {
        let quote = self.price_cache.get_price_usd(&self.prices).await?;
        Ok(quote.price_usd)
    }
}

/// Wires the production adapters for `network` from configuration.
pub fn build_network_monitor(
    network: Network,
    client: &Client,
    config: &MonitorConfig,
) -> Box<dyn NetworkMonitor> {
    let overrides = config.provider_override(network);
    let prices = CoinGeckoPriceSource::new(client.clone(), network, config.price_override());
    let min_usd = config.min_usd();
    let max_age = config.max_price_age();

    match network {
        Network::Ton => Box::new(
            PollingMonitor::new(
                network,
                TonCenterSource::new(client.clone(), &overrides),
                prices,
                min_usd,
            )
            .with_max_price_age(max_age),
        ),
        Network::Everscale | Network::Venom => Box::new(
            PollingMonitor::new(
                network,
                GraphQlSource::new(client.clone(), network, &overrides),
                prices,
                min_usd,
            )
            .with_max_price_age(max_age),
        ),
        Network::Humanode => Box::new(
            PollingMonitor::new(
                network,
                SubscanSource::new(client.clone(), &overrides),
                prices,
                min_usd,
            )
            .with_max_price_age(max_age),
        ),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };
    use txwatch_domain::{ProviderError, ProviderResult, RawTransfer};

    /// Transfer source that replays scripted batches and counts calls.
    #[derive(Clone, Default)]
    pub(crate) struct ScriptedTransfers {
        pub calls: Arc<AtomicUsize>,
        batches: Arc<Mutex<VecDeque<ProviderResult<Vec<RawTransfer>>>>>,
    }

    impl ScriptedTransfers {
        pub(crate) fn new(batches: Vec<ProviderResult<Vec<RawTransfer>>>) -> Self {
            Self {
                calls: Arc::default(),
                batches: Arc::new(Mutex::new(batches.into())),
            }
        }
    }

    #[async_trait]
    impl TransferSource for ScriptedTransfers {
        async fn fetch_recent_transactions(&self) -> ProviderResult<Vec<RawTransfer>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.batches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    /// Price source returning a fixed reply and counting calls.
    #[derive(Clone)]
    pub(crate) struct FixedPrice {
        pub calls: Arc<AtomicUsize>,
        reply: ProviderResult<f64>,
    }

    impl FixedPrice {
        pub(crate) fn ok(price: f64) -> Self {
            Self {
                calls: Arc::default(),
                reply: Ok(price),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                calls: Arc::default(),
                reply: Err(ProviderError::Status(503)),
            }
        }
    }

    #[async_trait]
    impl PriceSource for FixedPrice {
        async fn fetch_price_usd(&self) -> ProviderResult<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    pub(crate) fn raw(hash: &str, amount: f64) -> RawTransfer {
        RawTransfer {
            hash: hash.to_string(),
            native_amount: amount,
            sender: "sender".to_string(),
            receiver: "receiver".to_string(),
            timestamp: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn emits_qualifying_transfers_once_across_polls() {
        let transfers = ScriptedTransfers::new(vec![
            Ok(vec![raw("a1", 600.0), raw("a2", 400.0)]),
            Ok(vec![raw("a1", 600.0)]),
        ]);
        let prices = FixedPrice::ok(2.0);
        let mut monitor = PollingMonitor::new(Network::Ton, transfers, prices.clone(), 1000.0);

        let first = monitor.poll().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].tx_hash(), "a1");
        assert_eq!(first[0].amount_usd(), 1200.0);

        let second = monitor.poll().await.unwrap();
        assert!(second.is_empty());
        assert_eq!(prices.calls.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.phase(), MonitorPhase::Idle);
    }

    #[tokio::test]
    async fn cold_price_failure_fails_poll_without_side_effects() {
        let transfers = ScriptedTransfers::new(vec![Ok(vec![raw("a1", 600.0)])]);
        let mut monitor =
            PollingMonitor::new(Network::Everscale, transfers.clone(), FixedPrice::failing(), 1.0);

        let err = monitor.poll().await.unwrap_err();
        assert!(matches!(err, MonitorError::PriceUnavailable(_)));
        assert!(monitor.window().is_empty());
        assert_eq!(transfers.calls.load(Ordering::SeqCst), 0);
        assert_eq!(monitor.phase(), MonitorPhase::Idle);
    }

    #[tokio::test]
    async fn provider_failure_emits_nothing() {
        let transfers = ScriptedTransfers::new(vec![Err(ProviderError::Http("timeout".into()))]);
        let mut monitor = PollingMonitor::new(Network::Venom, transfers, FixedPrice::ok(1.0), 1.0);

        let err = monitor.poll().await.unwrap_err();
        assert!(matches!(
            err,
            MonitorError::Provider {
                network: Network::Venom,
                ..
            }
        ));
        assert!(monitor.window().is_empty());
    }

    #[tokio::test]
    async fn evicted_hash_can_be_emitted_again() {
        let mut first_batch: Vec<_> = (0..1000).map(|i| raw(&format!("h{i}"), 10.0)).collect();
        first_batch.push(raw("h1000", 10.0));
        let transfers =
            ScriptedTransfers::new(vec![Ok(first_batch), Ok(vec![raw("h0", 10.0), raw("h2", 10.0)])]);
        let mut monitor = PollingMonitor::new(Network::Ton, transfers, FixedPrice::ok(1.0), 5.0);

        assert_eq!(monitor.poll().await.unwrap().len(), 1001);
        let again = monitor.poll().await.unwrap();
        let hashes: Vec<_> = again.iter().map(|tx| tx.tx_hash()).collect();
        assert_eq!(hashes, vec!["h0"]);
    }

    #[tokio::test]
    async fn too_old_stale_price_blocks_alerts() {
        let transfers = ScriptedTransfers::new(vec![
            Ok(vec![raw("a1", 10.0)]),
            Ok(vec![raw("a2", 10.0)]),
        ]);
        let prices = Arc::new(Mutex::new(VecDeque::from(vec![
            Ok(1.0),
            Err(ProviderError::Status(500)),
        ])));

        struct Sequenced(Arc<Mutex<VecDeque<ProviderResult<f64>>>>);

        #[async_trait]
        impl PriceSource for Sequenced {
            async fn fetch_price_usd(&self) -> ProviderResult<f64> {
                self.0
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or(Err(ProviderError::Status(500)))
            }
        }

        let mut monitor = PollingMonitor::new(Network::Ton, transfers, Sequenced(prices), 1.0)
            .with_price_cache(PriceCache::with_ttl(Network::Ton, Duration::ZERO))
            .with_max_price_age(Some(Duration::from_millis(20)));

        assert_eq!(monitor.poll().await.unwrap().len(), 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let err = monitor.poll().await.unwrap_err();
        assert!(matches!(
            err,
            MonitorError::StalePrice {
                network: Network::Ton,
                ..
            }
        ));
        assert!(!monitor.window().is_duplicate("a2"));
        assert_eq!(monitor.get_current_price_usd().await.unwrap(), 1.0);
    }

    #[tokio::test]
    async fn stale_price_is_used_without_age_limit() {
        let transfers = ScriptedTransfers::new(vec![
            Ok(vec![raw("a1", 10.0)]),
            Ok(vec![raw("a2", 10.0)]),
        ]);
        let prices = FixedPrice::ok(1.0);
        let mut monitor = PollingMonitor::new(Network::Humanode, transfers, prices.clone(), 1.0)
            .with_price_cache(PriceCache::with_ttl(Network::Humanode, Duration::ZERO));

        assert_eq!(monitor.poll().await.unwrap().len(), 1);
        assert_eq!(monitor.poll().await.unwrap().len(), 1);
        assert_eq!(prices.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exposes_current_price() {
        let prices = FixedPrice::ok(3.5);
        let mut monitor =
            PollingMonitor::new(Network::Venom, ScriptedTransfers::default(), prices.clone(), 1.0);

        assert_eq!(monitor.get_current_price_usd().await.unwrap(), 3.5);
        assert_eq!(monitor.get_current_price_usd().await.unwrap(), 3.5);
        assert_eq!(prices.calls.load(Ordering::SeqCst), 1);
    }
}
