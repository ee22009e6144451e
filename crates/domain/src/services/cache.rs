use std::{
    collections::{HashSet, VecDeque},
    time::Duration,
};

use metrics::counter;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{Network, PriceQuote};
use crate::source::{PriceSource, ProviderError};

/// Bounded recency set of transaction hashes for a single network.
///
/// Eviction is strict FIFO: the oldest recorded hash leaves first, lookups
/// never refresh an entry's position.
#[derive(Debug, Clone)]
pub struct DuplicateWindow {
    order: VecDeque<String>,
    members: HashSet<String>,
    capacity: usize,
}

impl DuplicateWindow {
    pub const DEFAULT_CAPACITY: usize = 1000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    pub fn is_duplicate(&self, tx_hash: &str) -> bool {
        self.members.contains(tx_hash)
    }

    /// Remembers `tx_hash`. Recording a hash that is already present leaves
    /// both membership and eviction order untouched.
    pub fn record(&mut self, tx_hash: &str) {
        if self.members.contains(tx_hash) {
            return;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.order.push_back(tx_hash.to_string());
        self.members.insert(tx_hash.to_string());
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for DuplicateWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Raised when a network has never produced a usable price.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("no usd price available for {network}: {reason}")]
pub struct PriceUnavailable {
    pub network: Network,
    pub reason: ProviderError,
}

/// Single-slot USD price cache with a fixed time-to-live.
///
/// A failed refresh keeps the previous quote; callers can inspect
/// [`PriceQuote::age`] to decide whether it is still good enough.
#[derive(Debug, Clone)]
pub struct PriceCache {
    network: Network,
    ttl: Duration,
    entry: Option<PriceQuote>,
}

impl PriceCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

    pub fn new(network: Network) -> Self {
        Self::with_ttl(network, Self::DEFAULT_TTL)
    }

    pub fn with_ttl(network: Network, ttl: Duration) -> Self {
        Self {
            network,
            ttl,
            entry: None,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Last stored quote, fresh or not.
    pub fn cached(&self) -> Option<PriceQuote> {
        self.entry
    }

    pub async fn get_price_usd<P>(&mut self, source: &P) -> Result<PriceQuote, PriceUnavailable>
    where
        P: PriceSource + ?Sized,
    {
        if let Some(quote) = self.entry.filter(|quote| !quote.is_stale(self.ttl)) {
            debug!(network = %self.network, price = quote.price_usd, "price cache hit");
            return Ok(quote);
        }

        let outcome = source.fetch_price_usd().await.and_then(|price| {
            if price.is_finite() && price > 0.0 {
                Ok(price)
            } else {
                Err(ProviderError::Decode(format!("unusable price {price}")))
            }
        });

        match outcome {
            Ok(price) => {
                counter!("txwatch_price_refresh_total", "network" => self.network.label(), "result" => "ok")
                    .increment(1);
                info!(network = %self.network, price, "price updated");
                let quote = PriceQuote::new(price);
                self.entry = Some(quote);
                Ok(quote)
            }
            Err(reason) => {
                counter!("txwatch_price_refresh_total", "network" => self.network.label(), "result" => "error")
                    .increment(1);
                match self.entry {
                    Some(stale) => {
                        warn!(
                            network = %self.network,
                            error = %reason,
                            age_secs = stale.age().as_secs(),
                            "price refresh failed, serving stale quote"
                        );
                        Ok(stale)
                    }
                    None => Err(PriceUnavailable {
                        network: self.network,
                        reason,
                    }),
                }
            }
        }
    }
}
