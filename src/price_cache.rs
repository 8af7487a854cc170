// 5.0: price cache. the one place "current price" comes from.
// 5.1 constructed explicitly and passed to every consumer. no global instance.
// 5.2 entries older than the staleness window read as absent. exactly at the window is still fresh.

use crate::config::PriceCacheConfig;
use crate::types::{Price, Timestamp};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Time source for staleness checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Clock that only moves when told to. Used to drive staleness in tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now_ms: AtomicI64::new(start.as_millis()),
        }
    }

    pub fn set(&self, at: Timestamp) {
        self.now_ms.store(at.as_millis(), Ordering::SeqCst);
    }

    pub fn advance_millis(&self, ms: i64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance_millis(secs * 1000);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.now_ms.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPrice {
    pub price: Price,
    pub updated_at: Timestamp,
    // cache-wide write sequence, strictly increasing
    pub seq: u64,
}

/// What a write produced. Handed to the liquidation monitor so it can order ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceTick {
    pub symbol: String,
    pub price: Price,
    pub seq: u64,
    pub at: Timestamp,
}

pub struct PriceCache {
    entries: DashMap<String, CachedPrice>,
    next_seq: AtomicU64,
    max_staleness_millis: u64,
    clock: Arc<dyn Clock>,
}

impl PriceCache {
    pub fn new(config: &PriceCacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &PriceCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            next_seq: AtomicU64::new(1),
            max_staleness_millis: config.max_staleness_millis(),
            clock,
        }
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // 5.3: a racing older write never replaces a newer one
    pub fn update(&self, symbol: &str, price: Price) -> PriceTick {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let at = self.clock.now();
        let fresh = CachedPrice {
            price,
            updated_at: at,
            seq,
        };

        match self.entries.entry(symbol.to_string()) {
            Entry::Occupied(mut slot) => {
                if slot.get().seq < seq {
                    slot.insert(fresh);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(fresh);
            }
        }

        PriceTick {
            symbol: symbol.to_string(),
            price,
            seq,
            at,
        }
    }

    pub fn get(&self, symbol: &str) -> Result<Price, PriceCacheError> {
        let entry = self
            .entries
            .get(symbol)
            .map(|e| *e.value())
            .ok_or_else(|| PriceCacheError::Missing(symbol.to_string()))?;

        let age_millis = self.clock.now().millis_since(entry.updated_at);
        if age_millis > self.max_staleness_millis {
            return Err(PriceCacheError::Stale {
                symbol: symbol.to_string(),
                age_millis,
                max_millis: self.max_staleness_millis,
            });
        }
        Ok(entry.price)
    }

    // fresh price or nothing
    pub fn get_fresh(&self, symbol: &str) -> Option<Price> {
        self.get(symbol).ok()
    }

    /// Latest price and its age in milliseconds, stale or not.
    pub fn get_with_age(&self, symbol: &str) -> Option<(Price, u64)> {
        let entry = self.entries.get(symbol).map(|e| *e.value())?;
        Some((entry.price, self.clock.now().millis_since(entry.updated_at)))
    }

    pub fn entry(&self, symbol: &str) -> Option<CachedPrice> {
        self.entries.get(symbol).map(|e| *e.value())
    }

    /// Every entry, stale ones included, ordered by symbol.
    pub fn snapshot(&self) -> Vec<(String, CachedPrice)> {
        let mut all: Vec<_> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for PriceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceCache")
            .field("entries", &self.entries.len())
            .field("max_staleness_millis", &self.max_staleness_millis)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceCacheError {
    #[error("No price cached for {0}")]
    Missing(String),

    #[error("Price for {symbol} is stale ({age_millis}ms old, max {max_millis}ms)")]
    Stale {
        symbol: String,
        age_millis: u64,
        max_millis: u64,
    },
}
