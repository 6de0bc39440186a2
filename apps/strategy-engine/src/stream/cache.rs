//! TTL cache for the latest price per option symbol.
//!
//! Reads are expiry-checked: an entry older than the TTL is treated as
//! absent and removed on access. There is no background sweeper; callers
//! that want proactive cleanup run [`PriceCache::evict_expired`] on
//! their own cadence.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use super::dispatcher::PriceUpdate;

/// Default time-to-live for cached prices.
pub const DEFAULT_PRICE_TTL: Duration = Duration::from_secs(30);

struct CacheEntry {
    update: PriceUpdate,
    inserted_at: Instant,
}

/// Thread-safe latest-price cache with per-entry TTL.
pub struct PriceCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl PriceCache {
    /// Create a cache with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Insert or replace the latest price for a symbol.
    pub fn set(&self, update: PriceUpdate) {
        let mut entries = self.entries.write();
        entries.insert(
            update.symbol.clone(),
            CacheEntry {
                update,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Get the cached price for a symbol, if present and fresh.
    ///
    /// Expired entries are removed on access.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<PriceUpdate> {
        {
            let entries = self.entries.read();
            match entries.get(symbol) {
                Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                    return Some(entry.update.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: drop it under the write lock.
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(symbol)
            && entry.inserted_at.elapsed() >= self.ttl
        {
            entries.remove(symbol);
        }
        None
    }

    /// Remove all expired entries, returning how many were evicted.
    pub fn evict_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = entries.len(), "Evicted stale prices");
        }
        evicted
    }

    /// Number of entries currently held, including any not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn update(symbol: &str) -> PriceUpdate {
        PriceUpdate {
            symbol: symbol.to_string(),
            price: dec!(1.50),
            bid: Some(dec!(1.45)),
            ask: Some(dec!(1.55)),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn set_then_get_within_ttl() {
        let cache = PriceCache::new(Duration::from_secs(30));
        cache.set(update("SPY260117C00695000"));

        let hit = cache.get("SPY260117C00695000").unwrap();
        assert_eq!(hit.price, dec!(1.50));
    }

    #[test]
    fn expired_entry_is_absent_and_removed() {
        let cache = PriceCache::new(Duration::from_millis(10));
        cache.set(update("SPY260117C00695000"));

        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("SPY260117C00695000").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn set_refreshes_the_ttl() {
        let cache = PriceCache::new(Duration::from_millis(40));
        cache.set(update("SPY260117C00695000"));
        std::thread::sleep(Duration::from_millis(25));
        cache.set(update("SPY260117C00695000"));
        std::thread::sleep(Duration::from_millis(25));
        assert!(cache.get("SPY260117C00695000").is_some());
    }

    #[test]
    fn evict_expired_sweeps_only_stale_entries() {
        let cache = PriceCache::new(Duration::from_millis(30));
        cache.set(update("SPY260117C00695000"));
        std::thread::sleep(Duration::from_millis(40));
        cache.set(update("SPY260117P00680000"));

        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("SPY260117P00680000").is_some());
    }

    #[test]
    fn miss_on_unknown_symbol() {
        let cache = PriceCache::new(Duration::from_secs(30));
        assert!(cache.get("QQQ260117C00500000").is_none());
    }
}
