//! Fan-in of raw broker quotes into cached, throttled price updates.
//!
//! The dispatcher consumes the broker's quote broadcast, derives a
//! mid-price per quote, writes it into the [`PriceCache`], and offers it
//! to the [`PriceThrottle`] for downstream delivery. A lagged receiver
//! is logged and resumed rather than torn down; the stream only stops on
//! channel close or cancellation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::cache::PriceCache;
use super::throttle::PriceThrottle;
use crate::broker::QuoteUpdate;

/// A derived per-symbol price, ready for consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceUpdate {
    /// OCC option symbol.
    pub symbol: String,
    /// Mid-price, or the only quoted side when one is missing.
    pub price: Decimal,
    /// Bid, when quoted.
    pub bid: Option<Decimal>,
    /// Ask, when quoted.
    pub ask: Option<Decimal>,
    /// Quote timestamp from the feed.
    pub timestamp: DateTime<Utc>,
}

/// Derive a [`PriceUpdate`] from a raw quote.
///
/// Returns `None` when neither side is quoted.
#[must_use]
pub fn derive_price(quote: &QuoteUpdate) -> Option<PriceUpdate> {
    let two = Decimal::from(2);
    let price = match (quote.bid, quote.ask) {
        (Some(bid), Some(ask)) => (bid + ask) / two,
        (Some(side), None) | (None, Some(side)) => side,
        (None, None) => return None,
    };

    Some(PriceUpdate {
        symbol: quote.symbol.clone(),
        price,
        bid: quote.bid,
        ask: quote.ask,
        timestamp: quote.timestamp,
    })
}

/// Pump quotes from the broker stream into cache and throttle.
pub struct StreamDispatcher {
    cache: Arc<PriceCache>,
    throttle: Arc<PriceThrottle>,
    shutdown: CancellationToken,
}

impl StreamDispatcher {
    /// Create a dispatcher over shared cache and throttle.
    #[must_use]
    pub fn new(
        cache: Arc<PriceCache>,
        throttle: Arc<PriceThrottle>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            cache,
            throttle,
            shutdown,
        }
    }

    /// Apply one quote: cache the derived price and offer it downstream.
    pub fn dispatch(&self, quote: &QuoteUpdate) {
        let Some(update) = derive_price(quote) else {
            tracing::debug!(symbol = %quote.symbol, "Quote with no bid or ask skipped");
            return;
        };
        self.cache.set(update.clone());
        self.throttle.send(update);
    }

    /// Consume the quote stream until it closes or shutdown is requested.
    pub async fn run(&self, mut quotes: broadcast::Receiver<QuoteUpdate>) {
        loop {
            tokio::select! {
                result = quotes.recv() => match result {
                    Ok(quote) => self.dispatch(&quote),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Quote stream lagged; resuming from latest");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Quote stream closed");
                        break;
                    }
                },
                () = self.shutdown.cancelled() => {
                    tracing::info!("Quote dispatcher shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::throttle::ThrottleConfig;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn quote(symbol: &str, bid: Option<Decimal>, ask: Option<Decimal>) -> QuoteUpdate {
        QuoteUpdate {
            symbol: symbol.to_string(),
            bid,
            ask,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn mid_price_from_both_sides() {
        let update = derive_price(&quote("SPY260117C00695000", Some(dec!(1.40)), Some(dec!(1.60))))
            .unwrap();
        assert_eq!(update.price, dec!(1.50));
    }

    #[test]
    fn one_sided_quote_uses_that_side() {
        let bid_only =
            derive_price(&quote("SPY260117C00695000", Some(dec!(1.40)), None)).unwrap();
        assert_eq!(bid_only.price, dec!(1.40));

        let ask_only =
            derive_price(&quote("SPY260117C00695000", None, Some(dec!(1.60)))).unwrap();
        assert_eq!(ask_only.price, dec!(1.60));
    }

    #[test]
    fn empty_quote_is_skipped() {
        assert!(derive_price(&quote("SPY260117C00695000", None, None)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_feeds_cache_and_throttle() {
        let cache = Arc::new(PriceCache::new(Duration::from_secs(30)));
        let throttle = Arc::new(PriceThrottle::new(ThrottleConfig::default()));
        let dispatcher = StreamDispatcher::new(
            Arc::clone(&cache),
            Arc::clone(&throttle),
            CancellationToken::new(),
        );
        let mut rx = throttle.subscribe();

        dispatcher.dispatch(&quote(
            "SPY260117C00695000",
            Some(dec!(1.40)),
            Some(dec!(1.60)),
        ));

        assert_eq!(cache.get("SPY260117C00695000").unwrap().price, dec!(1.50));
        assert_eq!(rx.try_recv().unwrap().price, dec!(1.50));
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_when_channel_closes() {
        let cache = Arc::new(PriceCache::new(Duration::from_secs(30)));
        let throttle = Arc::new(PriceThrottle::new(ThrottleConfig::default()));
        let dispatcher = StreamDispatcher::new(
            Arc::clone(&cache),
            Arc::clone(&throttle),
            CancellationToken::new(),
        );

        let (tx, rx) = broadcast::channel(16);
        tx.send(quote("SPY260117C00695000", Some(dec!(1.40)), Some(dec!(1.60))))
            .unwrap();
        drop(tx);

        dispatcher.run(rx).await;
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_cancellation() {
        let cache = Arc::new(PriceCache::new(Duration::from_secs(30)));
        let throttle = Arc::new(PriceThrottle::new(ThrottleConfig::default()));
        let shutdown = CancellationToken::new();
        let dispatcher =
            StreamDispatcher::new(Arc::clone(&cache), Arc::clone(&throttle), shutdown.clone());

        let (_tx, rx) = broadcast::channel::<QuoteUpdate>(16);
        shutdown.cancel();
        dispatcher.run(rx).await;
    }
}
