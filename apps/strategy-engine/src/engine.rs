//! The engine facade: position grouping, trade aggregation, and realtime
//! prices behind one interface.
//!
//! Every broker call goes through the circuit breaker. When the circuit
//! is open, read paths degrade to the last known snapshot instead of
//! failing, so consumers keep working through a broker outage.

use std::sync::Arc;

use chrono::{Duration, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::broker::BrokerPort;
use crate::config::Config;
use crate::error::EngineError;
use crate::positions::{PositionGroup, group_positions};
use crate::resilience::{CircuitBreaker, CircuitBreakerError, CircuitBreakerMetrics, CircuitState};
use crate::stream::{BoundedQueue, PriceCache, PriceThrottle, PriceUpdate, StreamDispatcher};
use crate::trades::{Trade, TradeFilter, TradeStats, aggregate_fills, trade_stats};

/// Breaker name used in logs and rejections.
const BROKER_BREAKER: &str = "broker";

/// Aggregation engine over one brokerage account.
pub struct StrategyEngine {
    broker: Arc<dyn BrokerPort>,
    config: Config,
    breaker: CircuitBreaker,
    cache: Arc<PriceCache>,
    throttle: Arc<PriceThrottle>,
    positions: RwLock<Vec<PositionGroup>>,
    trades: RwLock<Vec<Trade>>,
    /// Bounded backlog of throttled updates for polling consumers.
    updates: Arc<BoundedQueue<PriceUpdate>>,
    stream_tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl StrategyEngine {
    /// Build an engine over a broker port.
    #[must_use]
    pub fn new(broker: Arc<dyn BrokerPort>, config: Config) -> Self {
        let breaker = CircuitBreaker::new(BROKER_BREAKER, config.circuit_breaker.to_breaker_config());
        let cache = Arc::new(PriceCache::new(config.cache.price_ttl()));
        let throttle = Arc::new(PriceThrottle::new(config.throttle.to_throttle_config()));
        let updates = Arc::new(BoundedQueue::new(config.queue.capacity));

        Self {
            broker,
            config,
            breaker,
            cache,
            throttle,
            positions: RwLock::new(Vec::new()),
            trades: RwLock::new(Vec::new()),
            updates,
            stream_tasks: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Fetch open positions and rebuild the strategy groups.
    ///
    /// When the circuit is open the last known groups are returned and a
    /// warning is logged; the broker is not touched.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Broker`] when the fetch itself fails.
    pub async fn refresh_positions(&self) -> Result<Vec<PositionGroup>, EngineError> {
        let raw = match self.breaker.call(self.broker.fetch_positions()).await {
            Ok(raw) => raw,
            Err(CircuitBreakerError::Open { name }) => {
                tracing::warn!(breaker = %name, "Serving last known positions; circuit open");
                return Ok(self.positions.read().clone());
            }
            Err(CircuitBreakerError::Inner(e)) => return Err(e.into()),
        };

        let today = Utc::now().date_naive();
        let groups = group_positions(&raw, today);
        tracing::info!(
            positions = raw.len(),
            groups = groups.len(),
            "Rebuilt position groups"
        );

        *self.positions.write() = groups.clone();
        Ok(groups)
    }

    /// Fetch fill history over the configured lookback and rebuild the
    /// trade log.
    ///
    /// Degrades to the last known trades when the circuit is open.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Broker`] when the fetch itself fails.
    pub async fn refresh_trades(&self) -> Result<Vec<Trade>, EngineError> {
        let since = Utc::now() - Duration::days(i64::from(self.config.engine.lookback_days));

        let raw = match self.breaker.call(self.broker.fetch_fill_activities(since)).await {
            Ok(raw) => raw,
            Err(CircuitBreakerError::Open { name }) => {
                tracing::warn!(breaker = %name, "Serving last known trades; circuit open");
                return Ok(self.trades.read().clone());
            }
            Err(CircuitBreakerError::Inner(e)) => return Err(e.into()),
        };

        let report = aggregate_fills(raw, self.config.engine.cluster_window());
        if report.malformed_fills > 0 {
            tracing::warn!(
                malformed = report.malformed_fills,
                "Fill history contained unparseable symbols"
            );
        }
        tracing::info!(trades = report.trades.len(), "Rebuilt trade log");

        *self.trades.write() = report.trades.clone();
        Ok(report.trades)
    }

    /// Current strategy groups from the last successful refresh.
    #[must_use]
    pub fn positions(&self) -> Vec<PositionGroup> {
        self.positions.read().clone()
    }

    /// Look up one strategy group by its per-cycle id.
    #[must_use]
    pub fn position(&self, id: Uuid) -> Option<PositionGroup> {
        self.positions.read().iter().find(|g| g.id == id).cloned()
    }

    /// Trades from the last successful refresh, filtered.
    #[must_use]
    pub fn trades(&self, filter: &TradeFilter) -> Vec<Trade> {
        self.trades
            .read()
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect()
    }

    /// Statistics over the filtered trade log.
    #[must_use]
    pub fn trade_stats(&self, filter: &TradeFilter) -> TradeStats {
        trade_stats(&self.trades(filter))
    }

    /// Every contract symbol held in the current position snapshot.
    #[must_use]
    pub fn held_symbols(&self) -> Vec<String> {
        self.positions
            .read()
            .iter()
            .flat_map(|g| g.legs.iter().map(|l| l.symbol.to_string()))
            .collect()
    }

    /// Subscribe to the broker quote stream for the given contracts and
    /// start dispatching prices into the cache and throttle.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CircuitOpen`] when the circuit rejects the
    /// subscription, or [`EngineError::Broker`] when it fails.
    pub async fn subscribe_prices(&self, symbols: Vec<String>) -> Result<(), EngineError> {
        let quotes = self
            .breaker
            .call(self.broker.subscribe_quotes(symbols.clone()))
            .await?;

        let dispatcher = StreamDispatcher::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.throttle),
            self.shutdown.child_token(),
        );
        let dispatch = tokio::spawn(async move { dispatcher.run(quotes).await });
        let pump = tokio::spawn(pump_price_queue(
            Arc::clone(&self.updates),
            self.throttle.subscribe(),
            self.shutdown.child_token(),
        ));

        let mut tasks = self.stream_tasks.lock();
        for previous in tasks.drain(..) {
            previous.abort();
        }
        tasks.push(dispatch);
        tasks.push(pump);

        tracing::info!(symbols = symbols.len(), "Quote streaming started");
        Ok(())
    }

    /// Receiver for throttled price updates.
    #[must_use]
    pub fn price_updates(&self) -> broadcast::Receiver<PriceUpdate> {
        self.throttle.subscribe()
    }

    /// Latest cached price for a symbol, if fresh.
    #[must_use]
    pub fn cached_price(&self, symbol: &str) -> Option<PriceUpdate> {
        self.cache.get(symbol)
    }

    /// Drain the backlog of throttled updates, oldest first.
    ///
    /// For consumers that poll instead of holding a [`price_updates`]
    /// receiver. The backlog is bounded by `queue.capacity`; when a poll
    /// falls behind, the oldest updates are shed.
    ///
    /// [`price_updates`]: Self::price_updates
    #[must_use]
    pub fn drain_price_updates(&self) -> Vec<PriceUpdate> {
        self.updates.drain()
    }

    /// Updates shed from the polling backlog since startup.
    #[must_use]
    pub fn dropped_price_updates(&self) -> u64 {
        self.updates.dropped()
    }

    /// Sweep expired prices out of the cache.
    pub fn evict_stale_prices(&self) -> usize {
        self.cache.evict_expired()
    }

    /// Current circuit breaker state.
    #[must_use]
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Circuit breaker counters.
    #[must_use]
    pub fn breaker_metrics(&self) -> CircuitBreakerMetrics {
        self.breaker.metrics()
    }

    /// Stop streaming and cancel all background work.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.throttle.shutdown();
        for task in self.stream_tasks.lock().drain(..) {
            task.abort();
        }
        tracing::info!("Strategy engine shut down");
    }
}

/// Feed throttled updates into the polling backlog.
async fn pump_price_queue(
    queue: Arc<BoundedQueue<PriceUpdate>>,
    mut updates: broadcast::Receiver<PriceUpdate>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            result = updates.recv() => match result {
                Ok(update) => queue.push(update),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Price backlog pump lagged; resuming");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            () = shutdown.cancelled() => break,
        }
    }
}

impl Drop for StrategyEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerError, FillSide, MockBrokerPort, QuoteUpdate, RawFill, RawPosition};
    use crate::config::{CircuitBreakerSettings, QueueSettings};
    use crate::positions::StrategyType;
    use crate::trades::TradeStatus;
    use mockall::Sequence;
    use rust_decimal_macros::dec;
    use tokio_test::assert_ok;

    fn position(symbol: &str, quantity: i64) -> RawPosition {
        RawPosition {
            symbol: symbol.to_string(),
            quantity,
            entry_price: dec!(2.00),
            current_price: dec!(2.50),
        }
    }

    fn fill(symbol: &str, side: FillSide, price: rust_decimal::Decimal, at: &str) -> RawFill {
        RawFill {
            order_id: "o".to_string(),
            symbol: symbol.to_string(),
            side,
            quantity: 10,
            price,
            status: "filled".to_string(),
            submitted_at: Some(at.parse().unwrap()),
            filled_at: None,
            payload: serde_json::Value::Null,
        }
    }

    fn config() -> Config {
        Config {
            circuit_breaker: CircuitBreakerSettings {
                failure_threshold: 2,
                recovery_timeout_secs: 60,
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn refresh_positions_builds_groups() {
        let mut broker = MockBrokerPort::new();
        broker.expect_fetch_positions().times(1).returning(|| {
            Ok(vec![
                position("SPY260117C00695000", 10),
                position("SPY260117C00700000", -10),
            ])
        });

        let engine = StrategyEngine::new(Arc::new(broker), config());
        let groups = assert_ok!(engine.refresh_positions().await);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].strategy, StrategyType::VerticalSpread);
        assert_eq!(engine.positions(), groups);
        assert_eq!(engine.position(groups[0].id).unwrap().underlying, "SPY");
    }

    #[tokio::test]
    async fn open_circuit_serves_last_known_positions() {
        let mut broker = MockBrokerPort::new();
        let mut seq = Sequence::new();
        broker
            .expect_fetch_positions()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![position("SPY260117C00695000", 10)]));
        broker
            .expect_fetch_positions()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|| {
                Err(BrokerError::Connection {
                    message: "down".to_string(),
                })
            });

        let engine = StrategyEngine::new(Arc::new(broker), config());

        let first = engine.refresh_positions().await.unwrap();
        assert_eq!(first.len(), 1);

        // Two consecutive failures trip the breaker.
        assert!(engine.refresh_positions().await.is_err());
        assert!(engine.refresh_positions().await.is_err());
        assert_eq!(engine.circuit_state(), CircuitState::Open);

        // The broker is not called again; the last snapshot is served.
        let degraded = engine.refresh_positions().await.unwrap();
        assert_eq!(degraded, first);
    }

    #[tokio::test]
    async fn refresh_trades_aggregates_history() {
        let mut broker = MockBrokerPort::new();
        broker.expect_fetch_fill_activities().times(1).returning(|_| {
            Ok(vec![
                fill(
                    "SPY260117C00695000",
                    FillSide::Sell,
                    dec!(2.00),
                    "2026-01-10T14:30:00Z",
                ),
                fill(
                    "SPY260117C00695000",
                    FillSide::Buy,
                    dec!(0.50),
                    "2026-01-10T14:31:00Z",
                ),
            ])
        });

        let engine = StrategyEngine::new(Arc::new(broker), config());
        let trades = engine.refresh_trades().await.unwrap();

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].status, TradeStatus::Closed);
        assert_eq!(trades[0].summary.net_pnl, dec!(1500.0));

        let closed = engine.trades(&TradeFilter {
            status: Some(TradeStatus::Closed),
            ..Default::default()
        });
        assert_eq!(closed.len(), 1);

        let stats = engine.trade_stats(&TradeFilter::default());
        assert_eq!(stats.total_trades, 1);
        assert_eq!(stats.win_rate, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn streaming_feeds_cache_and_subscribers() {
        let (tx, _) = broadcast::channel::<QuoteUpdate>(16);
        let quote_tx = tx.clone();

        let mut broker = MockBrokerPort::new();
        broker
            .expect_fetch_positions()
            .returning(|| Ok(vec![position("SPY260117C00695000", 10)]));
        broker
            .expect_subscribe_quotes()
            .times(1)
            .return_once(move |_| Ok(tx.subscribe()));

        let engine = StrategyEngine::new(Arc::new(broker), config());
        engine.refresh_positions().await.unwrap();

        let mut prices = engine.price_updates();
        engine
            .subscribe_prices(engine.held_symbols())
            .await
            .unwrap();

        quote_tx
            .send(QuoteUpdate {
                symbol: "SPY260117C00695000".to_string(),
                bid: Some(dec!(1.40)),
                ask: Some(dec!(1.60)),
                timestamp: Utc::now(),
            })
            .unwrap();

        // Let the dispatcher task process the quote.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(
            engine.cached_price("SPY260117C00695000").unwrap().price,
            dec!(1.50)
        );
        assert_eq!(prices.try_recv().unwrap().price, dec!(1.50));

        engine.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn polling_backlog_is_bounded_by_queue_capacity() {
        let (tx, _) = broadcast::channel::<QuoteUpdate>(16);
        let quote_tx = tx.clone();

        let mut broker = MockBrokerPort::new();
        broker
            .expect_subscribe_quotes()
            .times(1)
            .return_once(move |_| Ok(tx.subscribe()));

        let config = Config {
            queue: QueueSettings { capacity: 2 },
            ..config()
        };
        let engine = StrategyEngine::new(Arc::new(broker), config);
        engine.subscribe_prices(vec![]).await.unwrap();

        // Three distinct symbols, each delivered immediately by the
        // throttle; a capacity-2 backlog sheds the oldest.
        for symbol in ["SPY260117C00695000", "SPY260117P00680000", "QQQ260117C00500000"] {
            quote_tx
                .send(QuoteUpdate {
                    symbol: symbol.to_string(),
                    bid: Some(dec!(1.40)),
                    ask: Some(dec!(1.60)),
                    timestamp: Utc::now(),
                })
                .unwrap();
        }

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let backlog = engine.drain_price_updates();
        assert_eq!(backlog.len(), 2);
        assert_eq!(backlog[0].symbol, "SPY260117P00680000");
        assert_eq!(backlog[1].symbol, "QQQ260117C00500000");
        assert_eq!(engine.dropped_price_updates(), 1);

        // Drained means gone.
        assert!(engine.drain_price_updates().is_empty());

        engine.shutdown();
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let broker = MockBrokerPort::new();
        let engine = StrategyEngine::new(Arc::new(broker), config());
        engine.shutdown();
        engine.shutdown();
    }
}
