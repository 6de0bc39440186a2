//! Per-symbol latest-value-wins throttling of price updates.
//!
//! Downstream consumers only ever need the most recent price, so bursts
//! are coalesced: the first update for a symbol goes out immediately,
//! and further updates inside the minimum interval replace a single
//! pending value that a deferred flush task emits once the interval has
//! elapsed. The set of symbols with a pending flush is bounded; when it
//! overflows, the least recently updated symbol's flush is aborted and
//! counted as an eviction.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::dispatcher::PriceUpdate;

/// Broadcast capacity for throttled updates.
const UPDATE_CHANNEL_CAPACITY: usize = 1024;

/// Throttle configuration.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Minimum interval between two emissions for one symbol.
    pub interval: Duration,
    /// Maximum number of symbols with a pending flush.
    pub max_pending: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_pending: 1000,
        }
    }
}

struct PendingFlush {
    update: PriceUpdate,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct ThrottleInner {
    /// When each symbol last had an update emitted.
    last_sent: HashMap<String, Instant>,
    /// Pending latest value per symbol, with its flush task.
    pending: HashMap<String, PendingFlush>,
    /// Pending symbols, least recently updated first.
    order: VecDeque<String>,
}

/// Rate limiter that coalesces price updates per symbol.
pub struct PriceThrottle {
    config: ThrottleConfig,
    inner: Arc<Mutex<ThrottleInner>>,
    tx: broadcast::Sender<PriceUpdate>,
    evictions: AtomicU64,
}

impl PriceThrottle {
    /// Create a throttle with its own broadcast channel.
    #[must_use]
    pub fn new(config: ThrottleConfig) -> Self {
        let (tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            config,
            inner: Arc::new(Mutex::new(ThrottleInner::default())),
            tx,
            evictions: AtomicU64::new(0),
        }
    }

    /// Get a receiver for throttled price updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PriceUpdate> {
        self.tx.subscribe()
    }

    /// Offer an update; it is emitted now, coalesced, or deferred.
    pub fn send(&self, update: PriceUpdate) {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        // A pending flush already exists: latest value wins, the timer
        // keeps its original deadline.
        if let Some(pending) = inner.pending.get_mut(&update.symbol) {
            touch(&mut inner.order, &update.symbol);
            pending.update = update;
            return;
        }

        let due = inner
            .last_sent
            .get(&update.symbol)
            .map(|sent_at| *sent_at + self.config.interval);

        match due {
            Some(due) if due > now => {
                self.defer(inner, update, due);
            }
            _ => {
                inner.last_sent.insert(update.symbol.clone(), now);
                let _ = self.tx.send(update);
            }
        }
    }

    /// Schedule a deferred flush for a symbol inside its quiet window.
    fn defer(&self, inner: &mut ThrottleInner, update: PriceUpdate, due: Instant) {
        if inner.pending.len() >= self.config.max_pending
            && let Some(victim) = inner.order.pop_front()
        {
            if let Some(evicted) = inner.pending.remove(&victim) {
                evicted.task.abort();
            }
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                symbol = %victim,
                max_pending = self.config.max_pending,
                "Pending price flush evicted"
            );
        }

        let symbol = update.symbol.clone();
        let task = tokio::spawn(flush_after(
            Arc::clone(&self.inner),
            self.tx.clone(),
            symbol.clone(),
            due,
        ));

        inner.pending.insert(symbol.clone(), PendingFlush { update, task });
        inner.order.push_back(symbol);
    }

    /// Abort every pending flush.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        for (_, pending) in inner.pending.drain() {
            pending.task.abort();
        }
        inner.order.clear();
    }

    /// Number of symbols with a deferred flush right now.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Total pending flushes evicted since creation.
    #[must_use]
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

impl Drop for PriceThrottle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Move a pending symbol to the most-recently-updated end.
fn touch(order: &mut VecDeque<String>, symbol: &str) {
    if let Some(pos) = order.iter().position(|s| s == symbol) {
        order.remove(pos);
        order.push_back(symbol.to_string());
    }
}

/// Sleep until the quiet window ends, then emit the latest value.
async fn flush_after(
    inner: Arc<Mutex<ThrottleInner>>,
    tx: broadcast::Sender<PriceUpdate>,
    symbol: String,
    due: Instant,
) {
    tokio::time::sleep_until(due).await;

    let mut inner = inner.lock();
    // Evicted or shut down in the meantime.
    let Some(pending) = inner.pending.remove(&symbol) else {
        return;
    };
    if let Some(pos) = inner.order.iter().position(|s| *s == symbol) {
        inner.order.remove(pos);
    }
    inner.last_sent.insert(symbol, Instant::now());
    let _ = tx.send(pending.update);
}
