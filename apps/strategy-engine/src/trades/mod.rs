//! Trade aggregation: clustering historical fills into logical trades,
//! matching opening to closing fills per leg, and computing P&L.
//!
//! The pipeline is `RawFill` → enrichment ([`Fill`]) → time-gap
//! clustering → per-symbol open/close matching → [`Trade`] with
//! [`LegDetail`] and [`TradeSummary`].

mod aggregator;
mod cluster;
mod matching;
mod types;

pub use aggregator::{AggregationReport, TradeFilter, TradeStats, aggregate_fills, trade_stats};
pub use cluster::cluster_fills;
pub use matching::{derive_status, match_legs, summarize};
pub use types::{Fill, LegDetail, Trade, TradeStatus, TradeSummary};
