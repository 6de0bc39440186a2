//! The trade aggregation pipeline: fills in, matched trades out.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cluster::cluster_fills;
use super::matching::{derive_status, match_legs, summarize};
use super::types::{Fill, Trade, TradeStatus};
use crate::broker::{FillSide, RawFill};
use crate::positions::{LegDirection, LegProfile, StrategyType, classify};

/// Outcome of one aggregation run.
///
/// Fills with unparseable symbols are retained in their trades, so the
/// count here is a data-quality signal, not a loss report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationReport {
    /// The aggregated trades.
    pub trades: Vec<Trade>,
    /// Fills whose symbols failed to parse.
    pub malformed_fills: usize,
}

/// Cluster raw fill activity into trades and match their legs.
#[must_use]
pub fn aggregate_fills(raw: Vec<RawFill>, cluster_window: Duration) -> AggregationReport {
    let fills: Vec<Fill> = raw.into_iter().map(Fill::from_raw).collect();
    let malformed_fills = fills.iter().filter(|f| f.parsed.is_none()).count();

    let trades = cluster_fills(fills, cluster_window)
        .into_iter()
        .map(build_trade)
        .collect();

    AggregationReport {
        trades,
        malformed_fills,
    }
}

fn build_trade(fills: Vec<Fill>) -> Trade {
    let underlying = fills
        .first()
        .map_or_else(String::new, |f| f.underlying().to_string());
    let expiry = fills.first().and_then(Fill::expiry);
    let opened_at = fills.iter().filter_map(Fill::event_time).min();

    let legs = match_legs(&fills);
    let status = derive_status(&legs);
    let summary = summarize(&legs);

    // Classify from the opening side of each parseable leg: a sell-to-open
    // behaves as the short leg, a buy-to-open as the long leg.
    let profiles: Vec<LegProfile> = legs
        .iter()
        .filter_map(|leg| {
            let parsed = fills
                .iter()
                .find(|f| f.symbol == leg.symbol)
                .and_then(|f| f.parsed.as_ref())?;
            let direction = match leg.open_action {
                FillSide::Sell => LegDirection::Short,
                FillSide::Buy => LegDirection::Long,
            };
            Some(LegProfile::new(parsed.right(), direction, parsed.strike()))
        })
        .collect();
    let strategy = if profiles.len() == legs.len() {
        classify(&profiles)
    } else {
        // Best-effort tag when some legs never parsed.
        StrategyType::Options
    };

    Trade {
        trade_id: Uuid::new_v4(),
        underlying,
        expiry,
        strategy,
        status,
        opened_at,
        fills,
        legs,
        summary,
    }
}

/// Query filter over aggregated trades.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeFilter {
    /// Restrict to one underlying ticker (case-insensitive).
    pub underlying: Option<String>,
    /// Restrict to one lifecycle status.
    pub status: Option<TradeStatus>,
    /// Restrict to trades opened at or after this time.
    ///
    /// Trades with no dated fill have an unknown open time and are
    /// always included: a time bound cannot exclude what it cannot
    /// place, and money-relevant records are never silently hidden.
    pub since: Option<DateTime<Utc>>,
}

impl TradeFilter {
    /// Whether a trade passes this filter.
    #[must_use]
    pub fn matches(&self, trade: &Trade) -> bool {
        if let Some(underlying) = &self.underlying
            && !trade.underlying.eq_ignore_ascii_case(underlying)
        {
            return false;
        }
        if let Some(status) = self.status
            && trade.status != status
        {
            return false;
        }
        if let Some(since) = self.since
            && trade.opened_at.is_some_and(|t| t < since)
        {
            return false;
        }
        true
    }
}

/// Aggregate statistics over a set of trades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeStats {
    /// Sum of net P&L across all matching trades.
    pub total_pnl: Decimal,
    /// Fraction of closed trades with positive net P&L (0.0 when no
    /// trade has closed).
    pub win_rate: f64,
    /// All matching trades.
    pub total_trades: usize,
    /// Trades with no closed leg.
    pub open_trades: usize,
    /// Fully closed trades.
    pub closed_trades: usize,
    /// Partially closed trades.
    pub partial_trades: usize,
}

/// Compute statistics over the given trades.
#[must_use]
pub fn trade_stats(trades: &[Trade]) -> TradeStats {
    let total_pnl = trades.iter().map(|t| t.summary.net_pnl).sum();
    let open_trades = trades
        .iter()
        .filter(|t| t.status == TradeStatus::Open)
        .count();
    let closed_trades = trades
        .iter()
        .filter(|t| t.status == TradeStatus::Closed)
        .count();
    let partial_trades = trades
        .iter()
        .filter(|t| t.status == TradeStatus::Partial)
        .count();

    let wins = trades
        .iter()
        .filter(|t| t.status == TradeStatus::Closed && t.summary.net_pnl > Decimal::ZERO)
        .count();
    let win_rate = if closed_trades == 0 {
        0.0
    } else {
        wins as f64 / closed_trades as f64
    };

    TradeStats {
        total_pnl,
        win_rate,
        total_trades: trades.len(),
        open_trades,
        closed_trades,
        partial_trades,
    }
}
