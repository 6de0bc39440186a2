//! Trade-side domain types: enriched fills, matched legs, and summaries.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::broker::{FillSide, RawFill};
use crate::positions::{LegDirection, StrategyType};
use crate::symbols::OccSymbol;

/// Trade lifecycle status, derived from the ratio of closed to total legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    /// No leg has a closing fill.
    Open,
    /// Every leg has a closing fill.
    Closed,
    /// Some legs closed, some still open.
    Partial,
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Partial => write!(f, "partial"),
        }
    }
}

/// A broker fill enriched with its parsed symbol.
///
/// Fills whose symbols fail to parse are retained (`parsed = None`) with
/// the raw symbol standing in for the underlying, so money-relevant
/// records are never dropped from trade totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    /// Broker order id.
    pub order_id: String,
    /// Raw broker symbol.
    pub symbol: String,
    /// Parsed contract, when the symbol is well-formed.
    pub parsed: Option<OccSymbol>,
    /// Buy or sell.
    pub side: FillSide,
    /// Contracts filled.
    pub quantity: u32,
    /// Fill price per contract.
    pub price: Decimal,
    /// Broker-reported status.
    pub status: String,
    /// Submission time, when the broker reported one.
    pub submitted_at: Option<DateTime<Utc>>,
    /// Fill completion time.
    pub filled_at: Option<DateTime<Utc>>,
    /// Original broker payload.
    pub payload: serde_json::Value,
}

impl Fill {
    /// Enrich a raw broker fill. Parse failures are logged, not fatal.
    #[must_use]
    pub fn from_raw(raw: RawFill) -> Self {
        let parsed = match OccSymbol::parse(&raw.symbol) {
            Ok(symbol) => Some(symbol),
            Err(e) => {
                tracing::warn!(
                    symbol = %raw.symbol,
                    order_id = %raw.order_id,
                    error = %e,
                    "Retaining fill with unparseable symbol"
                );
                None
            }
        };

        Self {
            order_id: raw.order_id,
            symbol: raw.symbol,
            parsed,
            side: raw.side,
            quantity: raw.quantity,
            price: raw.price,
            status: raw.status,
            submitted_at: raw.submitted_at,
            filled_at: raw.filled_at,
            payload: raw.payload,
        }
    }

    /// Underlying ticker, falling back to the raw symbol when unparsed.
    #[must_use]
    pub fn underlying(&self) -> &str {
        self.parsed
            .as_ref()
            .map_or(self.symbol.as_str(), OccSymbol::underlying)
    }

    /// Expiry date, when the symbol parsed.
    #[must_use]
    pub fn expiry(&self) -> Option<NaiveDate> {
        self.parsed.as_ref().map(OccSymbol::expiry)
    }

    /// The timestamp used for ordering and clustering.
    #[must_use]
    pub fn event_time(&self) -> Option<DateTime<Utc>> {
        self.submitted_at.or(self.filled_at)
    }
}

/// Derived per-leg open/close detail within one trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegDetail {
    /// Contract symbol (raw form).
    pub symbol: String,
    /// SELL when the leg was opened by selling, else BUY.
    pub open_action: FillSide,
    /// Opening fill price per contract.
    pub open_price: Decimal,
    /// Contracts in the opening fill.
    pub quantity: u32,
    /// Opening fill time.
    pub open_date: Option<DateTime<Utc>>,
    /// Closing action, when the leg has closed.
    pub close_action: Option<FillSide>,
    /// Closing fill price per contract.
    pub close_price: Option<Decimal>,
    /// Closing fill time.
    pub close_date: Option<DateTime<Utc>>,
    /// P&L per contract; unrealized legs carry the signed open premium.
    pub pnl_per_contract: Decimal,
    /// `pnl_per_contract × quantity × 100`.
    pub pnl_total: Decimal,
    /// Whether a closing fill exists.
    pub closed: bool,
}

/// Aggregate money flow for one trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSummary {
    /// Σ sell-to-open premium − Σ buy-to-open premium.
    pub opening_credit: Decimal,
    /// Σ buy-to-close premium − Σ sell-to-close premium.
    pub closing_debit: Decimal,
    /// `opening_credit − closing_debit`.
    pub net_pnl: Decimal,
    /// Total legs.
    pub leg_count: usize,
    /// Legs with a closing fill.
    pub closed_legs: usize,
    /// Legs still open.
    pub open_legs: usize,
    /// "Short" when the trade opened for a credit, else "Long".
    pub direction: LegDirection,
}

/// A logical trade: one cluster of fills with matched legs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Freshly generated id for this aggregation run.
    pub trade_id: Uuid,
    /// Underlying ticker (raw symbol for unparseable clusters).
    pub underlying: String,
    /// Shared expiry, when known.
    pub expiry: Option<NaiveDate>,
    /// Classified strategy (best-effort for partially parsed clusters).
    pub strategy: StrategyType,
    /// Derived lifecycle status.
    pub status: TradeStatus,
    /// Earliest fill time in the cluster.
    pub opened_at: Option<DateTime<Utc>>,
    /// The member fills, in cluster order.
    pub fills: Vec<Fill>,
    /// Matched per-leg detail.
    pub legs: Vec<LegDetail>,
    /// Aggregate money flow.
    pub summary: TradeSummary,
}
