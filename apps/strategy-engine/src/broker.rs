//! Broker port: the interface the engine consumes from the brokerage
//! collaborator.
//!
//! The transport (REST/WebSocket client, credentials, sessions) lives
//! outside this crate; the engine only sees the raw records defined here.
//! Every call through this port is wrapped by the circuit breaker.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[cfg(test)]
use mockall::automock;

/// Side of an order fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillSide {
    /// Bought contracts.
    Buy,
    /// Sold contracts.
    Sell,
}

impl std::fmt::Display for FillSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// An open position as reported by the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPosition {
    /// Broker instrument symbol (OCC format for options).
    pub symbol: String,
    /// Signed quantity: negative for short positions.
    pub quantity: i64,
    /// Average entry price per contract.
    pub entry_price: Decimal,
    /// Latest mark price per contract.
    pub current_price: Decimal,
}

/// One order fill activity record from the broker's history feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFill {
    /// Broker order id.
    pub order_id: String,
    /// Broker instrument symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: FillSide,
    /// Contracts filled.
    pub quantity: u32,
    /// Fill price per contract.
    pub price: Decimal,
    /// Broker-reported status string.
    pub status: String,
    /// When the order was submitted. Brokers omit this for some
    /// activity types.
    pub submitted_at: Option<DateTime<Utc>>,
    /// When the fill completed.
    pub filled_at: Option<DateTime<Utc>>,
    /// The unmodified broker payload, kept for audit.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// A quote tick from the broker stream.
///
/// Sides are optional at this boundary: one-sided books arrive with the
/// missing side absent rather than zero (the adapter normalizes the
/// broker's payload variance before it reaches the core).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteUpdate {
    /// Instrument symbol.
    pub symbol: String,
    /// Best bid, if present.
    pub bid: Option<Decimal>,
    /// Best ask, if present.
    pub ask: Option<Decimal>,
    /// Exchange timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Broker port error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    /// Transport-level failure (network, 5xx).
    #[error("broker connection error: {message}")]
    Connection {
        /// Error details.
        message: String,
    },

    /// The API answered with an error payload.
    #[error("broker API error: {code} - {message}")]
    Api {
        /// Error code from the API.
        code: String,
        /// Error message from the API.
        message: String,
    },

    /// Authentication failed.
    #[error("broker authentication failed")]
    AuthenticationFailed,

    /// Rate limited by the broker.
    #[error("rate limited by broker")]
    RateLimited,

    /// The quote stream ended or was never established.
    #[error("quote stream closed: {message}")]
    StreamClosed {
        /// Error details.
        message: String,
    },
}

/// Port for the brokerage collaborator.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BrokerPort: Send + Sync {
    /// Fetch all currently open positions.
    async fn fetch_positions(&self) -> Result<Vec<RawPosition>, BrokerError>;

    /// Fetch FILL activity records since the given time.
    async fn fetch_fill_activities(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<RawFill>, BrokerError>;

    /// Subscribe to the quote stream for the given symbols.
    ///
    /// The returned receiver is fed by a broker-owned background task.
    async fn subscribe_quotes(
        &self,
        symbols: Vec<String>,
    ) -> Result<broadcast::Receiver<QuoteUpdate>, BrokerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_side_display() {
        assert_eq!(FillSide::Buy.to_string(), "BUY");
        assert_eq!(FillSide::Sell.to_string(), "SELL");
    }

    #[test]
    fn raw_fill_deserializes_without_payload() {
        let json = r#"{
            "order_id": "o-1",
            "symbol": "SPY260117C00695000",
            "side": "sell",
            "quantity": 10,
            "price": "2.00",
            "status": "filled",
            "submitted_at": "2026-01-10T14:30:00Z",
            "filled_at": "2026-01-10T14:30:01Z"
        }"#;
        let fill: RawFill = serde_json::from_str(json).unwrap();
        assert_eq!(fill.side, FillSide::Sell);
        assert!(fill.payload.is_null());
    }
}
