// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Strategy Engine - Options Position and Trade Aggregation
//!
//! Turns a brokerage account's flat option positions and fill history
//! into strategy-level views: multi-leg position groups, a matched trade
//! log with realized P&L, and a throttled realtime price feed.
//!
//! # Layers
//!
//! - `symbols`: OCC option symbol parsing and normalization
//! - `positions`: grouping open positions into classified strategies
//! - `trades`: clustering fill history into trades with per-leg P&L
//! - `resilience`: circuit breaker around every broker call
//! - `stream`: quote ingestion, price cache, per-symbol throttling
//! - `engine`: the facade wiring the above over a [`BrokerPort`]
//!
//! The brokerage transport itself lives outside this crate; anything that
//! implements [`BrokerPort`] can drive the engine.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Broker port and raw broker records.
pub mod broker;

/// Configuration loading and validation.
pub mod config;

/// The engine facade.
pub mod engine;

/// Top-level error type.
pub mod error;

/// Position grouping and strategy classification.
pub mod positions;

/// Circuit breaker for broker calls.
pub mod resilience;

/// Realtime price plumbing.
pub mod stream;

/// OCC option symbol codec.
pub mod symbols;

/// Tracing setup.
pub mod telemetry;

/// Trade aggregation from fill history.
pub mod trades;

pub use broker::{BrokerError, BrokerPort, FillSide, QuoteUpdate, RawFill, RawPosition};
pub use config::{Config, ConfigError, load_config, load_config_from_string};
pub use engine::StrategyEngine;
pub use error::EngineError;
pub use positions::{Leg, LegDirection, PositionGroup, StrategyType};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use stream::{BoundedQueue, PriceCache, PriceThrottle, PriceUpdate, StreamDispatcher};
pub use symbols::{OccSymbol, OptionRight, SymbolError};
pub use trades::{Trade, TradeFilter, TradeStats, TradeStatus};
