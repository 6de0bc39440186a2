//! Position grouping and strategy classification.
//!
//! Raw broker positions come in flat; this module parses their symbols,
//! groups them by (underlying, expiry), classifies the resulting leg
//! multiset, and derives P&L and days-to-expiry. Groups are superseded
//! wholesale on every refresh.

mod grouper;
mod strategy;
mod types;

pub use grouper::group_positions;
pub use strategy::{LegDirection, LegProfile, StrategyType, classify};
pub use types::{CONTRACT_MULTIPLIER, Leg, PositionGroup};
