//! Position-side domain types: legs and strategy groups.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::strategy::{LegDirection, LegProfile, StrategyType, classify};
use crate::symbols::{OccSymbol, OptionRight};

/// Equity options contract multiplier.
pub const CONTRACT_MULTIPLIER: i64 = 100;

/// One option contract within a strategy position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    /// Parsed contract identifier.
    pub symbol: OccSymbol,
    /// Long or short.
    pub direction: LegDirection,
    /// Contracts held (always positive; sign lives in `direction`).
    pub quantity: u32,
    /// Average entry price per contract.
    pub entry_price: Decimal,
    /// Latest known price per contract.
    pub current_price: Decimal,
}

impl Leg {
    /// Dollar P&L: `sign(direction) × (current − entry) × quantity × 100`.
    #[must_use]
    pub fn pnl(&self) -> Decimal {
        Decimal::from(self.direction.sign())
            * (self.current_price - self.entry_price)
            * Decimal::from(self.quantity)
            * Decimal::from(CONTRACT_MULTIPLIER)
    }

    /// Percent P&L with the same sign convention; zero when the entry
    /// price is zero.
    #[must_use]
    pub fn pnl_percent(&self) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        Decimal::from(self.direction.sign()) * (self.current_price - self.entry_price)
            / self.entry_price
            * Decimal::from(100)
    }

    /// Strike price of the contract.
    #[must_use]
    pub fn strike(&self) -> Decimal {
        self.symbol.strike()
    }

    /// Call or put.
    #[must_use]
    pub fn right(&self) -> OptionRight {
        self.symbol.right()
    }

    /// Reduce to the classifier's view.
    #[must_use]
    pub fn profile(&self) -> LegProfile {
        LegProfile::new(self.right(), self.direction, self.strike())
    }
}

/// A multi-leg strategy position keyed by (underlying, expiry).
///
/// Groups are rebuilt wholesale on every position refresh; `id` is stable
/// for the lifetime of one fetch cycle only and is not a durable key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionGroup {
    /// Per-cycle identity.
    pub id: Uuid,
    /// Underlying ticker.
    pub underlying: String,
    /// Shared expiration date.
    pub expiry: NaiveDate,
    /// Legs ordered by strike, then right.
    pub legs: Vec<Leg>,
    /// Classified strategy.
    pub strategy: StrategyType,
    /// Sum of leg P&L.
    pub total_pnl: Decimal,
    /// Days to expiration, clamped at zero.
    pub days_to_expiry: i64,
}

impl PositionGroup {
    /// Build a group from its legs, classifying and deriving totals.
    #[must_use]
    pub fn new(
        underlying: impl Into<String>,
        expiry: NaiveDate,
        mut legs: Vec<Leg>,
        today: NaiveDate,
    ) -> Self {
        legs.sort_by(|a, b| (a.strike(), a.right()).cmp(&(b.strike(), b.right())));

        let profiles: Vec<LegProfile> = legs.iter().map(Leg::profile).collect();
        let strategy = classify(&profiles);
        let total_pnl = legs.iter().map(Leg::pnl).sum();
        let days_to_expiry = (expiry - today).num_days().max(0);

        Self {
            id: Uuid::new_v4(),
            underlying: underlying.into(),
            expiry,
            legs,
            strategy,
            total_pnl,
            days_to_expiry,
        }
    }

    /// Number of legs in the group.
    #[must_use]
    pub fn leg_count(&self) -> usize {
        self.legs.len()
    }
}
