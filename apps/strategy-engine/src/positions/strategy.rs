//! Strategy classification from leg multisets.
//!
//! The classifier is a pure function of the legs' (right, direction,
//! strike) profile: permuting leg order never changes the result. The
//! decision table is applied in order, first match wins, and always
//! terminates in the generic [`StrategyType::Options`] bucket.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::symbols::OptionRight;

/// Direction of a single leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegDirection {
    /// Long the contract.
    Long,
    /// Short the contract.
    Short,
}

impl LegDirection {
    /// P&L sign convention: +1 for long, -1 for short.
    #[must_use]
    pub const fn sign(self) -> i64 {
        match self {
            Self::Long => 1,
            Self::Short => -1,
        }
    }
}

impl fmt::Display for LegDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "Long"),
            Self::Short => write!(f, "Short"),
        }
    }
}

/// Classified strategy of a leg multiset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    /// Short call spread + short put spread at distinct short strikes.
    IronCondor,
    /// Iron condor shape with the two short strikes converged.
    IronButterfly,
    /// Two legs of the same option type.
    VerticalSpread,
    /// Call + put at the same strike.
    Straddle,
    /// Call + put at different strikes.
    Strangle,
    /// Generic/unclassified options position.
    #[default]
    Options,
}

impl fmt::Display for StrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IronCondor => write!(f, "Iron Condor"),
            Self::IronButterfly => write!(f, "Iron Butterfly"),
            Self::VerticalSpread => write!(f, "Vertical Spread"),
            Self::Straddle => write!(f, "Straddle"),
            Self::Strangle => write!(f, "Strangle"),
            Self::Options => write!(f, "Options"),
        }
    }
}

/// The minimal leg view the classifier needs.
///
/// Positions and trade clusters both reduce their legs to this shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegProfile {
    /// Call or put.
    pub right: OptionRight,
    /// Long or short.
    pub direction: LegDirection,
    /// Strike price.
    pub strike: Decimal,
}

impl LegProfile {
    /// Create a leg profile.
    #[must_use]
    pub const fn new(right: OptionRight, direction: LegDirection, strike: Decimal) -> Self {
        Self {
            right,
            direction,
            strike,
        }
    }
}

/// Classify a leg multiset.
///
/// Decision table (first match wins):
/// 1. 4 legs, 2 calls + 2 puts, each type pair one long + one short at
///    distinct strikes: iron condor, or iron butterfly when the two
///    short strikes are equal.
/// 2. 2 legs, same option type: vertical spread.
/// 3. 2 legs, different type, equal strikes: straddle.
/// 4. 2 legs, different type, different strikes: strangle.
/// 5. Anything else (0, 1, 3, or an invalid 4-leg shape): options.
#[must_use]
pub fn classify(legs: &[LegProfile]) -> StrategyType {
    match legs {
        [a, b] => classify_pair(a, b),
        four @ [_, _, _, _] => classify_four(four).unwrap_or(StrategyType::Options),
        _ => StrategyType::Options,
    }
}

fn classify_pair(a: &LegProfile, b: &LegProfile) -> StrategyType {
    if a.right == b.right {
        StrategyType::VerticalSpread
    } else if a.strike == b.strike {
        StrategyType::Straddle
    } else {
        StrategyType::Strangle
    }
}

fn classify_four(legs: &[LegProfile]) -> Option<StrategyType> {
    let calls: Vec<&LegProfile> = legs
        .iter()
        .filter(|l| l.right == OptionRight::Call)
        .collect();
    let puts: Vec<&LegProfile> = legs
        .iter()
        .filter(|l| l.right == OptionRight::Put)
        .collect();

    if calls.len() != 2 || puts.len() != 2 {
        return None;
    }

    let short_call_strike = short_strike_of_wing(&calls)?;
    let short_put_strike = short_strike_of_wing(&puts)?;

    if short_call_strike == short_put_strike {
        Some(StrategyType::IronButterfly)
    } else {
        Some(StrategyType::IronCondor)
    }
}

/// A valid wing is one long + one short at distinct strikes; returns the
/// short strike.
fn short_strike_of_wing(wing: &[&LegProfile]) -> Option<Decimal> {
    let (a, b) = (wing[0], wing[1]);
    if a.direction == b.direction || a.strike == b.strike {
        return None;
    }
    Some(if a.direction == LegDirection::Short {
        a.strike
    } else {
        b.strike
    })
}
