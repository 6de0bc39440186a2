//! Grouping raw broker positions into strategy units.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::strategy::LegDirection;
use super::types::{Leg, PositionGroup};
use crate::broker::RawPosition;
use crate::symbols::OccSymbol;

/// Group open positions into multi-leg strategy units.
///
/// Positions whose symbols fail to parse are logged and dropped; grouping
/// never fails for well-formed input, and an empty input produces an
/// empty output.
#[must_use]
pub fn group_positions(raw: &[RawPosition], today: NaiveDate) -> Vec<PositionGroup> {
    let mut by_key: BTreeMap<(String, NaiveDate), Vec<Leg>> = BTreeMap::new();

    for position in raw {
        let symbol = match OccSymbol::parse(&position.symbol) {
            Ok(symbol) => symbol,
            Err(e) => {
                tracing::warn!(symbol = %position.symbol, error = %e, "Dropping unparseable position");
                continue;
            }
        };

        if position.quantity == 0 {
            tracing::warn!(symbol = %position.symbol, "Dropping zero-quantity position");
            continue;
        }

        let direction = if position.quantity < 0 {
            LegDirection::Short
        } else {
            LegDirection::Long
        };

        let quantity = u32::try_from(position.quantity.unsigned_abs()).unwrap_or_else(|_| {
            tracing::warn!(
                symbol = %position.symbol,
                quantity = position.quantity,
                "Clamping oversized position quantity"
            );
            u32::MAX
        });

        let key = (symbol.underlying().to_string(), symbol.expiry());
        by_key.entry(key).or_default().push(Leg {
            symbol,
            direction,
            quantity,
            entry_price: position.entry_price,
            current_price: position.current_price,
        });
    }

    by_key
        .into_iter()
        .map(|((underlying, expiry), legs)| PositionGroup::new(underlying, expiry, legs, today))
        .collect()
}
