//! Open/close leg matching and per-leg P&L within one trade.
//!
//! Within a trade, fills are grouped by symbol and ordered by time: the
//! first fill opens the leg and the second (when present) closes it.
//! Legs with more than one opening and one closing fill (partial fills)
//! are out of contract; extra fills are ignored with a warning rather
//! than silently re-matched.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use super::types::{Fill, LegDetail, TradeStatus, TradeSummary};
use crate::broker::FillSide;
use crate::positions::{CONTRACT_MULTIPLIER, LegDirection};

/// Match each symbol's fills into an open/close pair and derive leg P&L.
#[must_use]
pub fn match_legs(fills: &[Fill]) -> Vec<LegDetail> {
    let mut by_symbol: BTreeMap<&str, Vec<&Fill>> = BTreeMap::new();
    for fill in fills {
        by_symbol.entry(fill.symbol.as_str()).or_default().push(fill);
    }

    let mut legs = Vec::with_capacity(by_symbol.len());
    for (symbol, mut group) in by_symbol {
        group.sort_by_key(|f| (f.event_time().is_none(), f.event_time()));

        if group.len() > 2 {
            tracing::warn!(
                symbol,
                fills = group.len(),
                "More than two fills for one leg in a trade; ignoring extras"
            );
        }

        let open = group[0];
        let close = group.get(1).copied();
        legs.push(build_leg(symbol, open, close));
    }

    legs
}

fn build_leg(symbol: &str, open: &Fill, close: Option<&Fill>) -> LegDetail {
    let pnl_per_contract = match close {
        Some(close) if open.side == FillSide::Sell => open.price - close.price,
        Some(close) => close.price - open.price,
        // Unrealized: only the open fill, with the opening sign.
        None if open.side == FillSide::Sell => open.price,
        None => -open.price,
    };
    let pnl_total =
        pnl_per_contract * Decimal::from(open.quantity) * Decimal::from(CONTRACT_MULTIPLIER);

    LegDetail {
        symbol: symbol.to_string(),
        open_action: open.side,
        open_price: open.price,
        quantity: open.quantity,
        open_date: open.event_time(),
        close_action: close.map(|f| f.side),
        close_price: close.map(|f| f.price),
        close_date: close.and_then(Fill::event_time),
        pnl_per_contract,
        pnl_total,
        closed: close.is_some(),
    }
}

/// Aggregate matched legs into the trade's money-flow summary.
#[must_use]
pub fn summarize(legs: &[LegDetail]) -> TradeSummary {
    let contract = Decimal::from(CONTRACT_MULTIPLIER);

    let mut opening_credit = Decimal::ZERO;
    let mut closing_debit = Decimal::ZERO;
    let mut closed_legs = 0usize;

    for leg in legs {
        let open_premium = leg.open_price * Decimal::from(leg.quantity) * contract;
        match leg.open_action {
            FillSide::Sell => opening_credit += open_premium,
            FillSide::Buy => opening_credit -= open_premium,
        }

        if let (Some(close_action), Some(close_price)) = (leg.close_action, leg.close_price) {
            closed_legs += 1;
            let close_premium = close_price * Decimal::from(leg.quantity) * contract;
            match close_action {
                FillSide::Buy => closing_debit += close_premium,
                FillSide::Sell => closing_debit -= close_premium,
            }
        }
    }

    let direction = if opening_credit > Decimal::ZERO {
        LegDirection::Short
    } else {
        LegDirection::Long
    };

    TradeSummary {
        opening_credit,
        closing_debit,
        net_pnl: opening_credit - closing_debit,
        leg_count: legs.len(),
        closed_legs,
        open_legs: legs.len() - closed_legs,
        direction,
    }
}

/// Derive the trade status from its matched legs.
#[must_use]
pub fn derive_status(legs: &[LegDetail]) -> TradeStatus {
    let closed = legs.iter().filter(|l| l.closed).count();
    if legs.is_empty() || closed == 0 {
        TradeStatus::Open
    } else if closed == legs.len() {
        TradeStatus::Closed
    } else {
        TradeStatus::Partial
    }
}
