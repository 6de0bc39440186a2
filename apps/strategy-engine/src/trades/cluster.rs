//! Clustering order fills into logical trades.
//!
//! Fills are grouped by (underlying, expiry) and scanned in time order;
//! a gap larger than the cluster window starts a new trade. Fills with
//! missing timestamps never break a cluster: they are appended to
//! whichever cluster is current when the scan reaches them.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};

use super::types::Fill;

/// Partition enriched fills into trade clusters.
#[must_use]
pub fn cluster_fills(fills: Vec<Fill>, window: Duration) -> Vec<Vec<Fill>> {
    let mut by_key: BTreeMap<(String, Option<NaiveDate>), Vec<Fill>> = BTreeMap::new();
    for fill in fills {
        let key = (fill.underlying().to_string(), fill.expiry());
        by_key.entry(key).or_default().push(fill);
    }

    let mut clusters = Vec::new();
    for (_, mut group) in by_key {
        // Stable sort; fills without timestamps keep their feed order and
        // sort after timestamped ones so the scan appends them to the
        // cluster that is current when they are reached.
        group.sort_by_key(|f| (f.event_time().is_none(), f.event_time()));

        let mut current: Vec<Fill> = Vec::new();
        let mut last_time = None;

        for fill in group {
            match (fill.event_time(), last_time) {
                (Some(t), Some(prev)) if t - prev > window => {
                    clusters.push(std::mem::take(&mut current));
                    last_time = Some(t);
                }
                (Some(t), _) => last_time = Some(t),
                (None, _) => {}
            }
            current.push(fill);
        }

        if !current.is_empty() {
            clusters.push(current);
        }
    }

    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{FillSide, RawFill};
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;

    fn fill(symbol: &str, submitted_at: Option<&str>) -> Fill {
        let submitted_at = submitted_at.map(|s| s.parse::<DateTime<Utc>>().unwrap());
        Fill::from_raw(RawFill {
            order_id: "o".to_string(),
            symbol: symbol.to_string(),
            side: FillSide::Sell,
            quantity: 1,
            price: dec!(1.00),
            status: "filled".to_string(),
            submitted_at,
            filled_at: None,
            payload: serde_json::Value::Null,
        })
    }

    fn window() -> Duration {
        Duration::minutes(5)
    }

    #[test]
    fn fills_within_window_form_one_cluster() {
        let fills = vec![
            fill("SPY260117C00695000", Some("2026-01-10T14:30:00Z")),
            fill("SPY260117C00700000", Some("2026-01-10T14:31:00Z")),
            fill("SPY260117C00695000", Some("2026-01-10T14:34:00Z")),
        ];
        let clusters = cluster_fills(fills, window());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 3);
    }

    #[test]
    fn gap_beyond_window_splits_clusters() {
        let fills = vec![
            fill("SPY260117C00695000", Some("2026-01-10T14:30:00Z")),
            fill("SPY260117C00695000", Some("2026-01-10T15:00:00Z")),
        ];
        let clusters = cluster_fills(fills, window());
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn different_expiries_never_share_a_cluster() {
        let fills = vec![
            fill("SPY260117C00695000", Some("2026-01-10T14:30:00Z")),
            fill("SPY260220C00695000", Some("2026-01-10T14:30:30Z")),
        ];
        let clusters = cluster_fills(fills, window());
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn missing_timestamps_join_the_current_cluster() {
        let fills = vec![
            fill("SPY260117C00695000", Some("2026-01-10T14:30:00Z")),
            fill("SPY260117C00700000", None),
            fill("SPY260117C00695000", Some("2026-01-10T14:31:00Z")),
        ];
        let clusters = cluster_fills(fills, window());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 3);
    }

    #[test]
    fn out_of_order_fills_are_sorted_before_scanning() {
        let fills = vec![
            fill("SPY260117C00695000", Some("2026-01-10T15:00:00Z")),
            fill("SPY260117C00695000", Some("2026-01-10T14:30:00Z")),
            fill("SPY260117C00695000", Some("2026-01-10T14:31:00Z")),
        ];
        let clusters = cluster_fills(fills, window());
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].len(), 2);
        assert_eq!(clusters[1].len(), 1);
    }

    #[test]
    fn unparseable_symbols_cluster_by_raw_symbol() {
        let fills = vec![
            fill("mystery", Some("2026-01-10T14:30:00Z")),
            fill("mystery", Some("2026-01-10T14:31:00Z")),
        ];
        let clusters = cluster_fills(fills, window());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 2);
    }
}
