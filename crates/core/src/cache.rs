//! Opportunity cache with ROI hysteresis (spec §4.4).

use crate::types::Opportunity;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

/// An existing entry is replaced only when the candidate beats it by this
/// ratio, or the existing entry has aged past `REPLACE_AGE`.
const HYSTERESIS_FACTOR: Decimal = dec!(1.05);
const REPLACE_AGE: Duration = Duration::seconds(2);
/// Opportunities are purged once their observation is older than this, as a
/// proxy for "the underlying book has gone stale".
const STALE_HORIZON: Duration = Duration::seconds(10);

struct Entry {
    opportunity: Opportunity,
    inserted_at: DateTime<Utc>,
}

/// Maps `market_id -> best known [`Opportunity`]`, guarded by a single
/// exclusive lock per spec §5's "Opportunity Cache uses a single exclusive
/// lock" resource rule.
#[derive(Default)]
pub struct OpportunityCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl OpportunityCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `o`, replacing any existing entry for the same market only if
    /// `o.roi > existing.roi * 1.05` or the existing entry is stale by age.
    pub fn insert(&self, o: Opportunity) {
        let mut entries = self.entries.write();
        let now = Utc::now();
        let should_replace = match entries.get(&o.market_id) {
            None => true,
            Some(existing) => {
                o.roi > existing.opportunity.roi * HYSTERESIS_FACTOR
                    || now - existing.inserted_at > REPLACE_AGE
            }
        };
        if should_replace {
            entries.insert(
                o.market_id.clone(),
                Entry {
                    opportunity: o,
                    inserted_at: now,
                },
            );
        }
    }

    /// Removes any entry whose observation predates [`STALE_HORIZON`].
    pub fn purge_stale(&self) {
        let now = Utc::now();
        self.entries
            .write()
            .retain(|_, entry| now - entry.opportunity.observed_at <= STALE_HORIZON);
    }

    /// The `k` highest-ROI opportunities, descending.
    #[must_use]
    pub fn top_k(&self, k: usize) -> Vec<Opportunity> {
        let entries = self.entries.read();
        let mut all: Vec<&Opportunity> = entries.values().map(|e| &e.opportunity).collect();
        all.sort_by(|a, b| b.roi.cmp(&a.roi));
        all.into_iter().take(k).cloned().collect()
    }

    #[must_use]
    pub fn get(&self, market_id: &str) -> Option<Opportunity> {
        self.entries
            .read()
            .get(market_id)
            .map(|e| e.opportunity.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opp(market_id: &str, roi: Decimal, observed_at: DateTime<Utc>) -> Opportunity {
        Opportunity {
            market_id: market_id.to_string(),
            yes_ask_levels: vec![],
            no_ask_levels: vec![],
            shares: dec!(10),
            gross_cost: dec!(5),
            fees: dec!(0.1),
            net_profit: dec!(0.5),
            roi,
            score: dec!(70),
            observed_at,
        }
    }

    #[test]
    fn insert_replaces_when_beating_hysteresis() {
        let cache = OpportunityCache::new();
        cache.insert(opp("m1", dec!(0.03), Utc::now()));
        cache.insert(opp("m1", dec!(0.031), Utc::now()));
        // 0.031 / 0.03 ~= 1.033, below the 1.05 hysteresis factor: not replaced
        assert_eq!(cache.get("m1").unwrap().roi, dec!(0.03));

        cache.insert(opp("m1", dec!(0.04), Utc::now()));
        assert_eq!(cache.get("m1").unwrap().roi, dec!(0.04));
    }

    #[test]
    fn insert_replaces_stale_entry_regardless_of_roi() {
        let cache = OpportunityCache::new();
        let old_ts = Utc::now() - Duration::seconds(5);
        cache.insert(opp("m1", dec!(0.05), old_ts));
        cache.insert(opp("m1", dec!(0.01), Utc::now()));
        assert_eq!(cache.get("m1").unwrap().roi, dec!(0.01));
    }

    #[test]
    fn top_k_sorts_descending_by_roi_and_respects_k() {
        let cache = OpportunityCache::new();
        cache.insert(opp("m1", dec!(0.02), Utc::now()));
        cache.insert(opp("m2", dec!(0.05), Utc::now()));
        cache.insert(opp("m3", dec!(0.03), Utc::now()));

        let top = cache.top_k(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].market_id, "m2");
        assert_eq!(top[1].market_id, "m3");
    }

    #[test]
    fn purge_stale_drops_old_observations() {
        let cache = OpportunityCache::new();
        let old_ts = Utc::now() - Duration::seconds(11);
        cache.insert(opp("m1", dec!(0.02), old_ts));
        cache.insert(opp("m2", dec!(0.02), Utc::now()));
        cache.purge_stale();
        assert_eq!(cache.len(), 1);
        assert!(cache.get("m2").is_some());
    }
}
