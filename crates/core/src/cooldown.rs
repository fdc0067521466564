//! Per-market cooldown tracking (spec §4.5).

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Minimum time between execution attempts on the same market.
pub const COOLDOWN_SECONDS: i64 = 30;

/// Tracks `last_trade_at` per market and gates new attempts against
/// [`COOLDOWN_SECONDS`].
#[derive(Default)]
pub struct CooldownManager {
    last_trade_at: RwLock<HashMap<String, DateTime<Utc>>>,
    cooldown: Duration,
}

impl CooldownManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_trade_at: RwLock::new(HashMap::new()),
            cooldown: Duration::seconds(COOLDOWN_SECONDS),
        }
    }

    #[must_use]
    pub fn with_cooldown(cooldown: Duration) -> Self {
        Self {
            last_trade_at: RwLock::new(HashMap::new()),
            cooldown,
        }
    }

    /// `true` iff no trade has been recorded for `market_id`, or enough time
    /// has passed since the last one.
    #[must_use]
    pub fn can_trade(&self, market_id: &str, now: DateTime<Utc>) -> bool {
        match self.last_trade_at.read().get(market_id) {
            None => true,
            Some(last) => now - *last >= self.cooldown,
        }
    }

    /// Must be called immediately after an execution attempt, successful or
    /// not: the cooldown applies to attempts, not just fills.
    pub fn record(&self, market_id: &str, now: DateTime<Utc>) {
        self.last_trade_at
            .write()
            .insert(market_id.to_string(), now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecorded_market_can_trade_immediately() {
        let mgr = CooldownManager::new();
        assert!(mgr.can_trade("m1", Utc::now()));
    }

    #[test]
    fn recorded_market_is_blocked_until_cooldown_elapses() {
        let mgr = CooldownManager::with_cooldown(Duration::seconds(30));
        let t0 = Utc::now();
        mgr.record("m1", t0);
        assert!(!mgr.can_trade("m1", t0 + Duration::seconds(10)));
        assert!(mgr.can_trade("m1", t0 + Duration::seconds(31)));
    }

    #[test]
    fn cooldown_is_per_market() {
        let mgr = CooldownManager::with_cooldown(Duration::seconds(30));
        let t0 = Utc::now();
        mgr.record("m1", t0);
        assert!(mgr.can_trade("m2", t0));
    }
}
