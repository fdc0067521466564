//! Per-market non-reentrant execution lock (spec §4.6).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Guards one market's evaluate-and-execute critical section. Acquisition is
/// try-only and never blocks the caller; if already held, the evaluator
/// skips the market for this tick.
#[derive(Default)]
pub struct ExecutionLock {
    held: Mutex<HashMap<String, ()>>,
}

/// RAII guard releasing the lock for `market_id` on drop, including on the
/// unwind path of a panic.
pub struct ExecutionGuard<'a> {
    lock: &'a ExecutionLock,
    market_id: String,
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        self.lock.held.lock().remove(&self.market_id);
    }
}

impl ExecutionLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to acquire the lock for `market_id`. Returns `None` if
    /// already held; the caller should skip this market silently.
    #[must_use]
    pub fn try_acquire(&self, market_id: &str) -> Option<ExecutionGuard<'_>> {
        let mut held = self.held.lock();
        if held.contains_key(market_id) {
            return None;
        }
        held.insert(market_id.to_string(), ());
        Some(ExecutionGuard {
            lock: self,
            market_id: market_id.to_string(),
        })
    }

    #[must_use]
    pub fn is_held(&self, market_id: &str) -> bool {
        self.held.lock().contains_key(market_id)
    }
}

/// Shared handle suitable for passing into spawned per-market tasks.
pub type SharedExecutionLock = Arc<ExecutionLock>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_first_guard_lives() {
        let lock = ExecutionLock::new();
        let guard1 = lock.try_acquire("m1");
        assert!(guard1.is_some());
        assert!(lock.try_acquire("m1").is_none());
        drop(guard1);
        assert!(lock.try_acquire("m1").is_some());
    }

    #[test]
    fn different_markets_do_not_contend() {
        let lock = ExecutionLock::new();
        let _g1 = lock.try_acquire("m1").unwrap();
        assert!(lock.try_acquire("m2").is_some());
    }

    #[test]
    fn guard_releases_lock_on_panic_unwind() {
        let lock = Arc::new(ExecutionLock::new());
        let lock2 = lock.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = lock2.try_acquire("m1").unwrap();
            panic!("simulated failure mid-execution");
        }));
        assert!(result.is_err());
        assert!(!lock.is_held("m1"));
    }
}
