//! Sliding-window rate limiter with priority-class backoff (spec §4.7).
//!
//! The teacher's `ClobRateLimiter` wraps a `governor` token bucket, which
//! models a steady admission rate well but doesn't expose the three
//! distinct on-refusal behaviors (block / backoff / drop) a priority class
//! needs here, so this tracks an explicit per-key timestamp window instead.

use crate::errors::CoreError;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// How the caller should behave when the window is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Order placement: never dropped, blocks (waits) for admission instead.
    Critical,
    /// Market data fetch: backs off with jittered exponential delay.
    Normal,
    /// Metadata polling: dropped outright on refusal.
    Background,
}

const MIN_BACKOFF: Duration = Duration::from_secs(5);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Sliding-window admission config for one `(exchange, endpoint_class)` key.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    pub max_requests: usize,
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(1),
        }
    }
}

impl RateLimiterConfig {
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            max_requests: 30,
            window: Duration::from_secs(1),
        }
    }
}

struct Window {
    timestamps: VecDeque<std::time::Instant>,
    attempt: u32,
}

impl Window {
    fn new() -> Self {
        Self {
            timestamps: VecDeque::new(),
            attempt: 0,
        }
    }
}

/// Tracks admission windows per `(exchange, endpoint_class)` string key.
/// `try_admit` is the single entry point; its return value tells the caller
/// how to react given the request's [`Priority`].
pub struct RateLimiter {
    config: RateLimiterConfig,
    windows: Mutex<HashMap<String, Window>>,
}

/// What the caller must do after a refused admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    /// Caller must wait and retry; never give up.
    Block,
    /// Caller should sleep for this long (jittered exponential) then retry.
    Backoff(Duration),
    /// Caller should drop the request.
    Drop,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Attempts to admit one request for `key`. `Ok(())` means proceed;
    /// `Err(refusal)`'s variant depends on `priority`.
    ///
    /// # Errors
    ///
    /// Returns a [`Refusal`] describing how the caller should react when the
    /// window is full.
    pub fn try_admit(&self, key: &str, priority: Priority) -> Result<(), Refusal> {
        let now = std::time::Instant::now();
        let mut windows = self.windows.lock();
        let window = windows.entry(key.to_string()).or_insert_with(Window::new);

        while let Some(front) = window.timestamps.front() {
            if now.duration_since(*front) > self.config.window {
                window.timestamps.pop_front();
            } else {
                break;
            }
        }

        if window.timestamps.len() < self.config.max_requests {
            window.timestamps.push_back(now);
            window.attempt = 0;
            return Ok(());
        }

        let refusal = match priority {
            Priority::Critical => Refusal::Block,
            Priority::Normal => {
                let delay = backoff_delay(window.attempt);
                window.attempt = window.attempt.saturating_add(1);
                Refusal::Backoff(delay)
            }
            Priority::Background => Refusal::Drop,
        };
        Err(refusal)
    }

    /// Converts a [`Refusal`] into a [`CoreError`] for the cases where the
    /// caller chooses to surface it rather than act on it directly.
    #[must_use]
    pub fn refusal_error(market_id: Option<&str>, refusal: Refusal) -> CoreError {
        CoreError::RateLimited {
            market_id: market_id.map(str::to_string),
            timestamp: chrono::Utc::now(),
            message: format!("{refusal:?}"),
        }
    }
}

/// Exponential backoff with full jitter, doubling from [`MIN_BACKOFF`] and
/// capped at [`MAX_BACKOFF`].
fn backoff_delay(attempt: u32) -> Duration {
    let exp = MIN_BACKOFF
        .saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
        .min(MAX_BACKOFF);
    let jitter_ms = (exp.as_millis() as u64).saturating_mul(u64::from(pseudo_jitter())) / 100;
    Duration::from_millis(jitter_ms).min(exp).max(MIN_BACKOFF.min(exp))
}

/// Deterministic stand-in for jitter sourced from the current instant's
/// sub-millisecond component, since this module has no RNG dependency.
fn pseudo_jitter() -> u8 {
    let nanos = std::time::Instant::now().elapsed().subsec_nanos();
    (nanos % 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_max_requests_then_refuses() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_requests: 2,
            window: Duration::from_secs(60),
        });
        assert!(limiter.try_admit("k", Priority::Normal).is_ok());
        assert!(limiter.try_admit("k", Priority::Normal).is_ok());
        assert!(limiter.try_admit("k", Priority::Normal).is_err());
    }

    #[test]
    fn critical_priority_blocks_instead_of_dropping() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_requests: 1,
            window: Duration::from_secs(60),
        });
        limiter.try_admit("k", Priority::Critical).unwrap();
        let refusal = limiter.try_admit("k", Priority::Critical).unwrap_err();
        assert_eq!(refusal, Refusal::Block);
    }

    #[test]
    fn background_priority_drops_on_refusal() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_requests: 1,
            window: Duration::from_secs(60),
        });
        limiter.try_admit("k", Priority::Background).unwrap();
        let refusal = limiter.try_admit("k", Priority::Background).unwrap_err();
        assert_eq!(refusal, Refusal::Drop);
    }

    #[test]
    fn normal_priority_backs_off_within_bounds() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_requests: 1,
            window: Duration::from_secs(60),
        });
        limiter.try_admit("k", Priority::Normal).unwrap();
        let refusal = limiter.try_admit("k", Priority::Normal).unwrap_err();
        match refusal {
            Refusal::Backoff(d) => {
                assert!(d >= MIN_BACKOFF);
                assert!(d <= MAX_BACKOFF);
            }
            other => panic!("expected backoff, got {other:?}"),
        }
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_requests: 1,
            window: Duration::from_secs(60),
        });
        limiter.try_admit("kalshi:orders", Priority::Normal).unwrap();
        assert!(limiter.try_admit("polymarket:orders", Priority::Normal).is_ok());
    }
}
