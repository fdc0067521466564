use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

/// Error taxonomy for the arbitrage core (spec §7).
///
/// Each variant carries the class-specific payload plus the common
/// `(market_id, timestamp)` context. Only [`CoreError::Unrecoverable`] is
/// meant to propagate out of the engine's run loop; every other class is
/// caught, logged, turned into an [`crate::events::ArbitrageEvent`], and the
/// loop continues.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Transient network failure: WebSocket disconnect, HTTP 5xx, timeout on
    /// a non-order call. Handled by reconnect/retry with backoff.
    #[error("transient network error for market {market_id:?} at {timestamp}: {message}")]
    Transient {
        market_id: Option<String>,
        timestamp: DateTime<Utc>,
        message: String,
    },

    /// HTTP 429 / exchange-side rate limiting. Handled by class-specific
    /// backoff (see [`crate::rate_limiter`]).
    #[error("rate limited for market {market_id:?} at {timestamp}: {message}")]
    RateLimited {
        market_id: Option<String>,
        timestamp: DateTime<Utc>,
        message: String,
    },

    /// A crossed book or sequence gap was observed. Handled by resubscribing
    /// for a fresh snapshot.
    #[error("book invariant violated for market {market_id:?} at {timestamp}: {message}")]
    BookInvariantViolated {
        market_id: Option<String>,
        timestamp: DateTime<Utc>,
        message: String,
    },

    /// Effective price moved adversely between detection and execution, or
    /// the profitability inequality no longer holds. Aborts this
    /// opportunity only.
    #[error("slippage exceeded for market {market_id:?} at {timestamp}: {message}")]
    SlippageExceeded {
        market_id: Option<String>,
        timestamp: DateTime<Utc>,
        message: String,
    },

    /// One leg of a two-leg execution filled and the other did not; a
    /// defensive unwind was attempted. Logged as an incident, not fatal.
    #[error("partial fill unwound for market {market_id:?} at {timestamp}: {message}")]
    PartialFillUnwound {
        market_id: Option<String>,
        timestamp: DateTime<Utc>,
        message: String,
    },

    /// The risk manager has halted new entries. Exits remain enabled.
    #[error("risk halted at {timestamp}: {message}")]
    RiskHalted {
        market_id: Option<String>,
        timestamp: DateTime<Utc>,
        message: String,
    },

    /// Authentication rejected, configuration invalid, or any other failure
    /// that cannot be recovered from in place. Propagates to shutdown.
    #[error("unrecoverable error at {timestamp}: {message}")]
    Unrecoverable {
        market_id: Option<String>,
        timestamp: DateTime<Utc>,
        message: String,
    },
}

impl CoreError {
    #[must_use]
    pub fn market_id(&self) -> Option<&str> {
        match self {
            Self::Transient { market_id, .. }
            | Self::RateLimited { market_id, .. }
            | Self::BookInvariantViolated { market_id, .. }
            | Self::SlippageExceeded { market_id, .. }
            | Self::PartialFillUnwound { market_id, .. }
            | Self::RiskHalted { market_id, .. }
            | Self::Unrecoverable { market_id, .. } => market_id.as_deref(),
        }
    }

    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Unrecoverable { .. })
    }

    #[must_use]
    pub fn slippage(market_id: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::SlippageExceeded {
            market_id: Some(market_id.into()),
            timestamp: Utc::now(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn book_invariant_violated(market_id: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::BookInvariantViolated {
            market_id: Some(market_id.into()),
            timestamp: Utc::now(),
            message: message.to_string(),
        }
    }
}
