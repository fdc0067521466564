use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two complementary outcome tokens of a binary market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl Side {
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yes => write!(f, "YES"),
            Self::No => write!(f, "NO"),
        }
    }
}

/// Concrete venue a market or trade originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    Kalshi,
    Polymarket,
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kalshi => write!(f, "kalshi"),
            Self::Polymarket => write!(f, "polymarket"),
        }
    }
}

/// One outcome token of a market: its own book identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeToken {
    pub token_id: String,
    pub side: Side,
}

/// A single binary-outcome market on one exchange.
///
/// Invariant: exactly two outcome tokens (YES, NO); their prices must stay in
/// `[0, 1]` and sum to 1 at resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub market_id: String,
    pub exchange: Exchange,
    pub title: String,
    pub close_time: DateTime<Utc>,
    pub volume: Decimal,
    pub yes_token: OutcomeToken,
    pub no_token: OutcomeToken,
}

impl Market {
    #[must_use]
    pub fn token(&self, side: Side) -> &OutcomeToken {
        match side {
            Side::Yes => &self.yes_token,
            Side::No => &self.no_token,
        }
    }
}

/// Venue-agnostic market projection used by the cross-platform matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedMarket {
    pub exchange: Exchange,
    pub market_id: String,
    pub title: String,
    pub close_time: DateTime<Utc>,
    pub yes_token_id: String,
    pub no_token_id: String,
}

/// Venue-agnostic order book snapshot used by the cross-platform matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedOrderBook {
    pub exchange: Exchange,
    pub token_id: String,
    pub best_bid: Option<(Decimal, Decimal)>,
    pub best_ask: Option<(Decimal, Decimal)>,
}

/// A pairing of two markets on distinct venues believed to settle on the same
/// underlying event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPair {
    pub market_a: UnifiedMarket,
    pub market_b: UnifiedMarket,
    pub similarity: f64,
}

impl MarketPair {
    /// `true` when similarity clears the matcher's threshold and the two
    /// markets close within 24h of each other.
    #[must_use]
    pub fn is_tradeable(&self, min_similarity: f64) -> bool {
        if self.similarity < min_similarity {
            return false;
        }
        let diff = (self.market_a.close_time - self.market_b.close_time)
            .num_seconds()
            .abs();
        diff <= 24 * 3600
    }
}

/// A detected arbitrage opportunity: the book state it was detected from,
/// the sizing/cost/profit that sizing implied, and the quality score of the
/// underlying market at the time (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opportunity {
    pub market_id: String,
    pub yes_ask_levels: Vec<(Decimal, Decimal)>,
    pub no_ask_levels: Vec<(Decimal, Decimal)>,
    pub shares: Decimal,
    pub gross_cost: Decimal,
    pub fees: Decimal,
    pub net_profit: Decimal,
    pub roi: Decimal,
    pub score: Decimal,
    pub observed_at: DateTime<Utc>,
}

/// Outcome of a single `place_order` call against an `ExchangeClient`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderResult {
    Filled {
        price: Decimal,
        size: Decimal,
        fee: Decimal,
    },
    Rejected {
        reason: String,
    },
    Timeout,
}

impl OrderResult {
    #[must_use]
    pub const fn is_filled(&self) -> bool {
        matches!(self, Self::Filled { .. })
    }
}

/// Immutable record of one executed leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub ts: DateTime<Utc>,
    pub market_id: String,
    pub token_id: String,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub fee: Decimal,
    pub exchange: Exchange,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn market(exchange: Exchange, title: &str, close_offset_hours: i64) -> UnifiedMarket {
        UnifiedMarket {
            exchange,
            market_id: format!("{exchange}-{title}"),
            title: title.to_string(),
            close_time: Utc::now() + Duration::hours(close_offset_hours),
            yes_token_id: "yes".to_string(),
            no_token_id: "no".to_string(),
        }
    }

    #[test]
    fn side_opposite_roundtrips() {
        assert_eq!(Side::Yes.opposite(), Side::No);
        assert_eq!(Side::No.opposite(), Side::Yes);
    }

    #[test]
    fn market_pair_requires_similarity_and_time_window() {
        let a = market(Exchange::Kalshi, "will-x-win", 10);
        let b = market(Exchange::Polymarket, "x-to-win", 12);
        let pair = MarketPair {
            market_a: a,
            market_b: b,
            similarity: 0.83,
        };
        assert!(pair.is_tradeable(0.80));
        assert!(!pair.is_tradeable(0.90));
    }

    #[test]
    fn market_pair_rejects_far_apart_settlement() {
        let a = market(Exchange::Kalshi, "will-x-win", 1);
        let b = market(Exchange::Polymarket, "x-to-win", 48);
        let pair = MarketPair {
            market_a: a,
            market_b: b,
            similarity: 0.95,
        };
        assert!(!pair.is_tradeable(0.80));
    }
}
