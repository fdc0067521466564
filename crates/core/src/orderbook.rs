//! Depth-indexed order book with atomic delta application (spec §3, §4.1).

use crate::errors::CoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Default `walk` depth when the caller doesn't ask for fewer levels.
pub const MAX_ORDER_BOOK_DEPTH: usize = 20;

/// One side (bids or asks) of one token's book.
///
/// Invariant: prices are unique and strictly positive; sizes are
/// non-negative; a size of zero deletes the level.
#[derive(Debug, Clone, Default)]
pub struct OrderBookSide {
    levels: BTreeMap<OrderedPrice, Decimal>,
    descending: bool,
}

/// `Decimal` wrapped so a `BTreeMap` can order bid levels descending and ask
/// levels ascending without a second collection type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OrderedPrice(Decimal, bool);

impl PartialOrd for OrderedPrice {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedPrice {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        if self.1 {
            other.0.cmp(&self.0)
        } else {
            self.0.cmp(&other.0)
        }
    }
}

impl OrderBookSide {
    #[must_use]
    pub fn new(descending: bool) -> Self {
        Self {
            levels: BTreeMap::new(),
            descending,
        }
    }

    fn set(&mut self, price: Decimal, size: Decimal) {
        let key = OrderedPrice(price, self.descending);
        if size <= Decimal::ZERO {
            self.levels.remove(&key);
        } else {
            self.levels.insert(key, size);
        }
    }

    fn clear(&mut self) {
        self.levels.clear();
    }

    /// Best (highest bid / lowest ask) price and size, if any.
    #[must_use]
    pub fn best(&self) -> Option<(Decimal, Decimal)> {
        self.levels.iter().next().map(|(p, s)| (p.0, *s))
    }

    /// Up to `max_levels` `(price, size)` pairs in book order.
    #[must_use]
    pub fn walk(&self, max_levels: usize) -> Vec<(Decimal, Decimal)> {
        self.levels
            .iter()
            .take(max_levels)
            .map(|(p, s)| (p.0, *s))
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Both sides of one token's book plus sequencing metadata (spec §3).
///
/// Invariants: `best_bid < best_ask` (a crossed book is rejected); applied
/// delta sequence numbers are strictly increasing or the delta is dropped.
#[derive(Debug, Clone)]
pub struct OrderBook {
    pub token_id: String,
    bids: OrderBookSide,
    asks: OrderBookSide,
    seq: u64,
    last_update: DateTime<Utc>,
}

impl OrderBook {
    #[must_use]
    pub fn new(token_id: impl Into<String>) -> Self {
        Self {
            token_id: token_id.into(),
            bids: OrderBookSide::new(true),
            asks: OrderBookSide::new(false),
            seq: 0,
            last_update: Utc::now(),
        }
    }

    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    #[must_use]
    pub const fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    /// `true` once the book has not been touched for longer than `max_age`.
    #[must_use]
    pub fn is_stale(&self, max_age: chrono::Duration) -> bool {
        Utc::now() - self.last_update > max_age
    }

    /// Resets both sides to the given levels and sets `seq`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BookInvariantViolated`] if the snapshot is
    /// crossed (`best_bid >= best_ask` with both sides non-empty).
    pub fn apply_snapshot(
        &mut self,
        bids: Vec<(Decimal, Decimal)>,
        asks: Vec<(Decimal, Decimal)>,
        seq: u64,
    ) -> Result<(), CoreError> {
        self.bids.clear();
        self.asks.clear();
        for (p, s) in bids {
            self.bids.set(p, s);
        }
        for (p, s) in asks {
            self.asks.set(p, s);
        }
        self.seq = seq;
        self.last_update = Utc::now();
        self.check_not_crossed()
    }

    /// Applies a single level update if `seq > self.seq`; silently dropped
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BookInvariantViolated`] if applying the delta
    /// would cross the book.
    pub fn apply_delta(
        &mut self,
        side: BookSide,
        price: Decimal,
        new_size: Decimal,
        seq: u64,
    ) -> Result<(), CoreError> {
        if seq <= self.seq {
            return Ok(());
        }
        match side {
            BookSide::Bid => self.bids.set(price, new_size),
            BookSide::Ask => self.asks.set(price, new_size),
        }
        self.seq = seq;
        self.last_update = Utc::now();
        self.check_not_crossed()
    }

    fn check_not_crossed(&self) -> Result<(), CoreError> {
        if let (Some((bid, _)), Some((ask, _))) = (self.bids.best(), self.asks.best()) {
            if bid >= ask {
                return Err(CoreError::book_invariant_violated(
                    self.token_id.clone(),
                    format!("crossed book: bid {bid} >= ask {ask}"),
                ));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn best(&self, side: BookSide) -> Option<(Decimal, Decimal)> {
        match side {
            BookSide::Bid => self.bids.best(),
            BookSide::Ask => self.asks.best(),
        }
    }

    #[must_use]
    pub fn walk(&self, side: BookSide, max_levels: usize) -> Vec<(Decimal, Decimal)> {
        let max_levels = max_levels.min(MAX_ORDER_BOOK_DEPTH);
        match side {
            BookSide::Bid => self.bids.walk(max_levels),
            BookSide::Ask => self.asks.walk(max_levels),
        }
    }
}

/// Which side of an [`OrderBook`] to read or walk. Distinct from
/// [`crate::types::Side`] (YES/NO token) since either token's book has both
/// a bid and an ask side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSide {
    Bid,
    Ask,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn apply_snapshot_resets_and_sets_seq() {
        let mut book = OrderBook::new("tok");
        book.apply_snapshot(vec![(dec!(0.48), dec!(100))], vec![(dec!(0.50), dec!(100))], 5)
            .unwrap();
        assert_eq!(book.seq(), 5);
        assert_eq!(book.best(BookSide::Bid), Some((dec!(0.48), dec!(100))));
        assert_eq!(book.best(BookSide::Ask), Some((dec!(0.50), dec!(100))));
    }

    #[test]
    fn crossed_snapshot_is_rejected() {
        let mut book = OrderBook::new("tok");
        let result =
            book.apply_snapshot(vec![(dec!(0.60), dec!(10))], vec![(dec!(0.50), dec!(10))], 1);
        assert!(result.is_err());
    }

    #[test]
    fn stale_delta_is_dropped_silently() {
        let mut book = OrderBook::new("tok");
        book.apply_snapshot(vec![(dec!(0.48), dec!(100))], vec![(dec!(0.50), dec!(100))], 5)
            .unwrap();
        book.apply_delta(BookSide::Bid, dec!(0.49), dec!(999), 3).unwrap();
        // seq 3 <= 5, delta dropped, bid side unchanged
        assert_eq!(book.best(BookSide::Bid), Some((dec!(0.48), dec!(100))));
        assert_eq!(book.seq(), 5);
    }

    #[test]
    fn higher_seq_delta_applies_and_zero_size_deletes_level() {
        let mut book = OrderBook::new("tok");
        book.apply_snapshot(vec![(dec!(0.48), dec!(100))], vec![(dec!(0.50), dec!(100))], 5)
            .unwrap();
        book.apply_delta(BookSide::Bid, dec!(0.49), dec!(10), 6).unwrap();
        assert_eq!(book.best(BookSide::Bid), Some((dec!(0.49), dec!(10))));

        book.apply_delta(BookSide::Bid, dec!(0.49), Decimal::ZERO, 7)
            .unwrap();
        assert_eq!(book.best(BookSide::Bid), Some((dec!(0.48), dec!(100))));
    }

    #[test]
    fn delta_that_crosses_book_is_rejected() {
        let mut book = OrderBook::new("tok");
        book.apply_snapshot(vec![(dec!(0.48), dec!(100))], vec![(dec!(0.50), dec!(100))], 5)
            .unwrap();
        let result = book.apply_delta(BookSide::Bid, dec!(0.55), dec!(10), 6);
        assert!(result.is_err());
    }

    #[test]
    fn walk_orders_bids_descending_and_asks_ascending() {
        let mut book = OrderBook::new("tok");
        book.apply_snapshot(
            vec![(dec!(0.40), dec!(1)), (dec!(0.48), dec!(1)), (dec!(0.44), dec!(1))],
            vec![(dec!(0.55), dec!(1)), (dec!(0.50), dec!(1)), (dec!(0.52), dec!(1))],
            1,
        )
        .unwrap();

        let bids = book.walk(BookSide::Bid, 10);
        assert_eq!(bids, vec![(dec!(0.48), dec!(1)), (dec!(0.44), dec!(1)), (dec!(0.40), dec!(1))]);

        let asks = book.walk(BookSide::Ask, 10);
        assert_eq!(asks, vec![(dec!(0.50), dec!(1)), (dec!(0.52), dec!(1)), (dec!(0.55), dec!(1))]);
    }

    #[test]
    fn walk_is_capped_at_max_order_book_depth() {
        let mut book = OrderBook::new("tok");
        let asks: Vec<_> = (0..30)
            .map(|i| (dec!(0.01) * Decimal::from(i + 1), dec!(1)))
            .collect();
        book.apply_snapshot(vec![], asks, 1).unwrap();
        assert_eq!(book.walk(BookSide::Ask, 100).len(), MAX_ORDER_BOOK_DEPTH);
    }

    #[test]
    fn is_stale_reports_age_against_last_update() {
        let mut book = OrderBook::new("tok");
        book.apply_snapshot(vec![], vec![], 1).unwrap();
        assert!(!book.is_stale(chrono::Duration::seconds(10)));
        assert!(book.is_stale(chrono::Duration::zero()));
    }
}
