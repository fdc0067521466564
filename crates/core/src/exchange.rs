//! Exchange capability interface consumed by the core (spec §4.13, §6).
//!
//! This module defines the *interface* the engine programs against, plus an
//! in-memory [`MockExchangeClient`] for tests and demos. Concrete
//! HTTP/WebSocket transports, authentication, and venue-specific wire
//! formats are external collaborators, not part of this crate.

use crate::errors::CoreError;
use crate::orderbook::BookSide;
use crate::types::{Exchange, OrderResult, Side, Trade, UnifiedMarket};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

/// One order-book update pushed by a [`ExchangeClient::subscribe_book`]
/// stream: either a full reset or an incremental level change.
#[derive(Debug, Clone)]
pub enum BookEvent {
    Snapshot {
        bids: Vec<(Decimal, Decimal)>,
        asks: Vec<(Decimal, Decimal)>,
        seq: u64,
    },
    Delta {
        side: BookSide,
        price: Decimal,
        new_size: Decimal,
        seq: u64,
    },
}

/// Capability set the core needs from a trading venue. A long-lived
/// subscription is modeled as a channel receiver rather than a callback
/// pair: idiomatic Rust favors streams over callback registration, and it
/// lets the engine `select!` across many tokens without boxing closures.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    fn exchange(&self) -> Exchange;

    /// Bounded by the rate limiter's `normal` class.
    async fn list_markets(&self) -> Result<Vec<UnifiedMarket>, CoreError>;

    /// Returns a receiver fed with snapshots and deltas for `token_id` until
    /// dropped. Reconnects internally on drop with exponential backoff.
    async fn subscribe_book(&self, token_id: &str) -> Result<mpsc::Receiver<BookEvent>, CoreError>;

    /// Places a fill-or-kill order. Bounded by the rate limiter's `critical`
    /// class (never dropped).
    async fn place_order(
        &self,
        token_id: &str,
        side: Side,
        price: Decimal,
        size: Decimal,
    ) -> Result<OrderResult, CoreError>;

    async fn get_balance(&self, currency: &str) -> Result<Decimal, CoreError>;
}

/// Persists executed trades. Implementations must be idempotent on
/// `(exchange, venue_order_id)`.
#[async_trait]
pub trait TradeSink: Send + Sync {
    async fn record(&self, trade: Trade) -> Result<(), CoreError>;
}

/// In-memory [`ExchangeClient`] used by tests and the `arb scan` demo path.
/// Orders always fill at the requested price unless `fail_next` has been
/// set, to let tests exercise the rejection and timeout paths deterministically.
pub struct MockExchangeClient {
    exchange: Exchange,
    markets: Vec<UnifiedMarket>,
    balance: Mutex<HashMap<String, Decimal>>,
    next_order_result: Mutex<Option<OrderResult>>,
    fee_rate: Decimal,
    order_count: AtomicU64,
}

impl MockExchangeClient {
    #[must_use]
    pub fn new(exchange: Exchange, markets: Vec<UnifiedMarket>, fee_rate: Decimal) -> Self {
        Self {
            exchange,
            markets,
            balance: Mutex::new(HashMap::new()),
            next_order_result: Mutex::new(None),
            fee_rate,
            order_count: AtomicU64::new(0),
        }
    }

    pub async fn set_balance(&self, currency: &str, amount: Decimal) {
        self.balance.lock().await.insert(currency.to_string(), amount);
    }

    /// Forces the next `place_order` call to return `result` instead of a
    /// synthetic fill.
    pub async fn force_next_result(&self, result: OrderResult) {
        *self.next_order_result.lock().await = Some(result);
    }

    #[must_use]
    pub fn order_count(&self) -> u64 {
        self.order_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ExchangeClient for MockExchangeClient {
    fn exchange(&self) -> Exchange {
        self.exchange
    }

    async fn list_markets(&self) -> Result<Vec<UnifiedMarket>, CoreError> {
        Ok(self.markets.clone())
    }

    async fn subscribe_book(&self, _token_id: &str) -> Result<mpsc::Receiver<BookEvent>, CoreError> {
        let (_tx, rx) = mpsc::channel(16);
        Ok(rx)
    }

    async fn place_order(
        &self,
        _token_id: &str,
        _side: Side,
        price: Decimal,
        size: Decimal,
    ) -> Result<OrderResult, CoreError> {
        self.order_count.fetch_add(1, Ordering::Relaxed);
        if let Some(forced) = self.next_order_result.lock().await.take() {
            return Ok(forced);
        }
        let fee = price * size * self.fee_rate;
        Ok(OrderResult::Filled { price, size, fee })
    }

    async fn get_balance(&self, currency: &str) -> Result<Decimal, CoreError> {
        Ok(self
            .balance
            .lock()
            .await
            .get(currency)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }
}

/// In-memory [`TradeSink`] that deduplicates on `(exchange, venue_order_id)`
/// where `venue_order_id` is synthesized from the trade's timestamp and
/// token, since the mock exchange doesn't assign real order ids.
#[derive(Default)]
pub struct InMemoryTradeSink {
    trades: Arc<Mutex<Vec<Trade>>>,
}

impl InMemoryTradeSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Trade> {
        self.trades.lock().await.clone()
    }
}

#[async_trait]
impl TradeSink for InMemoryTradeSink {
    async fn record(&self, trade: Trade) -> Result<(), CoreError> {
        let mut trades = self.trades.lock().await;
        let duplicate = trades
            .iter()
            .any(|t| t.exchange == trade.exchange && t.ts == trade.ts && t.token_id == trade.token_id);
        if !duplicate {
            trades.push(trade);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn market() -> UnifiedMarket {
        UnifiedMarket {
            exchange: Exchange::Kalshi,
            market_id: "m1".to_string(),
            title: "will it rain".to_string(),
            close_time: Utc::now(),
            yes_token_id: "yes".to_string(),
            no_token_id: "no".to_string(),
        }
    }

    #[tokio::test]
    async fn mock_fills_orders_by_default() {
        let client = MockExchangeClient::new(Exchange::Kalshi, vec![market()], dec!(0.01));
        let result = client
            .place_order("yes", Side::Yes, dec!(0.5), dec!(10))
            .await
            .unwrap();
        assert!(result.is_filled());
        assert_eq!(client.order_count(), 1);
    }

    #[tokio::test]
    async fn forced_result_overrides_the_next_fill_only() {
        let client = MockExchangeClient::new(Exchange::Kalshi, vec![market()], dec!(0.01));
        client
            .force_next_result(OrderResult::Rejected {
                reason: "insufficient liquidity".to_string(),
            })
            .await;
        let first = client.place_order("yes", Side::Yes, dec!(0.5), dec!(10)).await.unwrap();
        assert!(!first.is_filled());
        let second = client.place_order("yes", Side::Yes, dec!(0.5), dec!(10)).await.unwrap();
        assert!(second.is_filled());
    }

    #[tokio::test]
    async fn trade_sink_dedupes_identical_trades() {
        let sink = InMemoryTradeSink::new();
        let trade = Trade {
            ts: Utc::now(),
            market_id: "m1".to_string(),
            token_id: "yes".to_string(),
            side: Side::Yes,
            price: dec!(0.5),
            size: dec!(10),
            fee: dec!(0.05),
            exchange: Exchange::Kalshi,
        };
        sink.record(trade.clone()).await.unwrap();
        sink.record(trade).await.unwrap();
        assert_eq!(sink.all().await.len(), 1);
    }
}
