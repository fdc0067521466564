//! Open arbitrage positions and the monitor that exits them (spec §3, §4.11).

use crate::events::{ArbitrageEvent, EventHub};
use crate::exchange::ExchangeClient;
use crate::risk::{ExitSignal, RiskManager};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A two-legged arbitrage position. Invariant: `yes_shares == no_shares`; a
/// profitable entry has `yes_avg_price + no_avg_price <= 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub market_id: String,
    pub yes_shares: Decimal,
    pub no_shares: Decimal,
    pub yes_avg_price: Decimal,
    pub no_avg_price: Decimal,
    pub opened_at: DateTime<Utc>,
    pub realized_pnl: Decimal,
}

impl Position {
    #[must_use]
    pub fn open(market_id: impl Into<String>, shares: Decimal, yes_price: Decimal, no_price: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            market_id: market_id.into(),
            yes_shares: shares,
            no_shares: shares,
            yes_avg_price: yes_price,
            no_avg_price: no_price,
            opened_at: now,
            realized_pnl: Decimal::ZERO,
        }
    }

    /// Unrealized P&L given current best bids for both legs.
    #[must_use]
    pub fn unrealized_pnl(&self, best_bid_yes: Decimal, best_bid_no: Decimal) -> Decimal {
        self.yes_shares * (best_bid_yes + best_bid_no - self.yes_avg_price - self.no_avg_price)
    }

    #[must_use]
    pub fn cost_basis(&self) -> Decimal {
        self.yes_shares * (self.yes_avg_price + self.no_avg_price)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.yes_shares <= Decimal::ZERO && self.no_shares <= Decimal::ZERO
    }
}

/// Result of attempting to fully exit a position's residual shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Closed,
    /// Residual shares remain unfilled after the retry window.
    ExitIncomplete,
}

const EXIT_RETRY_WINDOW_SECS: i64 = 30;

/// Owns the open-position set and drives exits in response to
/// [`RiskManager`] signals.
pub struct PositionMonitor {
    positions: RwLock<HashMap<String, Position>>,
    risk: Arc<RiskManager>,
    events: EventHub,
}

impl PositionMonitor {
    #[must_use]
    pub fn new(risk: Arc<RiskManager>, events: EventHub) -> Self {
        Self {
            positions: RwLock::new(HashMap::new()),
            risk,
            events,
        }
    }

    pub async fn open(&self, position: Position) {
        self.positions
            .write()
            .await
            .insert(position.market_id.clone(), position);
    }

    pub async fn get(&self, market_id: &str) -> Option<Position> {
        self.positions.read().await.get(market_id).cloned()
    }

    pub async fn close(&self, market_id: &str) {
        self.positions.write().await.remove(market_id);
        self.risk.clear_position(market_id);
    }

    pub async fn open_market_ids(&self) -> Vec<String> {
        self.positions.read().await.keys().cloned().collect()
    }

    /// One polling tick for `market_id`: reads best bids, computes
    /// unrealized P&L, forwards it to the risk manager, and exits both legs
    /// via `exchange` if a non-`None` exit signal comes back.
    ///
    /// Exits place market SELL orders up to available bid depth; unfilled
    /// residual is retried at a lower limit for up to 30 s before being
    /// reported as [`ExitOutcome::ExitIncomplete`].
    pub async fn tick(
        &self,
        market_id: &str,
        best_bid_yes: Decimal,
        best_bid_no: Decimal,
        exchange: &dyn ExchangeClient,
        yes_token_id: &str,
        no_token_id: &str,
        now: DateTime<Utc>,
    ) -> Option<ExitOutcome> {
        let position = self.get(market_id).await?;
        let unrealized = position.unrealized_pnl(best_bid_yes, best_bid_no);
        let cost_basis = position.cost_basis();

        let signal = self
            .risk
            .evaluate_exit(market_id, unrealized, cost_basis);
        if signal == ExitSignal::None {
            return None;
        }

        Some(
            self.exit_both_legs(
                market_id,
                &position,
                exchange,
                yes_token_id,
                no_token_id,
                best_bid_yes,
                best_bid_no,
                unrealized,
                now,
            )
            .await,
        )
    }

    async fn exit_both_legs(
        &self,
        market_id: &str,
        position: &Position,
        exchange: &dyn ExchangeClient,
        yes_token_id: &str,
        no_token_id: &str,
        best_bid_yes: Decimal,
        best_bid_no: Decimal,
        realized_pnl: Decimal,
        now: DateTime<Utc>,
    ) -> ExitOutcome {
        use crate::types::{OrderResult, Side};

        let legs = [
            (Side::Yes, yes_token_id, position.yes_shares, best_bid_yes),
            (Side::No, no_token_id, position.no_shares, best_bid_no),
        ];

        let mut all_closed = true;
        for (side, token_id, shares, bid) in legs {
            if shares <= Decimal::ZERO {
                continue;
            }
            let mut remaining = shares;
            let mut limit = bid;
            let deadline = now + chrono::Duration::seconds(EXIT_RETRY_WINDOW_SECS);
            let mut attempt_time = now;

            while remaining > Decimal::ZERO && attempt_time < deadline {
                match exchange.place_order(token_id, side, limit, remaining).await {
                    Ok(OrderResult::Filled { size, .. }) => {
                        remaining -= size;
                    }
                    _ => {
                        limit *= Decimal::new(99, 2); // step the limit down 1% and retry
                    }
                }
                attempt_time += chrono::Duration::seconds(1);
            }

            if remaining > Decimal::ZERO {
                all_closed = false;
            }
        }

        if all_closed {
            self.close(market_id).await;
            self.events.publish(ArbitrageEvent::PositionClosed {
                market_id: market_id.to_string(),
                realized_pnl,
                at: now,
            });
            ExitOutcome::Closed
        } else {
            ExitOutcome::ExitIncomplete
        }
    }
}
