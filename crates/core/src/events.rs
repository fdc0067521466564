use crate::types::{Exchange, OrderResult, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// The typed events the core publishes to its hub (spec §6, §9).
///
/// Components never hold back-pointers to each other; instead they publish
/// events here and the engine subscribes to the ones it cares about
/// (`RiskHalted`, exit signals), which resolves the engine/risk/position
/// cyclic-reference otherwise implied by the data model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ArbitrageEvent {
    OpportunityDetected {
        market_id: String,
        net_edge: Decimal,
        shares: Decimal,
        observed_at: DateTime<Utc>,
    },
    TradeExecuted {
        market_id: String,
        shares: Decimal,
        realized_profit: Decimal,
        executed_at: DateTime<Utc>,
    },
    PartialFillUnwound {
        market_id: String,
        filled_side: Side,
        unwind_loss: Decimal,
        at: DateTime<Utc>,
    },
    SlippageExceeded {
        market_id: String,
        at: DateTime<Utc>,
    },
    FillRejected {
        market_id: String,
        yes_result: OrderResultSummary,
        no_result: OrderResultSummary,
        at: DateTime<Utc>,
    },
    RiskHalted {
        daily_pnl: Decimal,
        at: DateTime<Utc>,
    },
    PositionOpened {
        market_id: String,
        shares: Decimal,
        at: DateTime<Utc>,
    },
    PositionClosed {
        market_id: String,
        realized_pnl: Decimal,
        at: DateTime<Utc>,
    },
    BookReset {
        market_id: String,
        exchange: Exchange,
        at: DateTime<Utc>,
    },
}

/// A serializable summary of an [`OrderResult`] for embedding in events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderResultSummary {
    Filled,
    Rejected(String),
    Timeout,
}

impl From<&OrderResult> for OrderResultSummary {
    fn from(r: &OrderResult) -> Self {
        match r {
            OrderResult::Filled { .. } => Self::Filled,
            OrderResult::Rejected { reason } => Self::Rejected(reason.clone()),
            OrderResult::Timeout => Self::Timeout,
        }
    }
}

/// Shared event hub. Cheaply cloneable; every subscriber gets its own
/// receiver over a bounded broadcast channel so a slow consumer cannot stall
/// publishers.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<ArbitrageEvent>,
}

impl EventHub {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ArbitrageEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event to every current subscriber and emits a matching
    /// `tracing` record. Never fails: if there are no subscribers the event
    /// is simply dropped.
    pub fn publish(&self, event: ArbitrageEvent) {
        tracing::info!(?event, "arbitrage event");
        let _ = self.tx.send(event);
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let hub = EventHub::new(16);
        let mut rx = hub.subscribe();

        hub.publish(ArbitrageEvent::RiskHalted {
            daily_pnl: dec!(-50),
            at: Utc::now(),
        });

        let received = rx.recv().await.unwrap();
        match received {
            ArbitrageEvent::RiskHalted { daily_pnl, .. } => assert_eq!(daily_pnl, dec!(-50)),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let hub = EventHub::new(4);
        hub.publish(ArbitrageEvent::BookReset {
            market_id: "m1".to_string(),
            exchange: Exchange::Kalshi,
            at: Utc::now(),
        });
    }
}
