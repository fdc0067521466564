//! Risk manager: daily loss halt and per-position exit signals (spec §4.10).
//!
//! Mirrors the teacher's `CircuitBreaker`: a `parking_lot::RwLock`-guarded
//! state struct with a small, total set of transition methods, rather than a
//! generic pub/sub state machine.

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

pub const DEFAULT_STOP_LOSS: Decimal = dec!(0.05);
pub const DEFAULT_TAKE_PROFIT: Decimal = dec!(0.10);
pub const DEFAULT_MAX_DAILY_LOSS: Decimal = dec!(50);

/// Why a position should be exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitSignal {
    None,
    StopLoss,
    TakeProfit,
    Manual,
}

/// Rolling daily totals and per-position high-water marks (spec §3).
#[derive(Debug, Clone)]
pub struct RiskState {
    pub daily_pnl: Decimal,
    pub daily_trade_count: u64,
    pub daily_date: NaiveDate,
    high_water_marks: HashMap<String, Decimal>,
}

impl RiskState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            daily_pnl: Decimal::ZERO,
            daily_trade_count: 0,
            daily_date: Utc::now().date_naive(),
            high_water_marks: HashMap::new(),
        }
    }

    fn roll_day_if_needed(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.daily_date {
            self.daily_date = today;
            self.daily_pnl = Decimal::ZERO;
            self.daily_trade_count = 0;
            self.high_water_marks.clear();
        }
    }
}

impl Default for RiskState {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper serializing all `RiskState` transitions through a
/// single writer lock, per spec §5's single-writer guarantee for `halted`
/// observations.
pub struct RiskManager {
    state: RwLock<RiskState>,
    stop_loss: Decimal,
    take_profit: Decimal,
    max_daily_loss: Decimal,
}

impl RiskManager {
    #[must_use]
    pub fn new(stop_loss: Decimal, take_profit: Decimal, max_daily_loss: Decimal) -> Self {
        Self {
            state: RwLock::new(RiskState::new()),
            stop_loss,
            take_profit,
            max_daily_loss,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> RiskState {
        self.state.read().clone()
    }

    /// Records a closed trade's realized P&L, rolling the day over first if
    /// the local date has advanced.
    pub fn record_trade(&self, realized_pnl: Decimal, now: DateTime<Utc>) {
        let mut state = self.state.write();
        state.roll_day_if_needed(now);
        state.daily_pnl += realized_pnl;
        state.daily_trade_count += 1;
    }

    /// `true` once `daily_pnl <= -max_daily_loss`; persists until local
    /// midnight rollover clears it.
    #[must_use]
    pub fn halted(&self, now: DateTime<Utc>) -> bool {
        let mut state = self.state.write();
        state.roll_day_if_needed(now);
        state.daily_pnl <= -self.max_daily_loss
    }

    /// Evaluates a position tick for stop-loss / take-profit against the
    /// unrealized gain/loss ratio (`unrealized_pnl / cost_basis`).
    #[must_use]
    pub fn evaluate_exit(&self, position_id: &str, unrealized_pnl: Decimal, cost_basis: Decimal) -> ExitSignal {
        if cost_basis <= Decimal::ZERO {
            return ExitSignal::None;
        }
        let ratio = unrealized_pnl / cost_basis;

        let mut state = self.state.write();
        let hwm = state
            .high_water_marks
            .entry(position_id.to_string())
            .or_insert(unrealized_pnl);
        if unrealized_pnl > *hwm {
            *hwm = unrealized_pnl;
        }

        if -ratio >= self.stop_loss {
            ExitSignal::StopLoss
        } else if ratio >= self.take_profit {
            ExitSignal::TakeProfit
        } else {
            ExitSignal::None
        }
    }

    pub fn clear_position(&self, position_id: &str) {
        self.state.write().high_water_marks.remove(position_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn halts_once_daily_loss_breached() {
        let risk = RiskManager::new(DEFAULT_STOP_LOSS, DEFAULT_TAKE_PROFIT, dec!(50));
        let now = Utc::now();
        assert!(!risk.halted(now));
        risk.record_trade(dec!(-51), now);
        assert!(risk.halted(now));
    }

    #[test]
    fn halt_persists_until_midnight_rollover() {
        let risk = RiskManager::new(DEFAULT_STOP_LOSS, DEFAULT_TAKE_PROFIT, dec!(50));
        let now = Utc::now();
        risk.record_trade(dec!(-60), now);
        assert!(risk.halted(now));
        assert!(risk.halted(now + Duration::hours(2)));

        let tomorrow = now + Duration::days(1);
        assert!(!risk.halted(tomorrow));
        assert_eq!(risk.snapshot().daily_pnl, Decimal::ZERO);
    }

    #[test]
    fn stop_loss_fires_at_threshold() {
        let risk = RiskManager::new(dec!(0.05), dec!(0.10), dec!(50));
        let signal = risk.evaluate_exit("p1", dec!(-6), dec!(100));
        assert_eq!(signal, ExitSignal::StopLoss);
    }

    #[test]
    fn take_profit_fires_at_threshold() {
        let risk = RiskManager::new(dec!(0.05), dec!(0.10), dec!(50));
        let signal = risk.evaluate_exit("p1", dec!(11), dec!(100));
        assert_eq!(signal, ExitSignal::TakeProfit);
    }

    #[test]
    fn no_signal_inside_thresholds() {
        let risk = RiskManager::new(dec!(0.05), dec!(0.10), dec!(50));
        let signal = risk.evaluate_exit("p1", dec!(2), dec!(100));
        assert_eq!(signal, ExitSignal::None);
    }
}
