//! Capital allocation sizing (spec §4.8).

use crate::risk::RiskState;
use crate::types::Opportunity;
use chrono::{DateTime, Timelike, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const ROI_MULT_BASELINE: Decimal = dec!(0.02);
const ROI_MULT_MIN: Decimal = dec!(0.5);
const ROI_MULT_MAX: Decimal = dec!(2.0);

const QUALITY_MULT_BASELINE: Decimal = dec!(50);
const QUALITY_MULT_MIN: Decimal = dec!(0.5);
const QUALITY_MULT_MAX: Decimal = dec!(1.5);

const PNL_MULT_FLOOR: Decimal = dec!(0.5);
const PNL_MULT_CEIL: Decimal = dec!(1.0);

const TIME_MULT_PEAK: Decimal = dec!(1.2);
const TIME_MULT_NORMAL: Decimal = dec!(1.0);
const TIME_MULT_LOW: Decimal = dec!(0.6);

/// Buffer kept unallocated, scaling linearly with how much of top-of-book
/// depth the trade would consume.
const BUFFER_MIN: Decimal = dec!(0.02);
const BUFFER_MAX: Decimal = dec!(0.10);
const BUFFER_RAMP_START: Decimal = dec!(0.25);

fn clamp(value: Decimal, min: Decimal, max: Decimal) -> Decimal {
    value.max(min).min(max)
}

fn roi_mult(opportunity: &Opportunity) -> Decimal {
    clamp(opportunity.roi / ROI_MULT_BASELINE, ROI_MULT_MIN, ROI_MULT_MAX)
}

fn quality_mult(opportunity: &Opportunity) -> Decimal {
    clamp(
        opportunity.score / QUALITY_MULT_BASELINE,
        QUALITY_MULT_MIN,
        QUALITY_MULT_MAX,
    )
}

fn pnl_mult(risk_state: &RiskState, max_daily_loss: Decimal) -> Decimal {
    if risk_state.daily_pnl >= Decimal::ZERO {
        return PNL_MULT_CEIL;
    }
    let half_loss = max_daily_loss * dec!(0.5);
    if risk_state.daily_pnl < -half_loss {
        return PNL_MULT_FLOOR;
    }
    // linear interpolation: 1.0 at pnl=0 down to 0.5 at pnl=-half_loss
    let fraction = (-risk_state.daily_pnl) / half_loss;
    PNL_MULT_CEIL - fraction * (PNL_MULT_CEIL - PNL_MULT_FLOOR)
}

fn time_mult(clock: DateTime<Utc>) -> Decimal {
    let hour = clock.hour();
    if (14..20).contains(&hour) {
        TIME_MULT_PEAK
    } else if hour < 8 {
        TIME_MULT_LOW
    } else {
        TIME_MULT_NORMAL
    }
}

fn dynamic_buffer(depth_fraction: Decimal) -> Decimal {
    if depth_fraction <= BUFFER_RAMP_START {
        return BUFFER_MIN;
    }
    if depth_fraction >= Decimal::ONE {
        return BUFFER_MAX;
    }
    let ramp = (depth_fraction - BUFFER_RAMP_START) / (Decimal::ONE - BUFFER_RAMP_START);
    BUFFER_MIN + ramp * (BUFFER_MAX - BUFFER_MIN)
}

/// Computes the dollar size to allocate to `opportunity`.
///
/// `depth_fraction` is how much of top-of-book depth the intended trade
/// would consume, in `[0, 1]`; it drives the dynamic buffer. `effective_ask`
/// is used to round the final dollar size down to whole shares.
#[must_use]
pub fn allocate(
    opportunity: &Opportunity,
    risk_state: &RiskState,
    clock: DateTime<Utc>,
    base_capital_per_trade: Decimal,
    max_daily_loss: Decimal,
    available_balance: Decimal,
    depth_fraction: Decimal,
    effective_ask: Decimal,
) -> Decimal {
    let size = base_capital_per_trade
        * roi_mult(opportunity)
        * quality_mult(opportunity)
        * pnl_mult(risk_state, max_daily_loss)
        * time_mult(clock);

    let buffer = dynamic_buffer(depth_fraction);
    let cap = available_balance * (Decimal::ONE - buffer);
    let bounded = size.min(cap).max(Decimal::ZERO);

    if effective_ask <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let whole_shares = (bounded / effective_ask).floor();
    whole_shares * effective_ask
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn opportunity(roi: Decimal, score: Decimal) -> Opportunity {
        Opportunity {
            market_id: "m1".to_string(),
            yes_ask_levels: vec![],
            no_ask_levels: vec![],
            shares: dec!(10),
            gross_cost: dec!(5),
            fees: dec!(0.1),
            net_profit: dec!(0.5),
            roi,
            score,
            observed_at: Utc::now(),
        }
    }

    fn flat_risk() -> RiskState {
        RiskState::new()
    }

    #[test]
    fn roi_and_quality_multipliers_clamp_at_bounds() {
        let low = opportunity(dec!(0.0001), dec!(1));
        let high = opportunity(dec!(1.0), dec!(1000));
        assert_eq!(roi_mult(&low), ROI_MULT_MIN);
        assert_eq!(roi_mult(&high), ROI_MULT_MAX);
        assert_eq!(quality_mult(&low), QUALITY_MULT_MIN);
        assert_eq!(quality_mult(&high), QUALITY_MULT_MAX);
    }

    #[test]
    fn pnl_mult_is_full_when_pnl_nonnegative() {
        let risk = flat_risk();
        assert_eq!(pnl_mult(&risk, dec!(50)), PNL_MULT_CEIL);
    }

    #[test]
    fn pnl_mult_floors_at_half_max_daily_loss() {
        let mut risk = flat_risk();
        risk.daily_pnl = dec!(-40);
        assert_eq!(pnl_mult(&risk, dec!(50)), PNL_MULT_FLOOR);
    }

    #[test]
    fn pnl_mult_interpolates_linearly() {
        let mut risk = flat_risk();
        risk.daily_pnl = dec!(-12.5); // half of half_loss (25)
        let mult = pnl_mult(&risk, dec!(50));
        assert_eq!(mult, dec!(0.75));
    }

    #[test]
    fn time_mult_reflects_utc_hour_bucket() {
        let peak = Utc.with_ymd_and_hms(2026, 1, 1, 16, 0, 0).unwrap();
        let low = Utc.with_ymd_and_hms(2026, 1, 1, 3, 0, 0).unwrap();
        let normal = Utc.with_ymd_and_hms(2026, 1, 1, 11, 0, 0).unwrap();
        assert_eq!(time_mult(peak), TIME_MULT_PEAK);
        assert_eq!(time_mult(low), TIME_MULT_LOW);
        assert_eq!(time_mult(normal), TIME_MULT_NORMAL);
    }

    #[test]
    fn dynamic_buffer_scales_between_min_and_max() {
        assert_eq!(dynamic_buffer(dec!(0.1)), BUFFER_MIN);
        assert_eq!(dynamic_buffer(dec!(1.0)), BUFFER_MAX);
        let mid = dynamic_buffer(dec!(0.625)); // halfway between 0.25 and 1.0
        assert_eq!(mid, dec!(0.06));
    }

    #[test]
    fn allocate_rounds_down_to_whole_shares_and_respects_buffer() {
        let opp = opportunity(dec!(0.02), dec!(50));
        let risk = flat_risk();
        let clock = Utc.with_ymd_and_hms(2026, 1, 1, 11, 0, 0).unwrap();
        // base 10 * roi_mult 1.0 * quality_mult 1.0 * pnl 1.0 * time 1.0 = 10
        let size = allocate(&opp, &risk, clock, dec!(10), dec!(50), dec!(1000), dec!(0.1), dec!(0.48));
        // 10 / 0.48 = 20.83 -> floor 20 shares * 0.48 = 9.60
        assert_eq!(size, dec!(9.60));
    }

    #[test]
    fn allocate_is_bounded_by_available_balance_after_buffer() {
        let opp = opportunity(dec!(1.0), dec!(1000)); // maxed multipliers
        let risk = flat_risk();
        let clock = Utc.with_ymd_and_hms(2026, 1, 1, 16, 0, 0).unwrap(); // peak
        let size = allocate(&opp, &risk, clock, dec!(100), dec!(50), dec!(50), dec!(1.0), dec!(0.5));
        // cap = 50 * (1 - 0.10) = 45; whole shares at 0.5 => 90 shares * 0.5 = 45
        assert_eq!(size, dec!(45.0));
    }
}
