//! Market quality scoring (spec §4.3).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Reference volume (dollars) against which the log-scaled volume sub-score
/// saturates to 100.
const VOLUME_REFERENCE: f64 = 50_000.0;
/// Reference top-5-depth liquidity (dollars) against which the liquidity
/// sub-score saturates to 100.
const LIQUIDITY_REFERENCE: f64 = 2_000.0;
/// Spread (dollars) at or above which the spread sub-score bottoms out at 0.
const MAX_MEANINGFUL_SPREAD: f64 = 0.10;

const WEIGHT_VOLUME: f64 = 0.35;
const WEIGHT_LIQUIDITY: f64 = 0.30;
const WEIGHT_SPREAD: f64 = 0.20;
const WEIGHT_TIME: f64 = 0.15;

/// Inputs the scorer needs, already extracted from a market + its books so
/// this module stays free of any exchange- or book-representation detail.
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput {
    pub volume: Decimal,
    /// Sum of the top 5 bid and ask sizes, converted to dollar depth, across
    /// both outcome tokens.
    pub top5_liquidity: Decimal,
    /// Best-ask minus best-bid on the tighter of the two outcome tokens.
    pub spread: Decimal,
    pub hours_to_resolution: f64,
}

/// Weighted four-factor quality score in `[0, 100]`.
#[must_use]
pub fn score(input: ScoringInput) -> Decimal {
    let volume = volume_score(input.volume.to_f64().unwrap_or(0.0));
    let liquidity = liquidity_score(input.top5_liquidity.to_f64().unwrap_or(0.0));
    let spread = spread_score(input.spread.to_f64().unwrap_or(MAX_MEANINGFUL_SPREAD));
    let time = time_score(input.hours_to_resolution);

    let total = WEIGHT_VOLUME * volume
        + WEIGHT_LIQUIDITY * liquidity
        + WEIGHT_SPREAD * spread
        + WEIGHT_TIME * time;

    Decimal::from_f64_retain(total.clamp(0.0, 100.0)).unwrap_or(Decimal::ZERO)
}

fn volume_score(volume: f64) -> f64 {
    if volume <= 0.0 {
        return 0.0;
    }
    let scaled = (volume.ln_1p() / VOLUME_REFERENCE.ln_1p()).min(1.0);
    100.0 * scaled
}

fn liquidity_score(top5_liquidity: f64) -> f64 {
    100.0 * (top5_liquidity / LIQUIDITY_REFERENCE).clamp(0.0, 1.0)
}

fn spread_score(spread: f64) -> f64 {
    100.0 * (1.0 - (spread / MAX_MEANINGFUL_SPREAD)).clamp(0.0, 1.0)
}

/// Bell-shaped curve that penalizes markets resolving in under an hour
/// (too little time to safely unwind a bad fill) or over 30 days (capital
/// tied up with no near-term catalyst). Full score across the plateau in
/// between, linear ramps on both shoulders.
fn time_score(hours: f64) -> f64 {
    const MIN_HOURS: f64 = 1.0;
    const RAMP_HOURS: f64 = 6.0;
    const MAX_DAYS: f64 = 30.0;
    const MAX_HOURS: f64 = MAX_DAYS * 24.0;
    const TAPER_HOURS: f64 = 72.0;

    if hours < MIN_HOURS {
        0.0
    } else if hours < MIN_HOURS + RAMP_HOURS {
        100.0 * (hours - MIN_HOURS) / RAMP_HOURS
    } else if hours <= MAX_HOURS {
        100.0
    } else if hours <= MAX_HOURS + TAPER_HOURS {
        100.0 * (1.0 - (hours - MAX_HOURS) / TAPER_HOURS)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn input(volume: Decimal, liquidity: Decimal, spread: Decimal, hours: f64) -> ScoringInput {
        ScoringInput {
            volume,
            top5_liquidity: liquidity,
            spread,
            hours_to_resolution: hours,
        }
    }

    #[test]
    fn deep_liquid_tight_mid_horizon_market_scores_high() {
        let s = score(input(dec!(100_000), dec!(5000), dec!(0.01), 240.0));
        assert!(s > dec!(85), "expected high score, got {s}");
    }

    #[test]
    fn thin_wide_market_scores_low() {
        let s = score(input(dec!(100), dec!(10), dec!(0.08), 240.0));
        assert!(s < dec!(30), "expected low score, got {s}");
    }

    #[test]
    fn imminent_resolution_is_penalized() {
        let good = score(input(dec!(50_000), dec!(2000), dec!(0.01), 240.0));
        let soon = score(input(dec!(50_000), dec!(2000), dec!(0.01), 0.5));
        assert!(soon < good);
        assert_eq!(time_score(0.5), 0.0);
    }

    #[test]
    fn far_out_resolution_is_penalized() {
        let far = score(input(dec!(50_000), dec!(2000), dec!(0.01), 45.0 * 24.0));
        let near = score(input(dec!(50_000), dec!(2000), dec!(0.01), 10.0 * 24.0));
        assert!(far < near);
    }

    #[test]
    fn zero_volume_contributes_zero_to_volume_subscore() {
        assert_eq!(volume_score(0.0), 0.0);
        assert_eq!(volume_score(-5.0), 0.0);
    }

    #[test]
    fn score_is_bounded_to_one_hundred() {
        let s = score(input(dec!(10_000_000), dec!(1_000_000), dec!(0.0), 240.0));
        assert!(s <= dec!(100));
    }
}
