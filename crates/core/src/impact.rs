//! Greedy order-book walking for fill simulation (spec §4.2).

use rust_decimal::prelude::*;
use rust_decimal::Decimal;

/// Price is resolved to 6 decimal places, size to 4, matching the tick sizes
/// both Kalshi and Polymarket binary markets trade at.
const PRICE_SCALE: u32 = 6;
const SIZE_SCALE: u32 = 4;

/// Result of walking a book to fill (up to) `shares` units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillSimulation {
    /// Size-weighted average price actually achieved.
    pub effective_price: Decimal,
    /// Shares actually fillable, which may be less than requested if the
    /// book doesn't have enough depth.
    pub filled_shares: Decimal,
    /// `true` if the book ran out of levels before filling the request.
    pub depth_exhausted: bool,
}

/// Walks `levels` (best price first) consuming up to `shares` units and
/// returns the size-weighted effective price.
///
/// Returns `None` if `levels` is empty or `shares <= 0`.
#[must_use]
pub fn effective_price(levels: &[(Decimal, Decimal)], shares: Decimal) -> Option<FillSimulation> {
    if levels.is_empty() || shares <= Decimal::ZERO {
        return None;
    }

    let mut remaining = shares;
    let mut cost = Decimal::ZERO;
    let mut filled = Decimal::ZERO;

    for &(price, size) in levels {
        if remaining <= Decimal::ZERO {
            break;
        }
        let take = remaining.min(size);
        cost += take * price;
        filled += take;
        remaining -= take;
    }

    if filled == Decimal::ZERO {
        return None;
    }

    let avg = (cost / filled).round_dp(PRICE_SCALE);
    Some(FillSimulation {
        effective_price: avg,
        filled_shares: filled.round_dp(SIZE_SCALE),
        depth_exhausted: remaining > Decimal::ZERO,
    })
}

/// Largest number of shares purchasable from `levels` whose size-weighted
/// average price stays at or under `max_price`.
///
/// Walks level-by-level accumulating cost; once the running average would
/// exceed `max_price`, takes only the partial amount of that level that
/// keeps the average at the cap.
#[must_use]
pub fn max_shares_under(levels: &[(Decimal, Decimal)], max_price: Decimal) -> Decimal {
    let mut cost = Decimal::ZERO;
    let mut filled = Decimal::ZERO;

    for &(price, size) in levels {
        if price > max_price && filled == Decimal::ZERO {
            // even a single share at this level already breaks the cap and
            // nothing cheaper remains (levels are sorted ascending by price)
            break;
        }

        let candidate_filled = filled + size;
        let candidate_cost = cost + size * price;
        let candidate_avg = candidate_cost / candidate_filled;

        if candidate_avg <= max_price {
            cost = candidate_cost;
            filled = candidate_filled;
            continue;
        }

        // taking all of this level would blow the cap; solve for the
        // partial size `x` that keeps (cost + x*price) / (filled + x) == max_price
        let denom = max_price - price;
        if denom >= Decimal::ZERO {
            // price <= max_price but the level is large enough to drag the
            // average down further than allowed is impossible when denom>=0
            // since adding cheaper shares only helps; take the whole level.
            cost = candidate_cost;
            filled = candidate_filled;
            continue;
        }
        let x = (max_price * filled - cost) / denom;
        let x = x.max(Decimal::ZERO).min(size);
        filled += x;
        break;
    }

    filled.round_dp(SIZE_SCALE)
}

/// Shares purchasable by spending at most `budget` dollars, walking `levels`
/// greedily from the best price.
#[must_use]
pub fn shares_for_spend(levels: &[(Decimal, Decimal)], budget: Decimal) -> Decimal {
    let mut remaining_budget = budget;
    let mut filled = Decimal::ZERO;

    for &(price, size) in levels {
        if remaining_budget <= Decimal::ZERO || price <= Decimal::ZERO {
            break;
        }
        let affordable = remaining_budget / price;
        let take = affordable.min(size);
        filled += take;
        remaining_budget -= take * price;
    }

    filled.round_dp(SIZE_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn effective_price_is_size_weighted_average() {
        let levels = vec![(dec!(0.50), dec!(100)), (dec!(0.52), dec!(100))];
        let sim = effective_price(&levels, dec!(150)).unwrap();
        // 100 @ 0.50 + 50 @ 0.52 = 50 + 26 = 76 / 150
        assert_eq!(sim.effective_price, dec!(0.506667));
        assert_eq!(sim.filled_shares, dec!(150));
        assert!(!sim.depth_exhausted);
    }

    #[test]
    fn effective_price_flags_depth_exhausted() {
        let levels = vec![(dec!(0.50), dec!(10))];
        let sim = effective_price(&levels, dec!(100)).unwrap();
        assert_eq!(sim.filled_shares, dec!(10));
        assert!(sim.depth_exhausted);
    }

    #[test]
    fn effective_price_none_on_empty_book_or_zero_shares() {
        assert!(effective_price(&[], dec!(10)).is_none());
        assert!(effective_price(&[(dec!(0.5), dec!(10))], dec!(0)).is_none());
    }

    #[test]
    fn max_shares_under_caps_at_first_level_when_it_already_exceeds() {
        let levels = vec![(dec!(0.60), dec!(100))];
        let shares = max_shares_under(&levels, dec!(0.50));
        assert_eq!(shares, Decimal::ZERO);
    }

    #[test]
    fn max_shares_under_takes_whole_cheap_levels_then_partials() {
        let levels = vec![(dec!(0.40), dec!(50)), (dec!(0.60), dec!(100))];
        // average must stay <= 0.50: 50@0.40 (avg 0.40) then some x@0.60
        // (20 + 0.6x) / (50 + x) <= 0.50  =>  20 + 0.6x <= 25 + 0.5x => 0.1x <= 5 => x <= 50
        let shares = max_shares_under(&levels, dec!(0.50));
        assert_eq!(shares, dec!(100));
    }

    #[test]
    fn shares_for_spend_respects_budget_and_depth() {
        let levels = vec![(dec!(0.50), dec!(10)), (dec!(0.60), dec!(10))];
        // 10 @ 0.50 = 5.00, remaining budget 2.00 buys 3.3333 @ 0.60
        let shares = shares_for_spend(&levels, dec!(7.00));
        assert_eq!(shares, dec!(13.3333));
    }

    #[test]
    fn shares_for_spend_zero_budget_yields_zero_shares() {
        let levels = vec![(dec!(0.50), dec!(10))];
        assert_eq!(shares_for_spend(&levels, Decimal::ZERO), Decimal::ZERO);
    }
}
