//! Keeper arithmetic: leg sizing, marking, drift, EMA smoothing and the
//! principal floor threshold.
//!
//! All money values are `Decimal`. The only float step is the EMA alpha,
//! which is a fixed configuration-derived constant.

use crate::market::Quote;
use crate::position::VaultLegs;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::time::Duration;

/// Per-pass smoothing factor whose half-life equals `half_life` when
/// updated every `cadence`: `1 - 0.5^(cadence / half_life)`.
#[must_use]
pub fn ema_alpha(half_life: Duration, cadence: Duration) -> Decimal {
    if half_life.is_zero() {
        return Decimal::ONE;
    }
    let exponent = cadence.as_secs_f64() / half_life.as_secs_f64();
    let alpha = 1.0 - 0.5_f64.powf(exponent);
    Decimal::from_f64(alpha)
        .unwrap_or(Decimal::ONE)
        .round_dp(12)
        .clamp(Decimal::ZERO, Decimal::ONE)
}

#[must_use]
pub fn update_ema(previous: Decimal, sample: Decimal, alpha: Decimal) -> Decimal {
    alpha * sample + (Decimal::ONE - alpha) * previous
}

/// `|spot - perp| / (spot + perp)`: 0 when balanced, towards 1 as the hedge
/// breaks down. Non-positive equity counts as fully broken.
#[must_use]
pub fn drift_coefficient(spot_value: Decimal, perp_value: Decimal) -> Decimal {
    let total = spot_value + perp_value;
    if total <= Decimal::ZERO {
        return Decimal::ONE;
    }
    (spot_value - perp_value).abs() / total
}

/// Equity below which the safety guard fires.
#[must_use]
pub fn breach_threshold(principal_floor: Decimal, tolerance: Decimal) -> Decimal {
    principal_floor * (Decimal::ONE - tolerance)
}

#[must_use]
pub fn principal_floor(principal: Decimal, retained_fraction: Decimal) -> Decimal {
    principal * retained_fraction
}

/// Sizes both legs for a fresh deposit.
///
/// The derivative notional is `hedge_ratio` times the spot notional and is
/// fully collateralized, so `spot + margin == principal` and the new
/// position marks at exactly its principal.
#[must_use]
pub fn initial_legs(principal: Decimal, hedge_ratio: Decimal, quote: &Quote) -> VaultLegs {
    let spot_value = principal / (Decimal::ONE + hedge_ratio);
    let perp_margin = principal - spot_value;
    let spot_quantity = spot_value / quote.spot_price;
    let perp_quantity = hedge_ratio * spot_value / quote.perp_price;

    VaultLegs {
        spot_quantity,
        perp_quantity,
        perp_entry_price: quote.perp_price,
        perp_margin,
    }
}

/// Marked values of both legs. The derivative leg is short, so it gains
/// what the perp price loses since entry.
#[must_use]
pub fn mark_legs(legs: &VaultLegs, quote: &Quote) -> (Decimal, Decimal) {
    let spot_value = legs.spot_quantity * quote.spot_price;
    let perp_value =
        legs.perp_margin + legs.perp_quantity * (legs.perp_entry_price - quote.perp_price);
    (spot_value, perp_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn quote(spot: Decimal, perp: Decimal) -> Quote {
        Quote {
            spot_price: spot,
            perp_price: perp,
            funding_rate: Decimal::ZERO,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_drift_is_zero_when_balanced() {
        assert_eq!(drift_coefficient(dec!(100), dec!(100)), Decimal::ZERO);
    }

    #[test]
    fn test_drift_of_unbalanced_pair() {
        let drift = drift_coefficient(dec!(130), dec!(100));
        assert_eq!(drift.round_dp(3), dec!(0.130));
        assert!(drift > dec!(0.10));
    }

    #[test]
    fn test_drift_with_no_equity() {
        assert_eq!(drift_coefficient(Decimal::ZERO, Decimal::ZERO), Decimal::ONE);
    }

    #[test]
    fn test_breach_threshold() {
        let threshold = breach_threshold(dec!(1000), dec!(0.05));
        assert_eq!(threshold, dec!(950));
        assert!(dec!(940) < threshold);
    }

    #[test]
    fn test_ema_alpha_half_life() {
        let day = Duration::from_secs(24 * 3600);
        assert_eq!(ema_alpha(day, day), dec!(0.5));

        // After one half-life of updates a step input is half absorbed.
        let cadence = Duration::from_secs(60);
        let alpha = ema_alpha(day, cadence);
        let mut ema = Decimal::ZERO;
        for _ in 0..(24 * 60) {
            ema = update_ema(ema, Decimal::ONE, alpha);
        }
        assert!((ema - dec!(0.5)).abs() < dec!(0.0001), "ema = {ema}");
    }

    #[test]
    fn test_update_ema() {
        assert_eq!(update_ema(dec!(0.02), dec!(-0.03), dec!(0.02)), dec!(0.0190));
    }

    #[test]
    fn test_initial_legs_mark_at_principal() {
        let q = quote(dec!(2.5), dec!(2.5));
        let legs = initial_legs(dec!(1000), Decimal::ONE, &q);
        assert_eq!(legs.perp_margin, dec!(500));
        assert_eq!(legs.spot_quantity, dec!(200));
        assert_eq!(legs.perp_quantity, dec!(200));

        let (spot, perp) = mark_legs(&legs, &q);
        assert_eq!(spot + perp, dec!(1000));
    }

    #[test]
    fn test_hedge_holds_equity_through_price_move() {
        let legs = initial_legs(dec!(1000), Decimal::ONE, &quote(dec!(2.5), dec!(2.5)));
        let (spot, perp) = mark_legs(&legs, &quote(dec!(3.0), dec!(3.0)));
        assert_eq!(spot, dec!(600));
        assert_eq!(perp, dec!(400));
        assert_eq!(spot + perp, dec!(1000));
        assert_eq!(drift_coefficient(spot, perp), dec!(0.2));
    }
}
