//! Percentage arithmetic shared by every derived and aggregated figure.
//!
//! All values are `Decimal` with two fractional digits, rounded half-up.
//! Nothing else in the crate divides or rounds percentages.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

pub const SCALE: u32 = 2;

const ONE_HUNDRED: Decimal = dec!(100);

/// `part` as a percentage of `total`, rounded half-up to two digits.
///
/// A zero total yields `0.00` whatever `part` is.
pub fn percentage(total: u32, part: u32) -> Decimal {
    if total == 0 {
        return Decimal::new(0, SCALE);
    }
    round_half_up(Decimal::from(part) * ONE_HUNDRED / Decimal::from(total))
}

/// Rounds half-up (away from zero at the midpoint) and pins the scale at two.
pub fn round_half_up(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(SCALE);
    rounded
}

/// Arithmetic mean, `None` for an empty input.
pub fn mean<I>(values: I) -> Option<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    let (sum, count) = values
        .into_iter()
        .fold((Decimal::ZERO, 0u32), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        return None;
    }
    Some(round_half_up(sum / Decimal::from(count)))
}

/// `Σ(value × weight) / Σ(weight)`; `None` when the weights sum to zero.
pub fn weighted_mean<I>(pairs: I) -> Option<Decimal>
where
    I: IntoIterator<Item = (Decimal, u32)>,
{
    let (weighted, weights) = pairs
        .into_iter()
        .fold((Decimal::ZERO, 0u64), |(acc, w), (value, weight)| {
            (acc + value * Decimal::from(weight), w + u64::from(weight))
        });
    if weights == 0 {
        return None;
    }
    Some(round_half_up(weighted / Decimal::from(weights)))
}

/// True when `value` lies in `[0, 100]`.
pub fn is_percentage(value: Decimal) -> bool {
    value >= Decimal::ZERO && value <= ONE_HUNDRED
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(100, 33, dec!(33.00) ; "whole number")]
    #[test_case(150, 25, dec!(16.67) ; "repeating decimal rounds up")]
    #[test_case(3, 1, dec!(33.33) ; "one third")]
    #[test_case(8, 1, dec!(12.50) ; "exact half digit")]
    #[test_case(200, 1, dec!(0.50) ; "small share")]
    #[test_case(40, 40, dec!(100.00) ; "everything")]
    #[test_case(40, 0, dec!(0.00) ; "nothing")]
    fn computes_rounded_share(total: u32, part: u32, expected: Decimal) {
        assert_eq!(percentage(total, part), expected);
    }

    #[test]
    fn zero_total_is_floored_to_zero() {
        assert_eq!(percentage(0, 0), Decimal::ZERO);
        assert_eq!(percentage(0, 17).to_string(), "0.00");
    }

    #[test]
    fn always_renders_two_digits() {
        assert_eq!(percentage(100, 33).to_string(), "33.00");
        assert_eq!(percentage(7, 7).to_string(), "100.00");
    }

    #[test]
    fn midpoints_round_away_from_zero() {
        // 1/400 = 0.25%, 1/800 = 0.125% -> 0.13
        assert_eq!(percentage(800, 1), dec!(0.13));
        assert_eq!(round_half_up(dec!(2.345)), dec!(2.35));
        assert_eq!(round_half_up(dec!(2.335)), dec!(2.34));
    }

    #[test]
    fn stays_within_bounds() {
        for total in [1u32, 3, 7, 97, 1000] {
            for part in 0..=total.min(50) {
                assert!(is_percentage(percentage(total, part)));
            }
            assert_eq!(percentage(total, total), dec!(100));
        }
    }

    #[test]
    fn means_skip_nothing_and_round() {
        assert_eq!(mean(Vec::<Decimal>::new()), None);
        assert_eq!(mean([dec!(90), dec!(85.5)]), Some(dec!(87.75)));
        assert_eq!(mean([dec!(10), dec!(10), dec!(11)]), Some(dec!(10.33)));
    }

    #[test]
    fn weighted_mean_uses_weights() {
        assert_eq!(weighted_mean([(dec!(80), 10), (dec!(50), 0)]), Some(dec!(80.00)));
        assert_eq!(weighted_mean([(dec!(100), 1), (dec!(0), 3)]), Some(dec!(25.00)));
        assert_eq!(weighted_mean([(dec!(70), 0)]), None);
    }
}
