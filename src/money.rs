//! Fixed-point currency arithmetic.
//!
//! All amounts in the engine are integer minor units (cents). This makes the
//! split-remainder exactness guarantee trivial: dividing an amount across `n`
//! targets always sums back to the original amount, with no floating-point
//! drift anywhere in the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// An amount of money in integer cents. May be negative (undo records carry
/// negative totals).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero dollars.
    pub const ZERO: Money = Money(0);

    /// Constructs a `Money` from raw cents.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Constructs a `Money` from whole dollars.
    #[must_use]
    pub const fn from_dollars(dollars: i64) -> Self {
        Money(dollars * 100)
    }

    /// Constructs a `Money` from a fractional dollar amount, rounding to the
    /// nearest cent. Used at the configuration boundary only; everything past
    /// it stays in integer cents.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_dollars_f64(dollars: f64) -> Self {
        Money((dollars * 100.0).round() as i64)
    }

    /// Raw cent count.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// True when the amount is strictly positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Caps this amount at `limit`, never returning a negative result.
    /// This is the "never fund more than the available pool" primitive.
    #[must_use]
    pub fn capped_at(self, limit: Money) -> Money {
        Money(self.0.min(limit.0).max(0))
    }

    /// Applies a percentage, rounding to the nearest cent.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn percent(self, percent: f64) -> Money {
        Money(((self.0 as f64) * percent / 100.0).round() as i64)
    }

    /// Absolute value.
    #[must_use]
    pub const fn abs(self) -> Money {
        Money(self.0.abs())
    }

    /// Splits this amount evenly across `n` shares. Each share gets the floor
    /// of the division; the final share absorbs the remainder cents, so the
    /// shares always sum back to the original amount exactly.
    ///
    /// Returns an empty vector when `n` is zero.
    #[must_use]
    pub fn split_even(self, n: usize) -> Vec<Money> {
        if n == 0 {
            return Vec::new();
        }
        let n_i64 = n as i64;
        let base = self.0.div_euclid(n_i64);
        let remainder = self.0 - base * n_i64;
        let mut shares = vec![Money(base); n];
        if let Some(last) = shares.last_mut() {
            last.0 += remainder;
        }
        shares
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Money;
    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_split_even_exact_sum() {
        // $100.00 across 3 targets: 33.33 + 33.33 + 33.34
        let shares = Money::from_dollars(100).split_even(3);
        assert_eq!(shares.len(), 3);
        assert_eq!(shares[0], Money::from_cents(3333));
        assert_eq!(shares[1], Money::from_cents(3333));
        assert_eq!(shares[2], Money::from_cents(3334));
        assert_eq!(shares.iter().copied().sum::<Money>(), Money::from_dollars(100));
    }

    #[test]
    fn test_split_even_sum_property_across_sizes() {
        let amount = Money::from_cents(9_999_997);
        for n in 1..=17 {
            let shares = amount.split_even(n);
            assert_eq!(shares.len(), n);
            assert_eq!(shares.iter().copied().sum::<Money>(), amount, "n = {n}");
        }
    }

    #[test]
    fn test_split_even_zero_targets() {
        assert!(Money::from_dollars(5).split_even(0).is_empty());
    }

    #[test]
    fn test_capped_at_never_negative() {
        assert_eq!(
            Money::from_dollars(200).capped_at(Money::from_dollars(150)),
            Money::from_dollars(150)
        );
        assert_eq!(
            Money::from_dollars(50).capped_at(Money::from_dollars(150)),
            Money::from_dollars(50)
        );
        assert_eq!(
            Money::from_dollars(50).capped_at(Money::from_cents(-10)),
            Money::ZERO
        );
    }

    #[test]
    fn test_percent_rounds_to_cent() {
        // 30% of $15.55 = $4.665, rounds to $4.67
        assert_eq!(Money::from_cents(1555).percent(30.0), Money::from_cents(467));
        assert_eq!(Money::from_dollars(2000).percent(25.0), Money::from_dollars(500));
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(Money::from_cents(12345).to_string(), "$123.45");
        assert_eq!(Money::from_cents(-205).to_string(), "-$2.05");
        assert_eq!(Money::ZERO.to_string(), "$0.00");
    }
}
