//! Fixed-point money.
//!
//! Amounts are stored as whole cents so that ledger arithmetic is exact:
//! the cash removed from a ledger always equals the sum of the applied costs.
//! The operators saturate at the `i64` bounds; use `checked_add` where an
//! overflow has to be reported.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

const CENTS_PER_UNIT: i64 = 100;

/// Monetary amount in cents.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn from_units(units: i64) -> Self {
        Self(units * CENTS_PER_UNIT)
    }

    /// Convert a currency amount as it arrives in a payload. Rounds to the
    /// nearest cent. Returns `None` for NaN, infinities and values outside the
    /// representable range.
    pub fn from_float(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let cents = (value * CENTS_PER_UNIT as f64).round();
        if cents.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(Self(cents as i64))
    }

    pub fn to_float(self) -> f64 {
        self.0 as f64 / CENTS_PER_UNIT as f64
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Sum of `amounts`, or `None` when it does not fit.
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Self> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |total, amount| total.checked_add(amount))
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    /// Subtract, flooring at zero.
    pub fn saturating_sub_to_zero(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0).max(0))
    }

    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_sub(rhs.0);
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl fmt::Debug for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Money({})", self)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(
            f,
            "{}${}.{:02}",
            sign,
            abs / CENTS_PER_UNIT as u64,
            abs % CENTS_PER_UNIT as u64
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_float_rounds_to_cents() {
        assert_eq!(Money::from_float(80000.0), Some(Money::from_units(80000)));
        assert_eq!(Money::from_float(0.015), Some(Money::from_cents(2)));
        assert_eq!(Money::from_float(f64::NAN), None);
        assert_eq!(Money::from_float(f64::INFINITY), None);
    }

    #[test]
    fn test_arithmetic_is_exact() {
        let costs = [Money::from_float(0.1).unwrap(); 10];
        let total: Money = costs.iter().sum();
        assert_eq!(total, Money::from_units(1));
    }

    #[test]
    fn test_saturating_sub_floors_at_zero() {
        let cash = Money::from_units(10);
        assert_eq!(cash.saturating_sub_to_zero(Money::from_units(25)), Money::ZERO);
        assert_eq!(
            cash.saturating_sub_to_zero(Money::from_units(4)),
            Money::from_units(6)
        );
    }

    #[test]
    fn test_overflow_saturates_or_reports() {
        let huge = Money::from_cents(i64::MAX - 1);
        assert_eq!(huge + Money::from_cents(5), Money::from_cents(i64::MAX));
        assert_eq!([huge, huge].iter().sum::<Money>(), Money::from_cents(i64::MAX));
        assert_eq!(huge.checked_add(Money::from_cents(5)), None);
        assert_eq!(Money::checked_sum([huge, huge]), None);
        assert_eq!(
            Money::checked_sum([Money::from_units(1), Money::from_units(2)]),
            Some(Money::from_units(3))
        );
        assert_eq!(
            Money::from_cents(i64::MIN + 1) - Money::from_cents(5),
            Money::from_cents(i64::MIN)
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(123456).to_string(), "$1234.56");
        assert_eq!(Money::from_cents(-5).to_string(), "-$0.05");
    }
}
