use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};

// ============================================================================
// Money - integer minor units
// ============================================================================
//
// All monetary values are carried as a count of minor currency units
// (cents). Tax, shipping and discount composition never touches floating
// point, so totals reconcile exactly.
//
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Whole currency units, e.g. `Money::from_major(50)` is 50.00
    pub const fn from_major(major: i64) -> Self {
        Self(major * 100)
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    /// Multiply by a line quantity. Saturates instead of wrapping.
    pub fn times(self, quantity: i32) -> Self {
        Self(self.0.saturating_mul(quantity as i64))
    }

    /// Apply a rate in basis points, rounding half away from zero.
    pub fn apply_bps(self, bps: u32) -> Self {
        let scaled = (self.0 as i128) * (bps as i128);
        let rounded = if scaled >= 0 {
            (scaled + 5_000) / 10_000
        } else {
            (scaled - 5_000) / 10_000
        };
        Self(rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_percent_tax_rounds_half_up() {
        assert_eq!(Money::from_major(1000).apply_bps(1_000), Money::from_major(100));
        // 0.05 * 10% = 0.005 -> 0.01
        assert_eq!(Money::from_minor(5).apply_bps(1_000), Money::from_minor(1));
        assert_eq!(Money::from_minor(4).apply_bps(1_000), Money::ZERO);
    }

    #[test]
    fn test_times_and_sum() {
        let unit = Money::from_major(250);
        let lines = vec![unit.times(4), Money::from_minor(199).times(3)];
        let total: Money = lines.into_iter().sum();
        assert_eq!(total, Money::from_minor(100_000 + 597));
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_minor(115_000).to_string(), "1150.00");
        assert_eq!(Money::from_minor(-7).to_string(), "-0.07");
    }

    #[test]
    fn test_serializes_as_plain_integer() {
        let json = serde_json::to_string(&Money::from_minor(4_250)).unwrap();
        assert_eq!(json, "4250");
    }
}
