//! Money amounts in minor currency units.

use serde::{Deserialize, Serialize};

/// Money amount held as an integer count of minor currency units.
///
/// Currencies without a minor unit (VND) simply use whole units.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates an amount from minor units.
    pub const fn new(amount: i64) -> Self {
        Self(amount)
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in minor units.
    pub const fn amount(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money(self.0 * i64::from(quantity))
    }

    /// `self × percent / 100`, rounded toward zero.
    pub fn percent_floor(&self, percent: i64) -> Money {
        Money(self.0 * percent / 100)
    }

    /// `self × basis_points / 10_000`, rounded half away from zero.
    pub fn basis_points_rounded(&self, basis_points: i64) -> Money {
        let scaled = self.0 * basis_points;
        let rounded = if scaled >= 0 {
            (scaled + 5_000) / 10_000
        } else {
            (scaled - 5_000) / 10_000
        };
        Money(rounded)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl From<i64> for Money {
    fn from(amount: i64) -> Self {
        Self(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_arithmetic() {
        let a = Money::new(1000);
        let b = Money::new(500);

        assert_eq!((a + b).amount(), 1500);
        assert_eq!((a - b).amount(), 500);
        assert_eq!(a.multiply(3).amount(), 3000);
    }

    #[test]
    fn test_percent_floor_truncates() {
        assert_eq!(Money::new(200_000).percent_floor(10), Money::new(20_000));
        assert_eq!(Money::new(999).percent_floor(15), Money::new(149));
    }

    #[test]
    fn test_basis_points_round_half_up() {
        assert_eq!(Money::new(200_000).basis_points_rounded(1000), Money::new(20_000));
        // 12_345 * 10% = 1_234.5 -> 1_235
        assert_eq!(Money::new(12_345).basis_points_rounded(1000), Money::new(1_235));
        // 12_344 * 10% = 1_234.4 -> 1_234
        assert_eq!(Money::new(12_344).basis_points_rounded(1000), Money::new(1_234));
    }

    #[test]
    fn test_money_sum_and_ordering() {
        let total: Money = [Money::new(1), Money::new(2), Money::new(3)].into_iter().sum();
        assert_eq!(total, Money::new(6));
        assert_eq!(Money::new(5).min(Money::new(3)), Money::new(3));
    }

    #[test]
    fn test_money_sign_checks() {
        assert!(Money::new(100).is_positive());
        assert!(Money::zero().is_zero());
        assert!(Money::new(-100).is_negative());
    }
}
