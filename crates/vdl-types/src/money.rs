use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Serialize};

/// An amount in integer minor units (e.g. cents).
///
/// Never constructed from floating point.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Self = Self(0);

    pub const fn from_minor(units: i64) -> Self {
        Self(units)
    }

    pub const fn minor_units(&self) -> i64 {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// `qty * unit`, saturating on overflow.
    pub fn times(&self, qty: i64) -> Self {
        Self(self.0.saturating_mul(qty))
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = Money::from_minor(250);
        let b = Money::from_minor(100);
        assert_eq!((a + b).minor_units(), 350);
        assert_eq!((a - b).minor_units(), 150);
        assert_eq!(b.times(3).minor_units(), 300);
        let total: Money = [a, b].into_iter().sum();
        assert_eq!(total, Money::from_minor(350));
    }

    #[test]
    fn serializes_as_integer() {
        let json = serde_json::to_string(&Money::from_minor(1999)).unwrap();
        assert_eq!(json, "1999");
    }

    #[test]
    fn rejects_float_on_deserialize() {
        assert!(serde_json::from_str::<Money>("19.99").is_err());
    }

    proptest::proptest! {
        #[test]
        fn sum_is_order_independent(amounts in proptest::collection::vec(-1_000_000i64..1_000_000, 0..32)) {
            let forward: Money = amounts.iter().copied().map(Money::from_minor).sum();
            let backward: Money = amounts.iter().rev().copied().map(Money::from_minor).sum();
            proptest::prop_assert_eq!(forward, backward);
            proptest::prop_assert_eq!(forward.minor_units(), amounts.iter().sum::<i64>());
        }
    }
}
