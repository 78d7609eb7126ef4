use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const DEFAULT_CURRENCY_CODE: &str = "RUB";
pub const DEFAULT_CURRENCY_CODE_LOWER: &str = "rub";

/// The number of minor units (kopecks, cents) in one major unit of currency.
const MINOR_UNITS_PER_MAJOR: i64 = 100;

//--------------------------------------       Money         ---------------------------------------------------------
/// An amount of money in integer minor currency units (kopecks, cents).
///
/// Amounts coming off the wire and amounts stored against orders are always integers in minor units. Floats never
/// enter the pipeline; converting through a float is the classic reconciliation defect this type exists to prevent.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in minor currency units: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {} is too large to convert to Money", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let major = abs / MINOR_UNITS_PER_MAJOR as u64;
        let minor = abs % MINOR_UNITS_PER_MAJOR as u64;
        write!(f, "{sign}{major}.{minor:02}")
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_major(major: i64) -> Self {
        Self(major * MINOR_UNITS_PER_MAJOR)
    }

    /// The absolute difference between two amounts, in minor units.
    pub fn difference(&self, other: Money) -> i64 {
        (self.0 - other.0).abs()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_is_major_units_with_two_decimals() {
        assert_eq!(Money::from(10_000).to_string(), "100.00");
        assert_eq!(Money::from(5_000).to_string(), "50.00");
        assert_eq!(Money::from(1).to_string(), "0.01");
        assert_eq!(Money::from(-2_575).to_string(), "-25.75");
    }

    #[test]
    fn no_drift_across_repeated_round_trips() {
        let mut amount = Money::from(10_000);
        for _ in 0..1_000 {
            amount = amount + Money::from(0);
        }
        assert_eq!(amount.value(), 10_000);
        assert_eq!(amount.to_string(), "100.00");
    }

    #[test]
    fn from_major_scales_by_minor_units() {
        assert_eq!(Money::from_major(50), Money::from(5_000));
    }

    #[test]
    fn difference_is_symmetric() {
        let a = Money::from(5_000);
        let b = Money::from(5_003);
        assert_eq!(a.difference(b), 3);
        assert_eq!(b.difference(a), 3);
    }
}
