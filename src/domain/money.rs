use crate::error::PaymentError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

/// A monetary value in minor units (pence/cents).
///
/// Amounts sent to the payment backend are always whole minor units; major-unit
/// values (e.g. line totals `12.345`) are rounded half away from zero when converted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MinorUnits(pub i64);

impl MinorUnits {
    pub const ZERO: Self = Self(0);

    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Converts a major-unit decimal (pounds) into minor units (pence).
    pub fn from_major(major: Decimal) -> Result<Self, PaymentError> {
        (major * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .map(Self)
            .ok_or_else(|| PaymentError::ValidationError(format!("Amount out of range: {major}")))
    }

    /// Like [`from_major`](Self::from_major), for columns that can never be negative.
    pub fn from_non_negative_major(major: Decimal) -> Result<Self, PaymentError> {
        if major < Decimal::ZERO {
            return Err(PaymentError::ValidationError(format!(
                "Amount must not be negative: {major}"
            )));
        }
        Self::from_major(major)
    }

    pub fn to_major(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// `max(0, self - rhs)`
    pub fn saturating_balance(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0).max(0))
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }
}

impl fmt::Display for MinorUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_major())
    }
}

impl Add for MinorUnits {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for MinorUnits {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl AddAssign for MinorUnits {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sum for MinorUnits {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}
