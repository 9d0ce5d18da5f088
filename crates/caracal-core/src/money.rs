use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// An arbitrary-precision monetary amount, always carried and persisted as
/// text so it never loses precision to binary floats.
///
/// `rust_decimal::Decimal` cannot represent NaN or infinity, so the ingress
/// checks below only need to police fractional-digit count.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(#[serde(with = "rust_decimal::serde::str")] Decimal);

/// Totals (ledger costs, policy limits, charge amounts) are rounded to at
/// most this many fractional digits unless a caller opts into more.
pub const DEFAULT_MAX_SCALE: u32 = 2;

impl Money {
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Parse user/wire-supplied decimal text, rejecting values with more
    /// than `max_scale` fractional digits.
    pub fn parse(text: &str, max_scale: u32) -> Result<Self, CoreError> {
        let d = Decimal::from_str(text.trim())
            .map_err(|e| CoreError::Validation(format!("invalid decimal '{text}': {e}")))?;
        if d.scale() > max_scale {
            return Err(CoreError::Validation(format!(
                "decimal '{text}' has {} fractional digits, max is {max_scale}",
                d.scale()
            )));
        }
        Ok(Self(d))
    }

    pub fn from_decimal(d: Decimal) -> Self {
        Self(d)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Money({})", self.0)
    }
}

impl std::ops::Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), |a, b| a + b)
    }
}
