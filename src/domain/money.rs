use crate::error::{PaymentError, PreconditionError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A positive monetary amount, fixed-point in the smallest currency unit.
///
/// Wraps `rust_decimal::Decimal` so money never goes through a floating-point
/// approximation. Construction rejects zero, negative, and fractional values
/// (there is no such thing as half a minor unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value <= Decimal::ZERO {
            return Err(PreconditionError::InvalidAmount(format!(
                "amount must be positive, got {value}"
            ))
            .into());
        }
        if !value.fract().is_zero() {
            return Err(PreconditionError::InvalidAmount(format!(
                "amount must be a whole number of minor units, got {value}"
            ))
            .into());
        }
        Ok(Self(value.normalize()))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
