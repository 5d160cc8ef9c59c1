//! Money Policy Module
//!
//! Ledger amounts are `Decimal` values with at most two fractional digits
//! (one minor unit = 1/100 of the currency). Payment providers speak integer
//! minor units (kobo for NGN), so conversions in both directions live here.
//!
//! Every amount entering a money-moving operation goes through
//! [`AmountPolicy::validate`] before any store call.

use rust_decimal::prelude::*;

use crate::error::LedgerError;

/// Fractional digits of the ledger currency.
pub const MINOR_UNIT_SCALE: u32 = 2;

/// Default floor for transfers and deposit initiation.
pub const DEFAULT_MIN_AMOUNT: Decimal = Decimal::from_parts(10000, 0, 0, false, 2);

/// Amount validation rules for money-moving operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountPolicy {
    minimum: Decimal,
}

impl Default for AmountPolicy {
    fn default() -> Self {
        Self {
            minimum: DEFAULT_MIN_AMOUNT,
        }
    }
}

impl AmountPolicy {
    pub fn new(minimum: Decimal) -> Self {
        Self { minimum }
    }

    pub fn minimum(&self) -> Decimal {
        self.minimum
    }

    /// Check an amount before it reaches the store.
    ///
    /// # Errors
    /// * `InvalidAmount` - zero/negative, more than two decimals, or below the minimum
    pub fn validate(&self, amount: Decimal) -> Result<Decimal, LedgerError> {
        ensure_positive(amount)?;
        if amount.normalize().scale() > MINOR_UNIT_SCALE {
            return Err(LedgerError::InvalidAmount(format!(
                "Amount supports at most {} decimal places",
                MINOR_UNIT_SCALE
            )));
        }
        if amount < self.minimum {
            return Err(LedgerError::InvalidAmount(format!(
                "Amount must be at least {}",
                self.minimum
            )));
        }
        Ok(amount)
    }
}

/// Reject zero and negative amounts.
pub fn ensure_positive(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(
            "Amount must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// Provider minor units (e.g. kobo) → ledger amount.
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, MINOR_UNIT_SCALE)
}

/// Amount with exactly two decimals, as shown to clients.
pub fn at_minor_scale(amount: Decimal) -> Decimal {
    let mut amount = amount;
    amount.rescale(MINOR_UNIT_SCALE);
    amount
}

/// Ledger amount → provider minor units.
///
/// Fails if the amount carries sub-minor-unit precision rather than truncating.
pub fn to_minor_units(amount: Decimal) -> Result<i64, LedgerError> {
    let scaled = amount * Decimal::from(100);
    if scaled.fract() != Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(format!(
            "Amount {} is not a whole number of minor units",
            amount
        )));
    }
    scaled
        .to_i64()
        .ok_or_else(|| LedgerError::InvalidAmount("Amount too large".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_at_minor_scale() {
        assert_eq!(at_minor_scale(Decimal::ZERO).to_string(), "0.00");
        assert_eq!(at_minor_scale(Decimal::from(5000)).to_string(), "5000.00");
        assert_eq!(
            at_minor_scale(Decimal::from_str("12.5").unwrap()).to_string(),
            "12.50"
        );
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_default_minimum() {
        assert_eq!(AmountPolicy::default().minimum(), dec("100.00"));
    }

    #[test]
    fn test_validate_accepts_two_decimals() {
        let policy = AmountPolicy::default();
        assert_eq!(policy.validate(dec("2500")).unwrap(), dec("2500"));
        assert_eq!(policy.validate(dec("100.50")).unwrap(), dec("100.50"));
        // trailing zeros beyond the scale are not extra precision
        assert!(policy.validate(dec("150.5000")).is_ok());
    }

    #[test]
    fn test_validate_rejects_non_positive() {
        let policy = AmountPolicy::new(Decimal::ZERO);
        for raw in ["0", "-1", "-2500.00"] {
            let err = policy.validate(dec(raw)).unwrap_err();
            assert!(matches!(err, LedgerError::InvalidAmount(_)), "{}", raw);
        }
    }

    #[test]
    fn test_validate_rejects_sub_minor_precision() {
        let err = AmountPolicy::default().validate(dec("100.001")).unwrap_err();
        assert!(err.to_string().contains("decimal places"));
    }

    #[test]
    fn test_validate_rejects_below_minimum() {
        let err = AmountPolicy::default().validate(dec("99.99")).unwrap_err();
        assert_eq!(err.to_string(), "Amount must be at least 100.00");
    }

    #[test]
    fn test_minor_unit_conversion() {
        assert_eq!(from_minor_units(500_000), dec("5000"));
        assert_eq!(from_minor_units(12_345), dec("123.45"));
        assert_eq!(to_minor_units(dec("5000")).unwrap(), 500_000);
        assert_eq!(to_minor_units(dec("123.45")).unwrap(), 12_345);
        assert!(to_minor_units(dec("1.005")).is_err());
    }
}
