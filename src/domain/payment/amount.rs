//! Exact monetary amounts.
//!
//! Amounts are parsed into `rust_decimal::Decimal`, so `"100.10"` and
//! `"100.100000"` compare equal while `"100.10"` and `"100.104"` do not,
//! regardless of how either would render after rounding.

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::ValidationError;

/// Number of fractional digits used on the wire and in storage.
pub const MINOR_UNIT_DIGITS: u32 = 2;

/// A strictly positive, exact decimal amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    /// Parses a plain decimal string (`"1790"`, `"1790.00"`, `"1790.000000"`).
    ///
    /// Signs, exponents, separators and surrounding whitespace are rejected,
    /// as are zero and values that cannot be held without rounding.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.is_empty() {
            return Err(ValidationError::empty_field("amount"));
        }
        if !is_plain_decimal(raw) {
            return Err(ValidationError::invalid_format(
                "amount",
                format!("'{}' is not a plain decimal number", raw),
            ));
        }
        let value = Decimal::from_str_exact(without_trailing_zeros(raw)).map_err(|_| {
            ValidationError::invalid_format(
                "amount",
                format!("'{}' has more digits than can be represented exactly", raw),
            )
        })?;
        Self::try_from(value)
    }

    /// Parses an amount for a new payment.
    ///
    /// In addition to [`Amount::parse`], the value must be representable in
    /// minor units so that its signing form is lossless.
    pub fn parse_payable(raw: &str) -> Result<Self, ValidationError> {
        let amount = Self::parse(raw)?;
        if amount.0.normalize().scale() > MINOR_UNIT_DIGITS {
            return Err(ValidationError::invalid_format(
                "amount",
                format!("at most {} fractional digits are allowed", MINOR_UNIT_DIGITS),
            ));
        }
        Ok(amount)
    }

    pub fn as_decimal(&self) -> &Decimal {
        &self.0
    }

    /// Fixed two-decimal rendering used for signatures and persistence.
    pub fn to_signing_string(&self) -> String {
        let mut rounded = self
            .0
            .round_dp_with_strategy(MINOR_UNIT_DIGITS, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(MINOR_UNIT_DIGITS);
        rounded.to_string()
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = ValidationError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        if value <= Decimal::ZERO {
            return Err(ValidationError::invalid_format(
                "amount",
                "must be greater than zero",
            ));
        }
        Ok(Self(value))
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_signing_string())
    }
}

/// Compares two decimal strings by exact numeric value.
pub fn amounts_equal(a: &str, b: &str) -> Result<bool, ValidationError> {
    Ok(Amount::parse(a)? == Amount::parse(b)?)
}

/// Trailing fractional zeros carry no value; dropping them keeps long but
/// exact inputs such as `"100.100000000000000000000000000000"` in range.
fn without_trailing_zeros(raw: &str) -> &str {
    if raw.contains('.') {
        raw.trim_end_matches('0').trim_end_matches('.')
    } else {
        raw
    }
}

fn is_plain_decimal(raw: &str) -> bool {
    let (int_part, frac_part) = match raw.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (raw, None),
    };
    let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    match frac_part {
        Some(frac) => !int_part.is_empty() && !frac.is_empty() && digits(int_part) && digits(frac),
        None => !int_part.is_empty() && digits(int_part),
    }
}

/// ISO 4217 currency code, fixed at payment creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency(String);

impl Currency {
    pub fn new(code: impl Into<String>) -> Result<Self, ValidationError> {
        let code = code.into();
        if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(ValidationError::invalid_format(
                "currency",
                "expected a three-letter uppercase code",
            ));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ══════════════════════════════════════════════════════════════
    // Parsing
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn parses_plain_decimals() {
        assert!(Amount::parse("1790").is_ok());
        assert!(Amount::parse("1790.00").is_ok());
        assert!(Amount::parse("0.01").is_ok());
    }

    #[test]
    fn rejects_non_positive_amounts() {
        assert!(Amount::parse("0").is_err());
        assert!(Amount::parse("0.00").is_err());
        assert!(Amount::parse("-1.00").is_err());
    }

    #[test]
    fn rejects_unparsable_amounts() {
        for raw in ["", "abc", "1,00", "1e3", "+1", " 1", "1.", ".5", "1.2.3", "1_000"] {
            assert!(Amount::parse(raw).is_err(), "expected '{}' to be rejected", raw);
        }
    }

    #[test]
    fn excess_precision_is_rejected_not_rounded() {
        let err = Amount::parse("1790.00000000000000000000000001").unwrap_err();
        assert!(err.to_string().contains("represented exactly"), "{}", err);
        assert!(amounts_equal("1790.00000000000000000000000001", "1790.00").is_err());
    }

    #[test]
    fn tiny_positive_amount_is_not_reported_as_zero() {
        let err = Amount::parse("0.000000000000000000000000000001").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("represented exactly"), "{}", message);
        assert!(!message.contains("greater than zero"), "{}", message);
    }

    #[test]
    fn long_trailing_zeros_are_still_exact() {
        let long = Amount::parse("100.100000000000000000000000000000").unwrap();
        assert_eq!(long, Amount::parse("100.10").unwrap());
        assert!(Amount::parse("0.000000000000000000000000000000").is_err());
    }

    #[test]
    fn payable_amount_limits_fractional_digits() {
        assert!(Amount::parse_payable("100.10").is_ok());
        assert!(Amount::parse_payable("100.100000").is_ok());
        assert!(Amount::parse_payable("100.105").is_err());
    }

    // ══════════════════════════════════════════════════════════════
    // Equality and formatting
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn trailing_zeros_do_not_affect_equality() {
        assert!(amounts_equal("100.10", "100.100000").unwrap());
        assert!(amounts_equal("1790", "1790.00").unwrap());
    }

    #[test]
    fn values_that_round_alike_are_not_equal() {
        let stored = Amount::parse("100.10").unwrap();
        let callback = Amount::parse("100.104").unwrap();

        assert_eq!(stored.to_signing_string(), callback.to_signing_string());
        assert_ne!(stored, callback);
    }

    #[test]
    fn signing_string_has_two_decimals() {
        assert_eq!(Amount::parse("1790").unwrap().to_signing_string(), "1790.00");
        assert_eq!(Amount::parse("100.1").unwrap().to_signing_string(), "100.10");
        assert_eq!(
            Amount::parse("100.100000").unwrap().to_signing_string(),
            "100.10"
        );
    }

    #[test]
    fn serde_rejects_non_positive_values() {
        let ok: Amount = serde_json::from_str("\"12.50\"").unwrap();
        assert_eq!(ok.to_signing_string(), "12.50");
        assert!(serde_json::from_str::<Amount>("\"0\"").is_err());
    }

    #[test]
    fn currency_requires_three_uppercase_letters() {
        assert!(Currency::new("RUB").is_ok());
        assert!(Currency::new("rub").is_err());
        assert!(Currency::new("RUBL").is_err());
    }

    proptest! {
        #[test]
        fn equal_values_with_extra_zeros_compare_equal(
            units in 1u64..10_000_000,
            cents in 0u32..100,
            zeros in 0usize..8,
        ) {
            let a = format!("{}.{:02}", units, cents);
            let b = format!("{}{}", a, "0".repeat(zeros));
            prop_assert!(amounts_equal(&a, &b).unwrap());
        }
    }
}
