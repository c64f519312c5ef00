//! Value Objects for the marketplace

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("Amount can not be negative")]
    NegativeAmount,
    #[error("Amount can have at most two decimal places")]
    TooPrecise,
    #[error("Amount can not exceed {}", Money::MAX)]
    TooLarge,
    #[error("Quantity must be at least 1")]
    NonPositiveQuantity,
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
}

/// Non-negative monetary amount with at most two decimal places, bounded by
/// the `NUMERIC(10, 2)` columns it is stored in.
///
/// The store runs in a single currency, configured at startup, so the amount
/// carries no currency code of its own.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(try_from = "Decimal", into = "Decimal")]
#[sqlx(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);
    /// 99,999,999.99
    pub const MAX: Money = Money(Decimal::from_parts(1_410_065_407, 2, 0, false, 2));

    pub fn new(amount: Decimal) -> Result<Self, ValueError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(ValueError::NegativeAmount);
        }
        if amount.normalize().scale() > 2 {
            return Err(ValueError::TooPrecise);
        }
        if amount > Self::MAX.0 {
            return Err(ValueError::TooLarge);
        }
        Ok(Self(amount))
    }

    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }

    fn bounded(amount: Option<Decimal>) -> Result<Money, ValueError> {
        amount.filter(|a| *a <= Self::MAX.0).map(Money).ok_or(ValueError::TooLarge)
    }

    pub fn checked_add(&self, other: Money) -> Result<Money, ValueError> {
        Self::bounded(self.0.checked_add(other.0))
    }

    /// `None` when the result would be negative.
    pub fn checked_sub(&self, other: Money) -> Option<Money> {
        if other.0 > self.0 { None } else { Some(Money(self.0 - other.0)) }
    }

    pub fn times(&self, qty: Quantity) -> Result<Money, ValueError> {
        Self::bounded(self.0.checked_mul(Decimal::from(qty.value())))
    }

    pub fn total<I: IntoIterator<Item = Money>>(amounts: I) -> Result<Money, ValueError> {
        amounts.into_iter().try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
    }
}

impl TryFrom<Decimal> for Money {
    type Error = ValueError;
    fn try_from(value: Decimal) -> Result<Self, Self::Error> { Money::new(value) }
}

/// Always two decimal places on the wire, so `0` renders as `"0.00"`.
impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        let mut amount = value.0;
        amount.rescale(2);
        amount
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

/// Quantity of a product in a cart or order line; always at least one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(try_from = "i32", into = "i32")]
#[sqlx(transparent)]
pub struct Quantity(i32);

impl Quantity {
    pub fn new(value: i32) -> Result<Self, ValueError> {
        if value < 1 { return Err(ValueError::NonPositiveQuantity); }
        Ok(Self(value))
    }
    pub fn value(&self) -> i32 { self.0 }
    pub fn add(&self, other: Quantity) -> Self { Self(self.0.saturating_add(other.0)) }
}

impl TryFrom<i32> for Quantity {
    type Error = ValueError;
    fn try_from(value: i32) -> Result<Self, Self::Error> { Quantity::new(value) }
}

impl From<Quantity> for i32 {
    fn from(value: Quantity) -> Self { value.0 }
}

/// Login identifier; trimmed and lowercased on construction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(try_from = "String", into = "String")]
#[sqlx(transparent)]
pub struct Email(String);

impl Email {
    pub fn parse(value: &str) -> Result<Self, ValueError> {
        let value = value.trim().to_lowercase();
        let valid = match value.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        };
        if !valid || value.len() > 254 {
            return Err(ValueError::InvalidEmail(value));
        }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for Email {
    type Error = ValueError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Email::parse(&value) }
}

impl From<Email> for String {
    fn from(value: Email) -> Self { value.0 }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_rejects_negative_and_fractional_cents() {
        assert_eq!(Money::new(Decimal::new(-1, 0)), Err(ValueError::NegativeAmount));
        assert_eq!(Money::new(Decimal::new(1001, 3)), Err(ValueError::TooPrecise));
        assert!(Money::new(Decimal::new(1000, 3)).is_ok());
        assert!(Money::new(Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_money_arithmetic() {
        let price = Money::new(Decimal::new(1250, 2)).unwrap();
        let qty = Quantity::new(3).unwrap();
        assert_eq!(price.times(qty).unwrap().amount(), Decimal::new(3750, 2));
        assert_eq!(price.checked_sub(Money::new(Decimal::new(20, 0)).unwrap()), None);
        assert_eq!(
            price.checked_sub(Money::new(Decimal::new(250, 2)).unwrap()).unwrap().amount(),
            Decimal::new(10, 0)
        );
        let total = Money::total(vec![price, price]).unwrap();
        assert_eq!(total.amount(), Decimal::new(25, 0));
    }

    #[test]
    fn test_money_upper_bound() {
        assert_eq!(Money::MAX.amount(), Decimal::new(9_999_999_999, 2));
        assert!(Money::new(Decimal::new(9_999_999_999, 2)).is_ok());
        assert_eq!(Money::new(Decimal::new(10_000_000_000, 2)), Err(ValueError::TooLarge));
        assert_eq!(Money::new(Decimal::MAX), Err(ValueError::TooLarge));
        assert!(serde_json::from_str::<Money>("\"79228162514264337593543950335\"").is_err());

        let cent = Money::new(Decimal::new(1, 2)).unwrap();
        assert_eq!(Money::MAX.checked_add(cent), Err(ValueError::TooLarge));
        assert_eq!(Money::MAX.times(Quantity::new(2).unwrap()), Err(ValueError::TooLarge));
        assert_eq!(Money::MAX.times(Quantity::new(i32::MAX).unwrap()), Err(ValueError::TooLarge));
        assert_eq!(Money::total(vec![Money::MAX, cent]), Err(ValueError::TooLarge));
    }

    #[test]
    fn test_money_serializes_with_two_places() {
        assert_eq!(serde_json::to_string(&Money::ZERO).unwrap(), "\"0.00\"");
        let five = Money::new(Decimal::new(5, 0)).unwrap();
        assert_eq!(serde_json::to_string(&five).unwrap(), "\"5.00\"");
        assert_eq!(five.to_string(), "5.00");
    }

    #[test]
    fn test_money_deserializes_from_string_and_number() {
        let m: Money = serde_json::from_str("\"19.99\"").unwrap();
        assert_eq!(m.amount(), Decimal::new(1999, 2));
        let m: Money = serde_json::from_str("5").unwrap();
        assert_eq!(m.amount(), Decimal::new(5, 0));
        assert!(serde_json::from_str::<Money>("\"-3\"").is_err());
    }

    #[test]
    fn test_quantity() {
        assert!(Quantity::new(0).is_err());
        assert_eq!(Quantity::new(2).unwrap().add(Quantity::new(3).unwrap()).value(), 5);
        assert!(serde_json::from_str::<Quantity>("0").is_err());
    }

    #[test]
    fn test_email() {
        assert_eq!(Email::parse("  Buyer@Example.COM ").unwrap().as_str(), "buyer@example.com");
        assert!(Email::parse("no-at-sign").is_err());
        assert!(Email::parse("a@b").is_err());
        assert!(Email::parse("@example.com").is_err());
    }
}
