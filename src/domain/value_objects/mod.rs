//! Value Objects for the storefront

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Fresh time-ordered identifier.
            pub fn generate() -> Self { Self(Uuid::now_v7()) }
            pub const fn from_uuid(id: Uuid) -> Self { Self(id) }
            pub const fn as_uuid(&self) -> Uuid { self.0 }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self { Self(id) }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
        }
    };
}

entity_id!(
    /// Identity record of an authenticated shopper.
    UserId
);
entity_id!(ProductId);
entity_id!(CategoryId);
entity_id!(AddressId);
entity_id!(CartLineId);
entity_id!(OrderId);
entity_id!(OrderLineId);

/// Money value object. Single currency, two decimal places.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self { Self(amount.round_dp(2)) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_negative(&self) -> bool { self.0 < Decimal::ZERO }
    pub fn times(&self, qty: Quantity) -> Money { Money(self.0 * Decimal::from(qty.value())) }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0 + rhs.0) }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self { iter.fold(Money::ZERO, Add::add) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

/// Quantity of a single product on a cart or order line. Always at least one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    /// Upper bound shared with the `INTEGER` quantity columns.
    pub const MAX: u32 = i32::MAX as u32;
    pub const ONE: Quantity = Quantity(1);

    pub fn new(value: i64) -> Result<Self, QuantityError> {
        if value <= 0 { return Err(QuantityError::NotPositive(value)); }
        u32::try_from(value)
            .ok()
            .filter(|v| *v <= Self::MAX)
            .map(Self)
            .ok_or(QuantityError::TooLarge(value))
    }

    pub fn value(&self) -> u32 { self.0 }

    pub fn checked_add(&self, other: Quantity) -> Result<Self, QuantityError> {
        let sum = u64::from(self.0) + u64::from(other.0);
        Self::new(i64::try_from(sum).unwrap_or(i64::MAX))
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(d)?;
        Quantity::new(raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuantityError {
    #[error("quantity must be greater than zero (got {0})")]
    NotPositive(i64),
    #[error("quantity {0} exceeds the maximum per line")]
    TooLarge(i64),
}
