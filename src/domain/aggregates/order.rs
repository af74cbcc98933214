//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use crate::domain::value_objects::{AddressId, Money, OrderId, OrderLineId, ProductId, Quantity, UserId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    address_id: AddressId,
    status: OrderStatus,
    lines: Vec<OrderLine>,
    total: Money,
    created_at: DateTime<Utc>,
}

/// One purchased product. `unit_price` is copied from the catalog at checkout and
/// never re-read afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub id: OrderLineId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: Quantity,
    pub unit_price: Money,
}

impl OrderLine {
    pub fn new(product_id: ProductId, product_name: impl Into<String>, quantity: Quantity, unit_price: Money) -> Self {
        Self { id: OrderLineId::generate(), product_id, product_name: product_name.into(), quantity, unit_price }
    }

    pub fn subtotal(&self) -> Money { self.unit_price.times(self.quantity) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus { #[default] Pending, Confirmed, Preparing, Shipped, Delivered, Cancelled, Returned }

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        Self::Pending, Self::Confirmed, Self::Preparing, Self::Shipped,
        Self::Delivered, Self::Cancelled, Self::Returned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Preparing => "PREPARING",
            Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
            Self::Returned => "RETURNED",
        }
    }

    /// Case-insensitive, surrounding whitespace ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        let wanted = raw.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|s| s.as_str() == wanted)
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Cancelled | Self::Returned) }

    /// Next step along the fulfilment path, if any.
    fn successor(&self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Confirmed),
            Self::Confirmed => Some(Self::Preparing),
            Self::Preparing => Some(Self::Shipped),
            Self::Shipped => Some(Self::Delivered),
            Self::Delivered | Self::Cancelled | Self::Returned => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Which status changes an administrator may make.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatusPolicy {
    /// Any listed status may be set from any other.
    #[default]
    Permissive,
    /// Forward one step at a time; CANCELLED before delivery; RETURNED from any non-terminal state.
    Sequential,
}

impl StatusPolicy {
    pub fn allows(&self, from: OrderStatus, to: OrderStatus) -> bool {
        if from == to { return true; }
        match self {
            Self::Permissive => true,
            Self::Sequential => match to {
                OrderStatus::Cancelled => !from.is_terminal() && from != OrderStatus::Delivered,
                OrderStatus::Returned => !from.is_terminal(),
                _ => from.successor() == Some(to),
            },
        }
    }
}

impl Order {
    /// Freezes the given lines into a new pending order. `lines` must not be empty.
    pub fn place(user_id: UserId, address_id: AddressId, lines: Vec<OrderLine>) -> Result<Self, OrderError> {
        if lines.is_empty() { return Err(OrderError::NoItems); }
        let total = lines.iter().map(OrderLine::subtotal).sum();
        Ok(Self {
            id: OrderId::generate(), user_id, address_id, status: OrderStatus::Pending,
            lines, total, created_at: Utc::now(),
        })
    }

    /// Rebuilds an order from storage.
    pub fn restore(id: OrderId, user_id: UserId, address_id: AddressId, status: OrderStatus, lines: Vec<OrderLine>, total: Money, created_at: DateTime<Utc>) -> Self {
        Self { id, user_id, address_id, status, lines, total, created_at }
    }

    pub fn id(&self) -> OrderId { self.id }
    pub fn user_id(&self) -> UserId { self.user_id }
    pub fn address_id(&self) -> AddressId { self.address_id }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn lines(&self) -> &[OrderLine] { &self.lines }
    pub fn total(&self) -> Money { self.total }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    pub fn transition(&mut self, to: OrderStatus, policy: StatusPolicy) -> Result<OrderStatus, OrderError> {
        if !policy.allows(self.status, to) {
            return Err(OrderError::IllegalTransition { from: self.status, to });
        }
        Ok(std::mem::replace(&mut self.status, to))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum OrderError { NoItems, IllegalTransition { from: OrderStatus, to: OrderStatus } }
impl std::error::Error for OrderError {}
impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoItems => write!(f, "Cannot checkout an empty cart"),
            Self::IllegalTransition { from, to } => write!(f, "Order cannot move from {from} to {to}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(qty: i64, price: rust_decimal::Decimal) -> OrderLine {
        OrderLine::new(ProductId::generate(), "Widget", Quantity::new(qty).unwrap(), Money::new(price))
    }

    #[test]
    fn test_place_totals_lines() {
        let order = Order::place(UserId::generate(), AddressId::generate(), vec![line(2, dec!(10.00)), line(1, dec!(5.00))]).unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.total().amount(), dec!(25.00));
        assert_eq!(order.lines()[0].subtotal().amount(), dec!(20.00));
    }

    #[test]
    fn test_place_without_lines_fails() {
        assert_eq!(Order::place(UserId::generate(), AddressId::generate(), vec![]).unwrap_err(), OrderError::NoItems);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(OrderStatus::parse(" shipped "), Some(OrderStatus::Shipped));
        assert_eq!(OrderStatus::parse("LOST"), None);
    }

    #[test]
    fn test_permissive_policy_allows_reversal() {
        let mut order = Order::place(UserId::generate(), AddressId::generate(), vec![line(1, dec!(1))]).unwrap();
        order.transition(OrderStatus::Delivered, StatusPolicy::Permissive).unwrap();
        let previous = order.transition(OrderStatus::Pending, StatusPolicy::Permissive).unwrap();
        assert_eq!(previous, OrderStatus::Delivered);
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn test_sequential_policy() {
        let p = StatusPolicy::Sequential;
        assert!(p.allows(OrderStatus::Pending, OrderStatus::Confirmed));
        assert!(!p.allows(OrderStatus::Pending, OrderStatus::Shipped));
        assert!(p.allows(OrderStatus::Shipped, OrderStatus::Cancelled));
        assert!(!p.allows(OrderStatus::Delivered, OrderStatus::Cancelled));
        assert!(p.allows(OrderStatus::Delivered, OrderStatus::Returned));
        assert!(!p.allows(OrderStatus::Cancelled, OrderStatus::Returned));
        assert!(p.allows(OrderStatus::Cancelled, OrderStatus::Cancelled));
    }
}
