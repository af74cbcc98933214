//! Domain events
use crate::domain::aggregates::OrderStatus;
use crate::domain::value_objects::{Money, OrderId, UserId};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Cart(CartEvent),
    Order(OrderEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CartEvent {
    Transferred { user_id: UserId, absorbed: usize, adopted: usize },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: OrderId, user_id: UserId, total: Money, lines: usize },
    StatusChanged { order_id: OrderId, from: OrderStatus, to: OrderStatus },
}

impl DomainEvent {
    /// Subject suffix used when the event leaves the process.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cart(CartEvent::Transferred { .. }) => "cart.transferred",
            Self::Order(OrderEvent::Placed { .. }) => "order.placed",
            Self::Order(OrderEvent::StatusChanged { .. }) => "order.status_changed",
        }
    }
}
