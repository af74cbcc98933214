//! Checkout and order administration.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::require_user;
use crate::auth::Principal;
use crate::domain::aggregates::{Address, Order, OrderError, OrderLine, OrderStatus, Owner, StatusPolicy};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{AddressId, CartLineId, Money, OrderId, UserId};
use crate::publisher::EventPublisher;
use crate::store::{Store, UnitOfWork};
use crate::{Result, ShopError};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineView {
    #[serde(flatten)]
    pub line: OrderLine,
    pub subtotal: Money,
}

/// Order as returned to clients, with its shipping address rendered in.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total: Money,
    pub created_at: DateTime<Utc>,
    pub address: Option<Address>,
    pub lines: Vec<OrderLineView>,
}

impl OrderView {
    fn new(order: &Order, address: Option<Address>) -> Self {
        Self {
            id: order.id(),
            user_id: order.user_id(),
            status: order.status(),
            total: order.total(),
            created_at: order.created_at(),
            address,
            lines: order.lines().iter().map(|l| OrderLineView { line: l.clone(), subtotal: l.subtotal() }).collect(),
        }
    }
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
    events: EventPublisher,
    policy: StatusPolicy,
}

async fn render(uow: &mut dyn UnitOfWork, orders: Vec<Order>) -> Result<Vec<OrderView>> {
    let mut views = Vec::with_capacity(orders.len());
    for order in &orders {
        let address = uow.find_address(order.address_id()).await?;
        views.push(OrderView::new(order, address));
    }
    Ok(views)
}

impl OrderService {
    pub fn new(store: Arc<dyn Store>, events: EventPublisher, policy: StatusPolicy) -> Self {
        Self { store, events, policy }
    }

    /// Turns the user's cart into a pending order at today's prices and empties
    /// the cart. Either all of it happens or none of it does.
    #[instrument(skip(self))]
    pub async fn checkout(&self, user: UserId, address_id: AddressId) -> Result<OrderView> {
        let mut uow = self.store.begin().await?;
        require_user(&mut *uow, user).await?;
        let address = uow.find_address(address_id).await?.ok_or_else(|| ShopError::not_found("Address", address_id))?;
        if !address.belongs_to(user) {
            warn!(user = %user, address = %address_id, "checkout with someone else's address");
            return Err(ShopError::BadRequest("Address does not belong to the user".into()));
        }

        let owner = Owner::User(user);
        let cart = uow.lock_cart_lines(&owner).await?;
        if cart.is_empty() {
            return Err(OrderError::NoItems.into());
        }

        let mut lines = Vec::with_capacity(cart.len());
        for line in &cart {
            let product = uow.find_product(line.product_id).await?.ok_or_else(|| ShopError::not_found("Product", line.product_id))?;
            lines.push(OrderLine::new(product.id, product.name, line.quantity, product.price));
        }
        let order = Order::place(user, address_id, lines)?;

        let ordered: Vec<CartLineId> = cart.iter().map(|l| l.id).collect();
        uow.insert_order(&order).await?;
        uow.delete_cart_lines(&ordered).await?;
        uow.commit().await?;

        info!(order = %order.id(), user = %user, total = %order.total(), lines = order.lines().len(), "order placed");
        self.events
            .publish(vec![DomainEvent::Order(OrderEvent::Placed {
                order_id: order.id(),
                user_id: user,
                total: order.total(),
                lines: order.lines().len(),
            })])
            .await;
        Ok(OrderView::new(&order, Some(address)))
    }

    /// The caller's orders, newest first.
    #[instrument(skip(self))]
    pub async fn orders_of(&self, user: UserId) -> Result<Vec<OrderView>> {
        let mut uow = self.store.begin().await?;
        require_user(&mut *uow, user).await?;
        let orders = uow.orders_of(user).await?;
        render(&mut *uow, orders).await
    }

    /// One order. Customers only see their own; administrators see any.
    #[instrument(skip(self))]
    pub async fn order(&self, caller: Principal, id: OrderId) -> Result<OrderView> {
        let mut uow = self.store.begin().await?;
        let order = uow.find_order(id).await?.ok_or_else(|| ShopError::not_found("Order", id))?;
        if order.user_id() != caller.user_id && !caller.admin {
            return Err(ShopError::Forbidden("Order belongs to another user".into()));
        }
        let address = uow.find_address(order.address_id()).await?;
        Ok(OrderView::new(&order, address))
    }

    #[instrument(skip(self))]
    pub async fn all_orders(&self) -> Result<Vec<OrderView>> {
        let mut uow = self.store.begin().await?;
        let orders = uow.all_orders().await?;
        render(&mut *uow, orders).await
    }

    /// Sets the status of an order. `raw` is matched case-insensitively against
    /// the known statuses.
    #[instrument(skip(self))]
    pub async fn set_status(&self, id: OrderId, raw: &str) -> Result<OrderView> {
        let to = OrderStatus::parse(raw).ok_or_else(|| ShopError::BadRequest(format!("Unknown order status '{}'", raw.trim())))?;

        let mut uow = self.store.begin().await?;
        let mut order = uow.find_order(id).await?.ok_or_else(|| ShopError::not_found("Order", id))?;
        let from = order.transition(to, self.policy)?;
        if from == to {
            let address = uow.find_address(order.address_id()).await?;
            return Ok(OrderView::new(&order, address));
        }
        uow.save_order_status(&order).await?;
        let address = uow.find_address(order.address_id()).await?;
        uow.commit().await?;

        info!(order = %id, %from, %to, "order status changed");
        self.events.publish(vec![DomainEvent::Order(OrderEvent::StatusChanged { order_id: id, from, to })]).await;
        Ok(OrderView::new(&order, address))
    }
}
