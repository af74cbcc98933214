//! Cart lifecycle: guest and customer carts, and the merge at login.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::require_user;
use crate::domain::aggregates::{Cart, CartLine, MergePlan, MergeStep, Owner, PricedLine};
use crate::domain::events::{CartEvent, DomainEvent};
use crate::domain::value_objects::{CartLineId, ProductId, Quantity, UserId};
use crate::publisher::EventPublisher;
use crate::store::{Store, UnitOfWork};
use crate::{Result, ShopError};

#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Store>,
    events: EventPublisher,
}

fn owner(user: Option<UserId>, session: Option<&str>) -> Result<Owner> {
    Owner::resolve(user, session)
        .ok_or_else(|| ShopError::BadRequest("A signed-in user or a session id is required".into()))
}

/// Joins lines with their products at current prices.
async fn price(uow: &mut dyn UnitOfWork, lines: &[CartLine]) -> Result<Cart> {
    let mut priced = Vec::with_capacity(lines.len());
    for line in lines {
        match uow.find_product(line.product_id).await? {
            Some(p) => priced.push(PricedLine::new(line, p.name, p.image_url, p.price)),
            None => warn!(line = %line.id, product = %line.product_id, "cart line points at a missing product"),
        }
    }
    Ok(Cart::new(priced))
}

impl CartService {
    pub fn new(store: Arc<dyn Store>, events: EventPublisher) -> Self { Self { store, events } }

    #[instrument(skip(self, session))]
    pub async fn get_cart(&self, user: Option<UserId>, session: Option<&str>) -> Result<Cart> {
        let owner = owner(user, session)?;
        let mut uow = self.store.begin().await?;
        if let Some(id) = owner.user_id() {
            require_user(&mut *uow, id).await?;
        }
        let lines = uow.cart_lines(&owner).await?;
        price(&mut *uow, &lines).await
    }

    /// Adds `quantity` (default 1) of a product. Repeated adds accumulate on one line.
    #[instrument(skip(self, session))]
    pub async fn add_item(&self, user: Option<UserId>, session: Option<&str>, product_id: ProductId, quantity: Option<i64>) -> Result<PricedLine> {
        let owner = owner(user, session)?;
        let quantity = Quantity::new(quantity.unwrap_or(1))?;

        let mut uow = self.store.begin().await?;
        if let Some(id) = owner.user_id() {
            require_user(&mut *uow, id).await?;
        }
        let product = uow.find_product(product_id).await?.ok_or_else(|| ShopError::not_found("Product", product_id))?;
        let line = uow.add_to_cart_line(&owner, product_id, quantity).await?;
        uow.commit().await?;

        info!(line = %line.id, product = %product_id, quantity = line.quantity.value(), "cart line added");
        Ok(PricedLine::new(&line, product.name, product.image_url, product.price))
    }

    /// Replaces the quantity of a line. Authenticated callers may only touch their own lines.
    #[instrument(skip(self))]
    pub async fn update_quantity(&self, line_id: CartLineId, quantity: i64, caller: Option<UserId>) -> Result<PricedLine> {
        let quantity = Quantity::new(quantity)?;
        let mut uow = self.store.begin().await?;
        let mut line = Self::owned_line(&mut *uow, line_id, caller).await?;
        uow.set_cart_line_quantity(line_id, quantity).await?;
        line.quantity = quantity;
        let product = uow.find_product(line.product_id).await?.ok_or_else(|| ShopError::not_found("Product", line.product_id))?;
        uow.commit().await?;

        info!(line = %line_id, quantity = quantity.value(), "cart line updated");
        Ok(PricedLine::new(&line, product.name, product.image_url, product.price))
    }

    #[instrument(skip(self))]
    pub async fn remove_item(&self, line_id: CartLineId, caller: Option<UserId>) -> Result<()> {
        let mut uow = self.store.begin().await?;
        Self::owned_line(&mut *uow, line_id, caller).await?;
        uow.delete_cart_line(line_id).await?;
        uow.commit().await?;
        info!(line = %line_id, "cart line removed");
        Ok(())
    }

    /// Empties the cart. Clearing an empty cart is not an error.
    #[instrument(skip(self, session))]
    pub async fn clear_cart(&self, user: Option<UserId>, session: Option<&str>) -> Result<u64> {
        let owner = owner(user, session)?;
        let mut uow = self.store.begin().await?;
        let removed = uow.clear_cart(&owner).await?;
        uow.commit().await?;
        info!(removed, "cart cleared");
        Ok(removed)
    }

    /// Folds the guest cart of `session` into the user's cart and returns the result.
    /// Running it again for the same token changes nothing.
    #[instrument(skip(self, session))]
    pub async fn transfer(&self, session: Option<&str>, user: UserId) -> Result<Cart> {
        let mut uow = self.store.begin().await?;
        require_user(&mut *uow, user).await?;
        let target = Owner::User(user);

        let plan = match session.and_then(Owner::session) {
            Some(guest) => {
                let session_lines = uow.lock_cart_lines(&guest).await?;
                let user_lines = uow.lock_cart_lines(&target).await?;
                MergePlan::build(&session_lines, &user_lines)?
            }
            None => MergePlan::default(),
        };

        for step in plan.steps() {
            match step {
                MergeStep::Absorb { session_line, into, quantity } => {
                    uow.set_cart_line_quantity(*into, *quantity).await?;
                    uow.delete_cart_line(*session_line).await?;
                }
                MergeStep::Adopt { session_line } => uow.reassign_cart_line(*session_line, user).await?,
            }
        }

        let lines = uow.cart_lines(&target).await?;
        let cart = price(&mut *uow, &lines).await?;
        uow.commit().await?;

        if !plan.is_empty() {
            info!(user = %user, absorbed = plan.absorbed(), adopted = plan.adopted(), "guest cart transferred");
            self.events
                .publish(vec![DomainEvent::Cart(CartEvent::Transferred { user_id: user, absorbed: plan.absorbed(), adopted: plan.adopted() })])
                .await;
        }
        Ok(cart)
    }

    async fn owned_line(uow: &mut dyn UnitOfWork, id: CartLineId, caller: Option<UserId>) -> Result<CartLine> {
        let line = uow.find_cart_line(id).await?.ok_or_else(|| ShopError::not_found("Cart line", id))?;
        if let Some(user) = caller {
            if !line.is_owned_by(user) {
                warn!(line = %id, caller = %user, "cart line belongs to someone else");
                return Err(ShopError::Forbidden("Cart line belongs to another user".into()));
            }
        }
        Ok(line)
    }
}
