//! Cart Aggregate
//!
//! A cart is not stored as a row of its own: it is the set of [`CartLine`]s
//! sharing one [`Owner`]. At most one line exists per (owner, product).

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use crate::domain::value_objects::{CartLineId, Money, ProductId, Quantity, QuantityError, UserId};

/// Who a cart line belongs to: a signed-in shopper or an anonymous browser session.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Owner {
    User(UserId),
    Session(String),
}

impl Owner {
    /// Picks the owner for a request. An authenticated identity always wins over a
    /// session token; blank tokens count as absent.
    pub fn resolve(user: Option<UserId>, session: Option<&str>) -> Option<Self> {
        match user {
            Some(id) => Some(Self::User(id)),
            None => Self::session(session?),
        }
    }

    pub fn session(token: &str) -> Option<Self> {
        let token = token.trim();
        (!token.is_empty()).then(|| Self::Session(token.to_string()))
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self { Self::User(id) => Some(*id), Self::Session(_) => None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartLine {
    pub id: CartLineId,
    pub owner: Owner,
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub created_at: DateTime<Utc>,
}

impl CartLine {
    pub fn open(owner: Owner, product_id: ProductId, quantity: Quantity) -> Self {
        Self { id: CartLineId::generate(), owner, product_id, quantity, created_at: Utc::now() }
    }

    /// Adding an already-present product is additive.
    pub fn absorb(&mut self, more: Quantity) -> Result<(), QuantityError> {
        self.quantity = self.quantity.checked_add(more)?;
        Ok(())
    }

    pub fn is_owned_by(&self, user: UserId) -> bool { self.owner == Owner::User(user) }
}

/// Cart line joined with the live product it points at.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedLine {
    pub id: CartLineId,
    pub product_id: ProductId,
    pub product_name: String,
    pub image_url: Option<String>,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub subtotal: Money,
}

impl PricedLine {
    pub fn new(line: &CartLine, product_name: String, image_url: Option<String>, unit_price: Money) -> Self {
        Self {
            id: line.id, product_id: line.product_id, product_name, image_url,
            quantity: line.quantity, unit_price, subtotal: unit_price.times(line.quantity),
        }
    }
}

/// Read model of a cart. Prices are whatever the catalog says right now; they are
/// only frozen once the cart is checked out.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub lines: Vec<PricedLine>,
    pub total_item_count: u64,
    pub subtotal: Money,
}

impl Cart {
    pub fn new(lines: Vec<PricedLine>) -> Self {
        let total_item_count = lines.iter().map(|l| u64::from(l.quantity.value())).sum();
        let subtotal = lines.iter().map(|l| l.subtotal).sum();
        Self { lines, total_item_count, subtotal }
    }

    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeStep {
    /// The user already had the product: set that line to `quantity` and drop the session line.
    Absorb { session_line: CartLineId, into: CartLineId, quantity: Quantity },
    /// The user did not have the product: hand the session line over to the user.
    Adopt { session_line: CartLineId },
}

/// Ordered steps that fold a guest cart into a user's cart.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergePlan {
    steps: Vec<MergeStep>,
}

impl MergePlan {
    /// Session lines are visited in the order given (insertion order). A line adopted
    /// by the user counts as a user line for every later session line.
    pub fn build(session_lines: &[CartLine], user_lines: &[CartLine]) -> Result<Self, QuantityError> {
        let mut held: HashMap<ProductId, (CartLineId, Quantity)> =
            user_lines.iter().map(|l| (l.product_id, (l.id, l.quantity))).collect();
        let mut steps = Vec::with_capacity(session_lines.len());
        for line in session_lines {
            match held.get_mut(&line.product_id) {
                Some((into, qty)) => {
                    *qty = qty.checked_add(line.quantity)?;
                    steps.push(MergeStep::Absorb { session_line: line.id, into: *into, quantity: *qty });
                }
                None => {
                    held.insert(line.product_id, (line.id, line.quantity));
                    steps.push(MergeStep::Adopt { session_line: line.id });
                }
            }
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[MergeStep] { &self.steps }
    pub fn is_empty(&self) -> bool { self.steps.is_empty() }

    pub fn absorbed(&self) -> usize {
        self.steps.iter().filter(|s| matches!(s, MergeStep::Absorb { .. })).count()
    }

    pub fn adopted(&self) -> usize { self.steps.len() - self.absorbed() }
}
