//! In-process store for development and tests.
//!
//! A unit of work holds the table lock for its whole lifetime and edits a staged
//! copy of the tables; commit swaps the copy in, drop throws it away. Units of
//! work therefore run one at a time, reads included.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Store, StoreError, StoreResult, UnitOfWork};
use crate::domain::aggregates::{Address, CartLine, Category, Order, Owner, Product, User};
use crate::domain::value_objects::{AddressId, CartLineId, CategoryId, OrderId, ProductId, Quantity, UserId};

#[derive(Clone, Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    addresses: Vec<Address>,
    products: Vec<Product>,
    categories: Vec<Category>,
    cart_lines: Vec<CartLine>,
    orders: Vec<Order>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Registers an identity record. Identities are issued outside this service.
    pub async fn add_user(&self, user: User) {
        self.tables.lock().await.users.insert(user.id, user);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = Tables::clone(&guard);
        Ok(Box::new(MemoryUnitOfWork { guard, staged }))
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

impl MemoryUnitOfWork {
    fn line_mut(&mut self, id: CartLineId) -> Option<&mut CartLine> {
        self.staged.cart_lines.iter_mut().find(|l| l.id == id)
    }

    fn check_product(&self, product: &Product) -> StoreResult<()> {
        if self.staged.products.iter().any(|p| p.slug == product.slug && p.id != product.id) {
            return Err(StoreError::Conflict(format!("product slug '{}'", product.slug)));
        }
        if !self.staged.categories.iter().any(|c| c.id == product.category_id) {
            return Err(StoreError::Constraint(format!("unknown category {}", product.category_id)));
        }
        Ok(())
    }

    fn check_category(&self, category: &Category) -> StoreResult<()> {
        if self.staged.categories.iter().any(|c| c.slug == category.slug && c.id != category.id) {
            return Err(StoreError::Conflict(format!("category slug '{}'", category.slug)));
        }
        if let Some(parent) = category.parent_id {
            if parent == category.id || !self.staged.categories.iter().any(|c| c.id == parent) {
                return Err(StoreError::Constraint(format!("invalid parent {parent}")));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn find_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.staged.users.get(&id).cloned())
    }

    async fn find_address(&mut self, id: AddressId) -> StoreResult<Option<Address>> {
        Ok(self.staged.addresses.iter().find(|a| a.id == id).cloned())
    }

    async fn addresses_of(&mut self, user: UserId) -> StoreResult<Vec<Address>> {
        Ok(self.staged.addresses.iter().rev().filter(|a| a.user_id == user).cloned().collect())
    }

    async fn insert_address(&mut self, address: &Address) -> StoreResult<()> {
        if !self.staged.users.contains_key(&address.user_id) {
            return Err(StoreError::Constraint(format!("unknown user {}", address.user_id)));
        }
        self.staged.addresses.push(address.clone());
        Ok(())
    }

    async fn update_address(&mut self, address: &Address) -> StoreResult<()> {
        if let Some(slot) = self.staged.addresses.iter_mut().find(|a| a.id == address.id) {
            *slot = address.clone();
        }
        Ok(())
    }

    async fn delete_address(&mut self, id: AddressId) -> StoreResult<()> {
        if self.staged.orders.iter().any(|o| o.address_id() == id) {
            return Err(StoreError::Constraint(format!("address {id} is still referenced")));
        }
        self.staged.addresses.retain(|a| a.id != id);
        Ok(())
    }

    async fn address_in_use(&mut self, id: AddressId) -> StoreResult<bool> {
        Ok(self.staged.orders.iter().any(|o| o.address_id() == id))
    }

    async fn find_product(&mut self, id: ProductId) -> StoreResult<Option<Product>> {
        Ok(self.staged.products.iter().find(|p| p.id == id).cloned())
    }

    async fn find_product_by_slug(&mut self, slug: &str) -> StoreResult<Option<Product>> {
        Ok(self.staged.products.iter().find(|p| p.slug == slug).cloned())
    }

    async fn list_products(&mut self, category: Option<CategoryId>) -> StoreResult<Vec<Product>> {
        let mut products: Vec<Product> = self.staged.products.iter()
            .filter(|p| category.map_or(true, |c| p.category_id == c))
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()> {
        self.check_product(product)?;
        self.staged.products.push(product.clone());
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> StoreResult<()> {
        self.check_product(product)?;
        if let Some(slot) = self.staged.products.iter_mut().find(|p| p.id == product.id) {
            *slot = product.clone();
        }
        Ok(())
    }

    async fn search_products(&mut self, term: &str) -> StoreResult<Vec<Product>> {
        let needle = term.to_lowercase();
        let mut products: Vec<Product> = self.staged.products.iter()
            .filter(|p| p.name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn delete_product(&mut self, id: ProductId) -> StoreResult<()> {
        if self.staged.orders.iter().any(|o| o.lines().iter().any(|l| l.product_id == id)) {
            return Err(StoreError::Constraint(format!("product {id} is still referenced")));
        }
        self.staged.cart_lines.retain(|l| l.product_id != id);
        self.staged.products.retain(|p| p.id != id);
        Ok(())
    }

    async fn product_is_ordered(&mut self, id: ProductId) -> StoreResult<bool> {
        Ok(self.staged.orders.iter().any(|o| o.lines().iter().any(|l| l.product_id == id)))
    }

    async fn list_categories(&mut self) -> StoreResult<Vec<Category>> {
        Ok(self.staged.categories.clone())
    }

    async fn insert_category(&mut self, category: &Category) -> StoreResult<()> {
        self.check_category(category)?;
        self.staged.categories.push(category.clone());
        Ok(())
    }

    async fn update_category(&mut self, category: &Category) -> StoreResult<()> {
        self.check_category(category)?;
        if let Some(slot) = self.staged.categories.iter_mut().find(|c| c.id == category.id) {
            *slot = category.clone();
        }
        Ok(())
    }

    async fn delete_category(&mut self, id: CategoryId) -> StoreResult<()> {
        if self.staged.categories.iter().any(|c| c.parent_id == Some(id))
            || self.staged.products.iter().any(|p| p.category_id == id)
        {
            return Err(StoreError::Constraint(format!("category {id} is still referenced")));
        }
        self.staged.categories.retain(|c| c.id != id);
        Ok(())
    }

    async fn product_counts(&mut self) -> StoreResult<HashMap<CategoryId, u64>> {
        let mut counts = HashMap::new();
        for p in &self.staged.products {
            *counts.entry(p.category_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn cart_lines(&mut self, owner: &Owner) -> StoreResult<Vec<CartLine>> {
        Ok(self.staged.cart_lines.iter().filter(|l| &l.owner == owner).cloned().collect())
    }

    async fn lock_cart_lines(&mut self, owner: &Owner) -> StoreResult<Vec<CartLine>> {
        self.cart_lines(owner).await
    }

    async fn find_cart_line(&mut self, id: CartLineId) -> StoreResult<Option<CartLine>> {
        Ok(self.staged.cart_lines.iter().find(|l| l.id == id).cloned())
    }

    async fn add_to_cart_line(&mut self, owner: &Owner, product: ProductId, quantity: Quantity) -> StoreResult<CartLine> {
        if let Some(line) = self.staged.cart_lines.iter_mut().find(|l| &l.owner == owner && l.product_id == product) {
            line.absorb(quantity).map_err(|e| StoreError::Constraint(e.to_string()))?;
            return Ok(line.clone());
        }
        let line = CartLine::open(owner.clone(), product, quantity);
        self.staged.cart_lines.push(line.clone());
        Ok(line)
    }

    async fn set_cart_line_quantity(&mut self, id: CartLineId, quantity: Quantity) -> StoreResult<()> {
        if let Some(line) = self.line_mut(id) {
            line.quantity = quantity;
        }
        Ok(())
    }

    async fn reassign_cart_line(&mut self, id: CartLineId, user: UserId) -> StoreResult<()> {
        let target = Owner::User(user);
        let product = match self.staged.cart_lines.iter().find(|l| l.id == id) {
            Some(line) => line.product_id,
            None => return Ok(()),
        };
        if self.staged.cart_lines.iter().any(|l| l.id != id && l.owner == target && l.product_id == product) {
            return Err(StoreError::Conflict(format!("user {user} already has product {product}")));
        }
        if let Some(line) = self.line_mut(id) {
            line.owner = target;
        }
        Ok(())
    }

    async fn delete_cart_line(&mut self, id: CartLineId) -> StoreResult<()> {
        self.staged.cart_lines.retain(|l| l.id != id);
        Ok(())
    }

    async fn delete_cart_lines(&mut self, ids: &[CartLineId]) -> StoreResult<u64> {
        let before = self.staged.cart_lines.len();
        self.staged.cart_lines.retain(|l| !ids.contains(&l.id));
        Ok((before - self.staged.cart_lines.len()) as u64)
    }

    async fn clear_cart(&mut self, owner: &Owner) -> StoreResult<u64> {
        let before = self.staged.cart_lines.len();
        self.staged.cart_lines.retain(|l| &l.owner != owner);
        Ok((before - self.staged.cart_lines.len()) as u64)
    }

    async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
        self.staged.orders.push(order.clone());
        Ok(())
    }

    async fn find_order(&mut self, id: OrderId) -> StoreResult<Option<Order>> {
        Ok(self.staged.orders.iter().find(|o| o.id() == id).cloned())
    }

    async fn orders_of(&mut self, user: UserId) -> StoreResult<Vec<Order>> {
        Ok(self.staged.orders.iter().rev().filter(|o| o.user_id() == user).cloned().collect())
    }

    async fn all_orders(&mut self) -> StoreResult<Vec<Order>> {
        Ok(self.staged.orders.iter().rev().cloned().collect())
    }

    async fn save_order_status(&mut self, order: &Order) -> StoreResult<()> {
        if let Some(slot) = self.staged.orders.iter_mut().find(|o| o.id() == order.id()) {
            *slot = order.clone();
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryUnitOfWork { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}
