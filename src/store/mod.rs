//! Storage boundary.
//!
//! Every service operation runs inside one [`UnitOfWork`]: reads and writes go
//! through it and nothing is visible to other requests until [`UnitOfWork::commit`]
//! succeeds. Dropping a unit of work without committing rolls it back.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::aggregates::{Address, CartLine, Category, Order, Owner, Product, User};
use crate::domain::value_objects::{AddressId, CartLineId, CategoryId, OrderId, ProductId, Quantity, UserId};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A uniqueness rule was hit (slug, cart line per owner and product).
    #[error("duplicate value: {0}")]
    Conflict(String),

    /// A stored value broke a column constraint (overflowing quantity, dangling reference).
    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;
}

#[async_trait]
pub trait UnitOfWork: Send {
    // identity records
    async fn find_user(&mut self, id: UserId) -> StoreResult<Option<User>>;
    async fn find_address(&mut self, id: AddressId) -> StoreResult<Option<Address>>;
    async fn addresses_of(&mut self, user: UserId) -> StoreResult<Vec<Address>>;
    async fn insert_address(&mut self, address: &Address) -> StoreResult<()>;
    async fn update_address(&mut self, address: &Address) -> StoreResult<()>;
    async fn delete_address(&mut self, id: AddressId) -> StoreResult<()>;
    /// Whether any order ships to the address.
    async fn address_in_use(&mut self, id: AddressId) -> StoreResult<bool>;

    // catalog
    async fn find_product(&mut self, id: ProductId) -> StoreResult<Option<Product>>;
    async fn find_product_by_slug(&mut self, slug: &str) -> StoreResult<Option<Product>>;
    async fn list_products(&mut self, category: Option<CategoryId>) -> StoreResult<Vec<Product>>;
    async fn insert_product(&mut self, product: &Product) -> StoreResult<()>;
    async fn update_product(&mut self, product: &Product) -> StoreResult<()>;
    /// Case-insensitive substring match on the name, ordered by name.
    async fn search_products(&mut self, term: &str) -> StoreResult<Vec<Product>>;
    /// Also drops the product from every cart.
    async fn delete_product(&mut self, id: ProductId) -> StoreResult<()>;
    /// Whether any order line was priced from the product.
    async fn product_is_ordered(&mut self, id: ProductId) -> StoreResult<bool>;
    async fn list_categories(&mut self) -> StoreResult<Vec<Category>>;
    async fn insert_category(&mut self, category: &Category) -> StoreResult<()>;
    async fn update_category(&mut self, category: &Category) -> StoreResult<()>;
    async fn delete_category(&mut self, id: CategoryId) -> StoreResult<()>;
    /// Number of products filed directly under each category, in one query.
    async fn product_counts(&mut self) -> StoreResult<HashMap<CategoryId, u64>>;

    // cart
    /// Lines of one owner in insertion order.
    async fn cart_lines(&mut self, owner: &Owner) -> StoreResult<Vec<CartLine>>;
    /// Same as [`UnitOfWork::cart_lines`] but the rows stay locked until the unit ends.
    async fn lock_cart_lines(&mut self, owner: &Owner) -> StoreResult<Vec<CartLine>>;
    /// Locks and returns one line.
    async fn find_cart_line(&mut self, id: CartLineId) -> StoreResult<Option<CartLine>>;
    /// Creates the (owner, product) line or adds `quantity` to the existing one.
    async fn add_to_cart_line(&mut self, owner: &Owner, product: ProductId, quantity: Quantity) -> StoreResult<CartLine>;
    async fn set_cart_line_quantity(&mut self, id: CartLineId, quantity: Quantity) -> StoreResult<()>;
    /// Moves a line to a user's cart, clearing its session token.
    async fn reassign_cart_line(&mut self, id: CartLineId, user: UserId) -> StoreResult<()>;
    async fn delete_cart_line(&mut self, id: CartLineId) -> StoreResult<()>;
    /// Deletes exactly these lines; lines added meanwhile are left alone.
    async fn delete_cart_lines(&mut self, ids: &[CartLineId]) -> StoreResult<u64>;
    async fn clear_cart(&mut self, owner: &Owner) -> StoreResult<u64>;

    // orders
    async fn insert_order(&mut self, order: &Order) -> StoreResult<()>;
    async fn find_order(&mut self, id: OrderId) -> StoreResult<Option<Order>>;
    /// Newest first.
    async fn orders_of(&mut self, user: UserId) -> StoreResult<Vec<Order>>;
    /// Newest first.
    async fn all_orders(&mut self) -> StoreResult<Vec<Order>>;
    /// Persists the status of an already stored order; nothing else on it may change.
    async fn save_order_status(&mut self, order: &Order) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
