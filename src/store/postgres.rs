//! `PostgreSQL` store.
//!
//! A unit of work is one database transaction. Cart rows touched on a mutation
//! path are read with `FOR UPDATE`; additive adds use `INSERT .. ON CONFLICT`
//! against the partial unique indexes on `(user_id, product_id)` and
//! `(session_token, product_id)`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use super::{Store, StoreError, StoreResult, UnitOfWork};
use crate::domain::aggregates::{Address, CartLine, Category, Order, OrderLine, OrderStatus, Owner, Product, Role, User};
use crate::domain::value_objects::{
    AddressId, CartLineId, CategoryId, Money, OrderId, ProductId, Quantity, UserId,
};

const CART_COLUMNS: &str = "id, user_id, session_token, product_id, quantity, created_at";
const PRODUCT_COLUMNS: &str =
    "id, category_id, name, slug, description, price, image_url, featured, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(PgUnitOfWork { tx: self.pool.begin().await? }))
    }
}

struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[derive(sqlx::FromRow)]
struct UserRow { id: Uuid, email: String, full_name: String, role: String }

#[derive(sqlx::FromRow)]
struct AddressRow { id: Uuid, user_id: Uuid, street: String, city: String, province: String, postal_code: String, country: String }

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid, category_id: Uuid, name: String, slug: String, description: Option<String>, price: Decimal,
    image_url: Option<String>, featured: bool, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CategoryRow { id: Uuid, name: String, slug: String, parent_id: Option<Uuid> }

#[derive(sqlx::FromRow)]
struct CartRow { id: Uuid, user_id: Option<Uuid>, session_token: Option<String>, product_id: Uuid, quantity: i32, created_at: DateTime<Utc> }

#[derive(sqlx::FromRow)]
struct OrderRow { id: Uuid, user_id: Uuid, address_id: Uuid, status: String, total: Decimal, created_at: DateTime<Utc> }

#[derive(sqlx::FromRow)]
struct OrderLineRow { id: Uuid, order_id: Uuid, product_id: Uuid, product_name: String, quantity: i32, unit_price: Decimal }

fn quantity(raw: i32) -> StoreResult<Quantity> {
    Quantity::new(i64::from(raw)).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn db_quantity(q: Quantity) -> i32 {
    // Quantity::MAX is i32::MAX
    i32::try_from(q.value()).unwrap_or(i32::MAX)
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;
    fn try_from(r: UserRow) -> StoreResult<Self> {
        let role = Role::parse(&r.role).ok_or_else(|| StoreError::Corrupt(format!("role '{}'", r.role)))?;
        Ok(User { id: r.id.into(), email: r.email, full_name: r.full_name, role })
    }
}

impl From<AddressRow> for Address {
    fn from(r: AddressRow) -> Self {
        Address {
            id: r.id.into(), user_id: r.user_id.into(), street: r.street, city: r.city,
            province: r.province, postal_code: r.postal_code, country: r.country,
        }
    }
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Product {
            id: r.id.into(), category_id: r.category_id.into(), name: r.name, slug: r.slug,
            description: r.description, price: Money::new(r.price), image_url: r.image_url,
            featured: r.featured, created_at: r.created_at, updated_at: r.updated_at,
        }
    }
}

impl From<CategoryRow> for Category {
    fn from(r: CategoryRow) -> Self {
        Category { id: r.id.into(), name: r.name, slug: r.slug, parent_id: r.parent_id.map(CategoryId::from) }
    }
}

impl TryFrom<CartRow> for CartLine {
    type Error = StoreError;
    fn try_from(r: CartRow) -> StoreResult<Self> {
        let owner = match (r.user_id, r.session_token) {
            (Some(user), None) => Owner::User(user.into()),
            (None, Some(token)) => Owner::Session(token),
            _ => return Err(StoreError::Corrupt(format!("cart line {} must have exactly one owner", r.id))),
        };
        Ok(CartLine { id: r.id.into(), owner, product_id: r.product_id.into(), quantity: quantity(r.quantity)?, created_at: r.created_at })
    }
}

fn owner_columns(owner: &Owner) -> (Option<Uuid>, Option<&str>) {
    match owner {
        Owner::User(id) => (Some(id.as_uuid()), None),
        Owner::Session(token) => (None, Some(token.as_str())),
    }
}

/// Maps constraint failures onto the store's error vocabulary.
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::Conflict(db.constraint().unwrap_or("unique").to_string());
        }
        if db.is_foreign_key_violation() || db.is_check_violation() || db.code().as_deref() == Some("22003") {
            return StoreError::Constraint(db.message().to_string());
        }
    }
    StoreError::Database(err)
}

impl PgUnitOfWork {
    async fn load_orders(&mut self, rows: Vec<OrderRow>) -> StoreResult<Vec<Order>> {
        if rows.is_empty() { return Ok(Vec::new()); }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let line_rows = sqlx::query_as::<_, OrderLineRow>(
            "SELECT id, order_id, product_id, product_name, quantity, unit_price FROM order_lines WHERE order_id = ANY($1) ORDER BY position",
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut lines: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        for l in line_rows {
            lines.entry(l.order_id).or_default().push(OrderLine {
                id: l.id.into(), product_id: l.product_id.into(), product_name: l.product_name,
                quantity: quantity(l.quantity)?, unit_price: Money::new(l.unit_price),
            });
        }

        rows.into_iter()
            .map(|r| {
                let status = OrderStatus::parse(&r.status).ok_or_else(|| StoreError::Corrupt(format!("order status '{}'", r.status)))?;
                Ok(Order::restore(
                    r.id.into(), r.user_id.into(), r.address_id.into(), status,
                    lines.remove(&r.id).unwrap_or_default(), Money::new(r.total), r.created_at,
                ))
            })
            .collect()
    }

    async fn select_cart(&mut self, owner: &Owner, lock: bool) -> StoreResult<Vec<CartLine>> {
        let (user, token) = owner_columns(owner);
        let sql = format!(
            "SELECT {CART_COLUMNS} FROM cart_lines WHERE user_id IS NOT DISTINCT FROM $1 AND session_token IS NOT DISTINCT FROM $2 ORDER BY created_at, id{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        sqlx::query_as::<_, CartRow>(&sql)
            .bind(user)
            .bind(token)
            .fetch_all(&mut *self.tx)
            .await?
            .into_iter()
            .map(CartLine::try_from)
            .collect()
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn find_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, UserRow>("SELECT id, email, full_name, role FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_address(&mut self, id: AddressId) -> StoreResult<Option<Address>> {
        Ok(sqlx::query_as::<_, AddressRow>(
            "SELECT id, user_id, street, city, province, postal_code, country FROM addresses WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(Address::from))
    }

    async fn addresses_of(&mut self, user: UserId) -> StoreResult<Vec<Address>> {
        Ok(sqlx::query_as::<_, AddressRow>(
            "SELECT id, user_id, street, city, province, postal_code, country FROM addresses WHERE user_id = $1 ORDER BY id DESC",
        )
        .bind(user.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?
        .into_iter()
        .map(Address::from)
        .collect())
    }

    async fn insert_address(&mut self, a: &Address) -> StoreResult<()> {
        sqlx::query("INSERT INTO addresses (id, user_id, street, city, province, postal_code, country) VALUES ($1, $2, $3, $4, $5, $6, $7)")
            .bind(a.id.as_uuid()).bind(a.user_id.as_uuid()).bind(&a.street).bind(&a.city)
            .bind(&a.province).bind(&a.postal_code).bind(&a.country)
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn update_address(&mut self, a: &Address) -> StoreResult<()> {
        sqlx::query("UPDATE addresses SET street = $2, city = $3, province = $4, postal_code = $5, country = $6 WHERE id = $1")
            .bind(a.id.as_uuid()).bind(&a.street).bind(&a.city).bind(&a.province).bind(&a.postal_code).bind(&a.country)
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn delete_address(&mut self, id: AddressId) -> StoreResult<()> {
        sqlx::query("DELETE FROM addresses WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn address_in_use(&mut self, id: AddressId) -> StoreResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM orders WHERE address_id = $1)")
            .bind(id.as_uuid())
            .fetch_one(&mut *self.tx)
            .await?)
    }

    async fn find_product(&mut self, id: ProductId) -> StoreResult<Option<Product>> {
        Ok(sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?
            .map(Product::from))
    }

    async fn find_product_by_slug(&mut self, slug: &str) -> StoreResult<Option<Product>> {
        Ok(sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE slug = $1"))
            .bind(slug)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(Product::from))
    }

    async fn list_products(&mut self, category: Option<CategoryId>) -> StoreResult<Vec<Product>> {
        Ok(sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE ($1::uuid IS NULL OR category_id = $1) ORDER BY name"
        ))
        .bind(category.map(|c| c.as_uuid()))
        .fetch_all(&mut *self.tx)
        .await?
        .into_iter()
        .map(Product::from)
        .collect())
    }

    async fn insert_product(&mut self, p: &Product) -> StoreResult<()> {
        sqlx::query(&format!("INSERT INTO products ({PRODUCT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"))
            .bind(p.id.as_uuid()).bind(p.category_id.as_uuid()).bind(&p.name).bind(&p.slug)
            .bind(&p.description).bind(p.price.amount()).bind(&p.image_url).bind(p.featured)
            .bind(p.created_at).bind(p.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn update_product(&mut self, p: &Product) -> StoreResult<()> {
        sqlx::query("UPDATE products SET category_id = $2, name = $3, slug = $4, description = $5, price = $6, image_url = $7, featured = $8, updated_at = $9 WHERE id = $1")
            .bind(p.id.as_uuid()).bind(p.category_id.as_uuid()).bind(&p.name).bind(&p.slug)
            .bind(&p.description).bind(p.price.amount()).bind(&p.image_url).bind(p.featured).bind(p.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn search_products(&mut self, term: &str) -> StoreResult<Vec<Product>> {
        Ok(sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE strpos(lower(name), lower($1)) > 0 ORDER BY name"
        ))
        .bind(term)
        .fetch_all(&mut *self.tx)
        .await?
        .into_iter()
        .map(Product::from)
        .collect())
    }

    async fn delete_product(&mut self, id: ProductId) -> StoreResult<()> {
        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn product_is_ordered(&mut self, id: ProductId) -> StoreResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM order_lines WHERE product_id = $1)")
            .bind(id.as_uuid())
            .fetch_one(&mut *self.tx)
            .await?)
    }

    async fn list_categories(&mut self) -> StoreResult<Vec<Category>> {
        Ok(sqlx::query_as::<_, CategoryRow>("SELECT id, name, slug, parent_id FROM categories ORDER BY name")
            .fetch_all(&mut *self.tx)
            .await?
            .into_iter()
            .map(Category::from)
            .collect())
    }

    async fn insert_category(&mut self, c: &Category) -> StoreResult<()> {
        sqlx::query("INSERT INTO categories (id, name, slug, parent_id) VALUES ($1, $2, $3, $4)")
            .bind(c.id.as_uuid()).bind(&c.name).bind(&c.slug).bind(c.parent_id.map(|p| p.as_uuid()))
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn update_category(&mut self, c: &Category) -> StoreResult<()> {
        sqlx::query("UPDATE categories SET name = $2, slug = $3, parent_id = $4 WHERE id = $1")
            .bind(c.id.as_uuid()).bind(&c.name).bind(&c.slug).bind(c.parent_id.map(|p| p.as_uuid()))
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn delete_category(&mut self, id: CategoryId) -> StoreResult<()> {
        sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn product_counts(&mut self) -> StoreResult<HashMap<CategoryId, u64>> {
        let rows: Vec<(Uuid, i64)> = sqlx::query_as("SELECT category_id, COUNT(*) FROM products GROUP BY category_id")
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.into_iter().map(|(id, n)| (id.into(), u64::try_from(n).unwrap_or(0))).collect())
    }

    async fn cart_lines(&mut self, owner: &Owner) -> StoreResult<Vec<CartLine>> {
        self.select_cart(owner, false).await
    }

    async fn lock_cart_lines(&mut self, owner: &Owner) -> StoreResult<Vec<CartLine>> {
        self.select_cart(owner, true).await
    }

    async fn find_cart_line(&mut self, id: CartLineId) -> StoreResult<Option<CartLine>> {
        sqlx::query_as::<_, CartRow>(&format!("SELECT {CART_COLUMNS} FROM cart_lines WHERE id = $1 FOR UPDATE"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?
            .map(CartLine::try_from)
            .transpose()
    }

    async fn add_to_cart_line(&mut self, owner: &Owner, product: ProductId, qty: Quantity) -> StoreResult<CartLine> {
        let conflict_target = match owner {
            Owner::User(_) => "(user_id, product_id) WHERE user_id IS NOT NULL",
            Owner::Session(_) => "(session_token, product_id) WHERE session_token IS NOT NULL",
        };
        let (user, token) = owner_columns(owner);
        let row = sqlx::query_as::<_, CartRow>(&format!(
            "INSERT INTO cart_lines ({CART_COLUMNS}) VALUES ($1, $2, $3, $4, $5, NOW()) \
             ON CONFLICT {conflict_target} DO UPDATE SET quantity = cart_lines.quantity + EXCLUDED.quantity \
             RETURNING {CART_COLUMNS}"
        ))
        .bind(CartLineId::generate().as_uuid())
        .bind(user)
        .bind(token)
        .bind(product.as_uuid())
        .bind(db_quantity(qty))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(classify)?;
        CartLine::try_from(row)
    }

    async fn set_cart_line_quantity(&mut self, id: CartLineId, qty: Quantity) -> StoreResult<()> {
        sqlx::query("UPDATE cart_lines SET quantity = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(db_quantity(qty))
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn reassign_cart_line(&mut self, id: CartLineId, user: UserId) -> StoreResult<()> {
        sqlx::query("UPDATE cart_lines SET user_id = $2, session_token = NULL WHERE id = $1")
            .bind(id.as_uuid())
            .bind(user.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn delete_cart_line(&mut self, id: CartLineId) -> StoreResult<()> {
        sqlx::query("DELETE FROM cart_lines WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_cart_lines(&mut self, ids: &[CartLineId]) -> StoreResult<u64> {
        let ids: Vec<Uuid> = ids.iter().map(CartLineId::as_uuid).collect();
        let done = sqlx::query("DELETE FROM cart_lines WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&mut *self.tx)
            .await?;
        Ok(done.rows_affected())
    }

    async fn clear_cart(&mut self, owner: &Owner) -> StoreResult<u64> {
        let (user, token) = owner_columns(owner);
        let done = sqlx::query("DELETE FROM cart_lines WHERE user_id IS NOT DISTINCT FROM $1 AND session_token IS NOT DISTINCT FROM $2")
            .bind(user)
            .bind(token)
            .execute(&mut *self.tx)
            .await?;
        Ok(done.rows_affected())
    }

    async fn insert_order(&mut self, o: &Order) -> StoreResult<()> {
        sqlx::query("INSERT INTO orders (id, user_id, address_id, status, total, created_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(o.id().as_uuid()).bind(o.user_id().as_uuid()).bind(o.address_id().as_uuid())
            .bind(o.status().as_str()).bind(o.total().amount()).bind(o.created_at())
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        for (position, l) in o.lines().iter().enumerate() {
            sqlx::query("INSERT INTO order_lines (id, order_id, position, product_id, product_name, quantity, unit_price) VALUES ($1, $2, $3, $4, $5, $6, $7)")
                .bind(l.id.as_uuid()).bind(o.id().as_uuid()).bind(i32::try_from(position).unwrap_or(i32::MAX))
                .bind(l.product_id.as_uuid()).bind(&l.product_name).bind(db_quantity(l.quantity)).bind(l.unit_price.amount())
                .execute(&mut *self.tx)
                .await
                .map_err(classify)?;
        }
        Ok(())
    }

    async fn find_order(&mut self, id: OrderId) -> StoreResult<Option<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT id, user_id, address_id, status, total, created_at FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(self.load_orders(rows).await?.pop())
    }

    async fn orders_of(&mut self, user: UserId) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, address_id, status, total, created_at FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;
        self.load_orders(rows).await
    }

    async fn all_orders(&mut self) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, address_id, status, total, created_at FROM orders ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&mut *self.tx)
        .await?;
        self.load_orders(rows).await
    }

    async fn save_order_status(&mut self, order: &Order) -> StoreResult<()> {
        sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(order.id().as_uuid())
            .bind(order.status().as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(classify)
    }
}
