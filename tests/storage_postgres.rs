//! PostgreSQL store integration tests.
//!
//! Run with: DATABASE_URL=postgres://... cargo test --test storage_postgres
//!
//! Every test creates its own users, categories and products, so runs can share
//! one database. Without `DATABASE_URL` the tests return early.

use rust_decimal_macros::dec;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use opensase_shop::domain::aggregates::{Address, Order, OrderLine, Owner, Product, ProductDraft, StatusPolicy};
use opensase_shop::domain::value_objects::{AddressId, CartLineId, CategoryId, Money, Quantity, UserId};
use opensase_shop::publisher::EventPublisher;
use opensase_shop::services::{CategoryDraft, Services};
use opensase_shop::store::{PgStore, Store};
use opensase_shop::ShopError;

struct PgShop {
    pool: PgPool,
    store: PgStore,
    services: Services,
    category: CategoryId,
}

impl PgShop {
    async fn connect() -> Option<Self> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping");
            return None;
        };
        let store = PgStore::connect(&url, 5).await.expect("connect to PostgreSQL");
        store.migrate().await.expect("run migrations");
        let pool = PgPool::connect(&url).await.expect("open test pool");
        let services = Services::new(Arc::new(store.clone()), EventPublisher::disabled(), StatusPolicy::Permissive);

        let tag = Uuid::new_v4();
        let category = services
            .catalog
            .create_category(CategoryDraft { name: format!("Test {tag}"), slug: None, parent_id: None })
            .await
            .expect("seed category")
            .id;
        Some(Self { pool, store, services, category })
    }

    async fn customer(&self) -> (UserId, AddressId) {
        let id = UserId::generate();
        sqlx::query("INSERT INTO users (id, email, full_name, role) VALUES ($1, $2, $3, 'CUSTOMER')")
            .bind(id.as_uuid())
            .bind(format!("{id}@example.com"))
            .bind("Test Customer")
            .execute(&self.pool)
            .await
            .expect("seed user");

        let address = Address {
            id: AddressId::generate(), user_id: id, street: "1 Main St".into(), city: "Springfield".into(),
            province: "IL".into(), postal_code: "62701".into(), country: "US".into(),
        };
        let mut uow = self.store.begin().await.unwrap();
        uow.insert_address(&address).await.unwrap();
        uow.commit().await.unwrap();
        (id, address.id)
    }

    async fn product(&self, name: &str, price: rust_decimal::Decimal) -> Product {
        let slug = format!("{}-{}", name.to_lowercase(), Uuid::new_v4());
        self.services
            .catalog
            .create_product(ProductDraft {
                category_id: self.category, name: name.into(), slug, description: None,
                price: Money::new(price), image_url: None, featured: false,
            })
            .await
            .expect("seed product")
    }
}

#[tokio::test]
async fn repeated_add_accumulates_on_one_row() {
    let Some(shop) = PgShop::connect().await else { return };
    let mug = shop.product("Mug", dec!(8.00)).await;
    let session = format!("guest-{}", Uuid::new_v4());

    shop.services.cart.add_item(None, Some(&session), mug.id, Some(2)).await.unwrap();
    let line = shop.services.cart.add_item(None, Some(&session), mug.id, Some(3)).await.unwrap();
    assert_eq!(line.quantity.value(), 5);

    let cart = shop.services.cart.get_cart(None, Some(&session)).await.unwrap();
    assert_eq!(cart.lines.len(), 1);
    assert_eq!(cart.subtotal.amount(), dec!(40.00));
}

#[tokio::test]
async fn overflowing_add_is_rejected_and_keeps_the_line() {
    let Some(shop) = PgShop::connect().await else { return };
    let (user, _) = shop.customer().await;
    let mug = shop.product("Mug", dec!(1.00)).await;

    shop.services.cart.add_item(Some(user), None, mug.id, Some(i64::from(i32::MAX))).await.unwrap();
    let err = shop.services.cart.add_item(Some(user), None, mug.id, Some(1)).await.unwrap_err();
    assert!(matches!(err, ShopError::BadRequest(_)), "{err:?}");

    let cart = shop.services.cart.get_cart(Some(user), None).await.unwrap();
    assert_eq!(cart.lines[0].quantity.value(), Quantity::MAX);
}

#[tokio::test]
async fn transfer_merges_guest_lines_into_user_cart() {
    let Some(shop) = PgShop::connect().await else { return };
    let (user, _) = shop.customer().await;
    let shirt = shop.product("Shirt", dec!(10.00)).await;
    let socks = shop.product("Socks", dec!(5.00)).await;
    let session = format!("guest-{}", Uuid::new_v4());

    shop.services.cart.add_item(Some(user), None, shirt.id, Some(1)).await.unwrap();
    shop.services.cart.add_item(None, Some(&session), shirt.id, Some(2)).await.unwrap();
    shop.services.cart.add_item(None, Some(&session), socks.id, Some(1)).await.unwrap();

    let cart = shop.services.cart.transfer(Some(&session), user).await.unwrap();
    assert_eq!(cart.lines.len(), 2);
    assert_eq!(cart.total_item_count, 4);
    assert!(shop.services.cart.get_cart(None, Some(&session)).await.unwrap().is_empty());

    let again = shop.services.cart.transfer(Some(&session), user).await.unwrap();
    assert_eq!(again.total_item_count, 4);
}

#[tokio::test]
async fn checkout_clears_only_the_lines_it_ordered() {
    let Some(shop) = PgShop::connect().await else { return };
    let (user, address) = shop.customer().await;
    let shirt = shop.product("Shirt", dec!(10.00)).await;
    let socks = shop.product("Socks", dec!(5.00)).await;
    let owner = Owner::User(user);
    shop.services.cart.add_item(Some(user), None, shirt.id, Some(1)).await.unwrap();

    let mut checkout = shop.store.begin().await.unwrap();
    let locked = checkout.lock_cart_lines(&owner).await.unwrap();
    assert_eq!(locked.len(), 1);

    // another request adds to the same cart and commits while checkout is running
    let mut other = shop.store.begin().await.unwrap();
    other.add_to_cart_line(&owner, socks.id, Quantity::new(3).unwrap()).await.unwrap();
    other.commit().await.unwrap();

    let lines = locked.iter().map(|l| OrderLine::new(shirt.id, shirt.name.clone(), l.quantity, shirt.price)).collect();
    let order = Order::place(user, address, lines).unwrap();
    let ids: Vec<CartLineId> = locked.iter().map(|l| l.id).collect();
    checkout.insert_order(&order).await.unwrap();
    assert_eq!(checkout.delete_cart_lines(&ids).await.unwrap(), 1);
    checkout.commit().await.unwrap();

    let mut uow = shop.store.begin().await.unwrap();
    let left = uow.cart_lines(&owner).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].product_id, socks.id);
    assert_eq!(left[0].quantity.value(), 3);
    assert_eq!(uow.find_order(order.id()).await.unwrap().unwrap().lines().len(), 1);
}

#[tokio::test]
async fn concurrent_checkouts_place_one_order() {
    let Some(shop) = PgShop::connect().await else { return };
    let (user, address) = shop.customer().await;
    let shirt = shop.product("Shirt", dec!(10.00)).await;
    let socks = shop.product("Socks", dec!(5.00)).await;
    shop.services.cart.add_item(Some(user), None, shirt.id, Some(2)).await.unwrap();
    shop.services.cart.add_item(Some(user), None, socks.id, Some(1)).await.unwrap();

    let (a, b) = tokio::join!(
        shop.services.orders.checkout(user, address),
        shop.services.orders.checkout(user, address),
    );
    let placed: Vec<_> = [a, b].into_iter().filter_map(Result::ok).collect();
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].total.amount(), dec!(25.00));

    assert_eq!(shop.services.orders.orders_of(user).await.unwrap().len(), 1);
    assert!(shop.services.cart.get_cart(Some(user), None).await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_product_slug_is_a_conflict() {
    let Some(shop) = PgShop::connect().await else { return };
    let mug = shop.product("Mug", dec!(8.00)).await;
    let err = shop
        .services
        .catalog
        .create_product(ProductDraft {
            category_id: shop.category, name: "Other mug".into(), slug: mug.slug.clone(), description: None,
            price: Money::new(dec!(9.00)), image_url: None, featured: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ShopError::Conflict(_)));
}
