//! Application services.
//!
//! Every public operation opens one unit of work, does all of its reads and
//! writes through it and commits once. Events are handed to the publisher only
//! after the commit went through.

pub mod cart;
pub mod catalog;
pub mod customers;
pub mod orders;

pub use cart::CartService;
pub use catalog::{CatalogService, CategoryDraft};
pub use customers::{AddressDraft, AddressPatch, CustomerService};
pub use orders::{OrderLineView, OrderService, OrderView};

use std::sync::Arc;

use crate::domain::aggregates::{StatusPolicy, User};
use crate::domain::value_objects::UserId;
use crate::publisher::EventPublisher;
use crate::store::{Store, UnitOfWork};
use crate::{Result, ShopError};

#[derive(Clone)]
pub struct Services {
    pub cart: CartService,
    pub orders: OrderService,
    pub catalog: CatalogService,
    pub customers: CustomerService,
}

impl Services {
    pub fn new(store: Arc<dyn Store>, events: EventPublisher, policy: StatusPolicy) -> Self {
        Self {
            cart: CartService::new(store.clone(), events.clone()),
            orders: OrderService::new(store.clone(), events, policy),
            catalog: CatalogService::new(store.clone()),
            customers: CustomerService::new(store),
        }
    }
}

/// Identity record of an authenticated caller.
pub(crate) async fn require_user(uow: &mut dyn UnitOfWork, id: UserId) -> Result<User> {
    uow.find_user(id).await?.ok_or_else(|| ShopError::not_found("User", id))
}

#[cfg(test)]
pub(crate) mod fixture {
    use super::*;
    use crate::domain::aggregates::{Address, Category, Product, ProductDraft, Role};
    use crate::domain::value_objects::{AddressId, CategoryId, Money};
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;

    /// In-memory shop with one category, two customers (each with an address) and an admin.
    pub struct Fixture {
        pub store: MemoryStore,
        pub services: Services,
        pub category: CategoryId,
        pub alice: UserId,
        pub bob: UserId,
        pub admin: UserId,
        pub alice_address: AddressId,
        pub bob_address: AddressId,
    }

    impl Fixture {
        pub async fn new() -> Self {
            Self::with_policy(StatusPolicy::Permissive).await
        }

        pub async fn with_policy(policy: StatusPolicy) -> Self {
            let store = MemoryStore::new();
            let alice = user(&store, "alice@example.com", Role::Customer).await;
            let bob = user(&store, "bob@example.com", Role::Customer).await;
            let admin = user(&store, "admin@example.com", Role::Admin).await;

            let category = Category { id: CategoryId::generate(), name: "Apparel".into(), slug: "apparel".into(), parent_id: None };
            let alice_address = address(alice);
            let bob_address = address(bob);
            let mut uow = store.begin().await.unwrap();
            uow.insert_category(&category).await.unwrap();
            uow.insert_address(&alice_address).await.unwrap();
            uow.insert_address(&bob_address).await.unwrap();
            uow.commit().await.unwrap();

            let services = Services::new(Arc::new(store.clone()), EventPublisher::disabled(), policy);
            Self {
                store, services, category: category.id, alice, bob, admin,
                alice_address: alice_address.id, bob_address: bob_address.id,
            }
        }

        pub async fn product(&self, name: &str, price: Decimal) -> Product {
            let product = Product::create(ProductDraft {
                category_id: self.category,
                name: name.into(),
                slug: name.to_lowercase().replace(' ', "-"),
                description: None,
                price: Money::new(price),
                image_url: None,
                featured: false,
            })
            .unwrap();
            let mut uow = self.store.begin().await.unwrap();
            uow.insert_product(&product).await.unwrap();
            uow.commit().await.unwrap();
            product
        }
    }

    async fn user(store: &MemoryStore, email: &str, role: Role) -> UserId {
        let id = UserId::generate();
        store.add_user(User { id, email: email.into(), full_name: email.into(), role }).await;
        id
    }

    fn address(user_id: UserId) -> Address {
        Address {
            id: AddressId::generate(), user_id, street: "1 Main St".into(), city: "Springfield".into(),
            province: "IL".into(), postal_code: "62701".into(), country: "US".into(),
        }
    }
}
