//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod category;
pub mod customer;

pub use product::{Product, ProductDraft, ProductError};
pub use order::{Order, OrderError, OrderLine, OrderStatus, StatusPolicy};
pub use cart::{Cart, CartLine, MergePlan, MergeStep, Owner, PricedLine};
pub use category::{Category, CategoryForest, CategoryNode};
pub use customer::{Address, Role, User};
