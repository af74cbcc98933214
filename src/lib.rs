//! OpenSASE Shop
//!
//! Storefront backend: catalog, guest and customer carts, checkout into
//! immutable orders, and the category tree with aggregated product counts.
//!
//! ## Features
//! - Cart lines owned by a user or an anonymous session, merged at login
//! - Atomic checkout with prices frozen at purchase time
//! - Category totals computed over arbitrarily deep trees
//! - Order status administration with a configurable transition policy

pub mod auth;
pub mod config;
pub mod domain;
pub mod http;
pub mod publisher;
pub mod services;
pub mod store;

use thiserror::Error;

use crate::domain::aggregates::{OrderError, ProductError};
use crate::domain::value_objects::QuantityError;
use crate::store::StoreError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum ShopError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl ShopError {
    pub fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{what} {id} not found"))
    }
}

impl From<StoreError> for ShopError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(what) => Self::Conflict(format!("Duplicate value: {what}")),
            StoreError::Constraint(what) => Self::BadRequest(what),
            other => Self::Storage(other),
        }
    }
}

impl From<QuantityError> for ShopError {
    fn from(err: QuantityError) -> Self { Self::BadRequest(err.to_string()) }
}

impl From<OrderError> for ShopError {
    fn from(err: OrderError) -> Self { Self::BadRequest(err.to_string()) }
}

impl From<ProductError> for ShopError {
    fn from(err: ProductError) -> Self { Self::BadRequest(err.to_string()) }
}

pub type Result<T> = std::result::Result<T, ShopError>;
