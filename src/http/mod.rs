//! HTTP surface.

mod cart;
mod catalog;
mod customers;
pub mod error;
mod extract;
mod orders;

use axum::{
    extract::FromRef,
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::IdentityResolver;
use crate::services::Services;

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub identity: Arc<dyn IdentityResolver>,
}

impl FromRef<AppState> for Arc<dyn IdentityResolver> {
    fn from_ref(state: &AppState) -> Self { state.identity.clone() }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "opensase-shop"})) }))
        .route("/api/cart", get(cart::get_cart).post(cart::add_item).delete(cart::clear_cart))
        .route("/api/cart/transfer", post(cart::transfer))
        .route("/api/cart/:line_id", put(cart::update_quantity).delete(cart::remove_item))
        .route("/api/orders", get(orders::my_orders).post(orders::checkout))
        .route("/api/orders/admin", get(orders::all_orders))
        .route("/api/orders/admin/:id/status", put(orders::set_status))
        .route("/api/orders/admin/:id/estado", put(orders::set_status))
        .route("/api/orders/:id", get(orders::get_order))
        .route("/api/categories", get(catalog::list_categories).post(catalog::create_category))
        .route("/api/categories/roots", get(catalog::root_categories))
        .route("/api/categories/main", get(catalog::root_categories))
        .route("/api/categories/count", get(catalog::count_categories))
        .route("/api/categories/slug/:slug", get(catalog::category_by_slug))
        .route("/api/categories/:id", get(catalog::get_category).put(catalog::update_category).delete(catalog::delete_category))
        .route("/api/categories/:id/subcategories", get(catalog::subcategories))
        .route("/api/products", get(catalog::list_products).post(catalog::create_product))
        .route("/api/products/search", get(catalog::search_products))
        .route("/api/products/count", get(catalog::count_products))
        .route("/api/products/slug/:slug", get(catalog::product_by_slug))
        .route("/api/products/category/:category_id", get(catalog::products_in_category))
        .route("/api/products/:id", get(catalog::get_product).put(catalog::update_product).delete(catalog::delete_product))
        .route("/api/addresses", get(customers::list_addresses).post(customers::add_address))
        .route("/api/addresses/:id", get(customers::get_address).put(customers::update_address).delete(customers::delete_address))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
