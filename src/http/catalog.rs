use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use validator::Validate;

use super::extract::{ApiJson, ApiPath, ApiQuery};
use super::AppState;
use crate::auth::Admin;
use crate::domain::aggregates::{CategoryNode, Product, ProductDraft};
use crate::domain::value_objects::{CategoryId, Money, ProductId};
use crate::services::catalog::slugify;
use crate::services::CategoryDraft;
use crate::Result;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(max = 120))]
    pub slug: Option<String>,
    /// Absent keeps the current parent on update; `null` detaches.
    #[serde(default, deserialize_with = "present")]
    pub parent_id: Option<Option<CategoryId>>,
}

/// Marks a field as supplied, so an explicit `null` differs from an absent field.
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl From<CategoryRequest> for CategoryDraft {
    fn from(r: CategoryRequest) -> Self {
        CategoryDraft { name: r.name, slug: r.slug, parent_id: r.parent_id }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductRequest {
    pub category_id: CategoryId,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 200))]
    pub slug: Option<String>,
    pub description: Option<String>,
    pub price: Decimal,
    #[validate(url)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub featured: bool,
}

impl From<ProductRequest> for ProductDraft {
    fn from(r: ProductRequest) -> Self {
        let slug = match r.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(slug) => slug.to_string(),
            None => slugify(&r.name),
        };
        ProductDraft {
            category_id: r.category_id,
            name: r.name,
            slug,
            description: r.description,
            price: Money::new(r.price),
            image_url: r.image_url,
            featured: r.featured,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFilter {
    pub category_id: Option<CategoryId>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

pub async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<CategoryNode>>> {
    Ok(Json(state.services.catalog.categories().await?))
}

pub async fn root_categories(State(state): State<AppState>) -> Result<Json<Vec<CategoryNode>>> {
    Ok(Json(state.services.catalog.root_categories().await?))
}

pub async fn count_categories(State(state): State<AppState>) -> Result<Json<u64>> {
    Ok(Json(state.services.catalog.category_count().await?))
}

pub async fn get_category(State(state): State<AppState>, ApiPath(id): ApiPath<CategoryId>) -> Result<Json<CategoryNode>> {
    Ok(Json(state.services.catalog.category(id).await?))
}

pub async fn category_by_slug(State(state): State<AppState>, ApiPath(slug): ApiPath<String>) -> Result<Json<CategoryNode>> {
    Ok(Json(state.services.catalog.category_by_slug(&slug).await?))
}

pub async fn subcategories(State(state): State<AppState>, ApiPath(id): ApiPath<CategoryId>) -> Result<Json<Vec<CategoryNode>>> {
    Ok(Json(state.services.catalog.subcategories(id).await?))
}

pub async fn create_category(State(state): State<AppState>, _admin: Admin, ApiJson(req): ApiJson<CategoryRequest>) -> Result<(StatusCode, Json<CategoryNode>)> {
    req.validate()?;
    let category = state.services.catalog.create_category(req.into()).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(state): State<AppState>,
    _admin: Admin,
    ApiPath(id): ApiPath<CategoryId>,
    ApiJson(req): ApiJson<CategoryRequest>,
) -> Result<Json<CategoryNode>> {
    req.validate()?;
    Ok(Json(state.services.catalog.update_category(id, req.into()).await?))
}

pub async fn delete_category(State(state): State<AppState>, _admin: Admin, ApiPath(id): ApiPath<CategoryId>) -> Result<StatusCode> {
    state.services.catalog.delete_category(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_products(State(state): State<AppState>, ApiQuery(filter): ApiQuery<ProductFilter>) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.services.catalog.products(filter.category_id).await?))
}

pub async fn get_product(State(state): State<AppState>, ApiPath(id): ApiPath<ProductId>) -> Result<Json<Product>> {
    Ok(Json(state.services.catalog.product(id).await?))
}

pub async fn product_by_slug(State(state): State<AppState>, ApiPath(slug): ApiPath<String>) -> Result<Json<Product>> {
    Ok(Json(state.services.catalog.product_by_slug(&slug).await?))
}

pub async fn create_product(State(state): State<AppState>, _admin: Admin, ApiJson(req): ApiJson<ProductRequest>) -> Result<(StatusCode, Json<Product>)> {
    req.validate()?;
    let product = state.services.catalog.create_product(req.into()).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    _admin: Admin,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(req): ApiJson<ProductRequest>,
) -> Result<Json<Product>> {
    req.validate()?;
    Ok(Json(state.services.catalog.update_product(id, req.into()).await?))
}

pub async fn products_in_category(State(state): State<AppState>, ApiPath(id): ApiPath<CategoryId>) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.services.catalog.products(Some(id)).await?))
}

pub async fn search_products(State(state): State<AppState>, ApiQuery(params): ApiQuery<SearchParams>) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.services.catalog.search_products(&params.q).await?))
}

pub async fn count_products(State(state): State<AppState>) -> Result<Json<u64>> {
    Ok(Json(state.services.catalog.product_count().await?))
}

pub async fn delete_product(State(state): State<AppState>, _admin: Admin, ApiPath(id): ApiPath<ProductId>) -> Result<StatusCode> {
    state.services.catalog.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
