use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use validator::Validate;

use super::extract::{ApiJson, ApiPath};
use super::AppState;
use crate::auth::{Admin, Caller};
use crate::domain::value_objects::{AddressId, OrderId};
use crate::services::OrderView;
use crate::Result;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(alias = "direccionId")]
    pub address_id: AddressId,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StatusRequest {
    #[serde(alias = "estado")]
    #[validate(length(min = 1, max = 32))]
    pub status: String,
}

pub async fn checkout(State(state): State<AppState>, Caller(caller): Caller, ApiJson(req): ApiJson<CheckoutRequest>) -> Result<(StatusCode, Json<OrderView>)> {
    let order = state.services.orders.checkout(caller.user_id, req.address_id).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn my_orders(State(state): State<AppState>, Caller(caller): Caller) -> Result<Json<Vec<OrderView>>> {
    Ok(Json(state.services.orders.orders_of(caller.user_id).await?))
}

pub async fn get_order(State(state): State<AppState>, Caller(caller): Caller, ApiPath(id): ApiPath<OrderId>) -> Result<Json<OrderView>> {
    Ok(Json(state.services.orders.order(caller, id).await?))
}

pub async fn all_orders(State(state): State<AppState>, _admin: Admin) -> Result<Json<Vec<OrderView>>> {
    Ok(Json(state.services.orders.all_orders().await?))
}

pub async fn set_status(
    State(state): State<AppState>,
    Admin(admin): Admin,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(req): ApiJson<StatusRequest>,
) -> Result<Json<OrderView>> {
    req.validate()?;
    tracing::debug!(admin = %admin.user_id, order = %id, "status change requested");
    Ok(Json(state.services.orders.set_status(id, &req.status).await?))
}
