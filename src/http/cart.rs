use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use validator::Validate;

use super::extract::{ApiJson, ApiPath, ApiQuery};
use super::AppState;
use crate::auth::{Caller, MaybeCaller};
use crate::domain::aggregates::{Cart, PricedLine};
use crate::domain::value_objects::{CartLineId, ProductId};
use crate::Result;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SessionParams {
    #[serde(default, alias = "idSesion")]
    #[validate(length(max = 128))]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default, alias = "cantidad")]
    pub quantity: Option<i64>,
    #[serde(default, alias = "idSesion")]
    #[validate(length(max = 128))]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    #[serde(alias = "cantidad")]
    pub quantity: i64,
}

pub async fn get_cart(State(state): State<AppState>, caller: MaybeCaller, ApiQuery(params): ApiQuery<SessionParams>) -> Result<Json<Cart>> {
    params.validate()?;
    let cart = state.services.cart.get_cart(caller.user_id(), params.session_id.as_deref()).await?;
    Ok(Json(cart))
}

pub async fn add_item(
    State(state): State<AppState>,
    caller: MaybeCaller,
    ApiQuery(params): ApiQuery<SessionParams>,
    ApiJson(req): ApiJson<AddItemRequest>,
) -> Result<(StatusCode, Json<PricedLine>)> {
    req.validate()?;
    params.validate()?;
    let session = req.session_id.as_deref().or(params.session_id.as_deref());
    let line = state.services.cart.add_item(caller.user_id(), session, req.product_id, req.quantity).await?;
    Ok((StatusCode::CREATED, Json(line)))
}

pub async fn update_quantity(
    State(state): State<AppState>,
    caller: MaybeCaller,
    ApiPath(line_id): ApiPath<CartLineId>,
    ApiJson(req): ApiJson<UpdateQuantityRequest>,
) -> Result<Json<PricedLine>> {
    let line = state.services.cart.update_quantity(line_id, req.quantity, caller.user_id()).await?;
    Ok(Json(line))
}

pub async fn remove_item(State(state): State<AppState>, caller: MaybeCaller, ApiPath(line_id): ApiPath<CartLineId>) -> Result<StatusCode> {
    state.services.cart.remove_item(line_id, caller.user_id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_cart(State(state): State<AppState>, caller: MaybeCaller, ApiQuery(params): ApiQuery<SessionParams>) -> Result<StatusCode> {
    params.validate()?;
    state.services.cart.clear_cart(caller.user_id(), params.session_id.as_deref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn transfer(State(state): State<AppState>, Caller(caller): Caller, ApiQuery(params): ApiQuery<SessionParams>) -> Result<Json<Cart>> {
    params.validate()?;
    let cart = state.services.cart.transfer(params.session_id.as_deref(), caller.user_id).await?;
    Ok(Json(cart))
}
