use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use validator::Validate;

use super::extract::{ApiJson, ApiPath};
use super::AppState;
use crate::auth::Caller;
use crate::domain::aggregates::Address;
use crate::domain::value_objects::AddressId;
use crate::services::{AddressDraft, AddressPatch};
use crate::Result;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddressRequest {
    #[validate(length(min = 1, max = 200))]
    pub street: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub province: String,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 1, max = 100))]
    pub country: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddressPatchRequest {
    #[validate(length(max = 200))]
    pub street: Option<String>,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    #[validate(length(max = 100))]
    pub province: Option<String>,
    #[validate(length(max = 20))]
    pub postal_code: Option<String>,
    #[validate(length(max = 100))]
    pub country: Option<String>,
}

pub async fn list_addresses(State(state): State<AppState>, Caller(caller): Caller) -> Result<Json<Vec<Address>>> {
    Ok(Json(state.services.customers.addresses(caller.user_id).await?))
}

pub async fn add_address(State(state): State<AppState>, Caller(caller): Caller, ApiJson(req): ApiJson<AddressRequest>) -> Result<(StatusCode, Json<Address>)> {
    req.validate()?;
    let draft = AddressDraft {
        street: req.street,
        city: req.city,
        province: req.province,
        postal_code: req.postal_code,
        country: req.country,
    };
    let address = state.services.customers.add_address(caller.user_id, draft).await?;
    Ok((StatusCode::CREATED, Json(address)))
}

pub async fn get_address(State(state): State<AppState>, Caller(caller): Caller, ApiPath(id): ApiPath<AddressId>) -> Result<Json<Address>> {
    Ok(Json(state.services.customers.address(caller.user_id, id).await?))
}

pub async fn update_address(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ApiPath(id): ApiPath<AddressId>,
    ApiJson(req): ApiJson<AddressPatchRequest>,
) -> Result<Json<Address>> {
    req.validate()?;
    let patch = AddressPatch {
        street: req.street,
        city: req.city,
        province: req.province,
        postal_code: req.postal_code,
        country: req.country,
    };
    Ok(Json(state.services.customers.update_address(caller.user_id, id, patch).await?))
}

pub async fn delete_address(State(state): State<AppState>, Caller(caller): Caller, ApiPath(id): ApiPath<AddressId>) -> Result<StatusCode> {
    state.services.customers.delete_address(caller.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
