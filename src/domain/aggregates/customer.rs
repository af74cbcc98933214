//! Customer records: identity and shipping addresses.

use serde::{Deserialize, Serialize};
use crate::domain::value_objects::{AddressId, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub full_name: String,
    pub role: Role,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role { #[default] Customer, Admin }

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Customer => "CUSTOMER", Self::Admin => "ADMIN" }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CUSTOMER" | "USER" => Some(Self::Customer),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: AddressId,
    #[serde(skip_serializing)]
    pub user_id: UserId,
    pub street: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub country: String,
}

impl Address {
    pub fn belongs_to(&self, user: UserId) -> bool { self.user_id == user }
}
