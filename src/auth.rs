//! Caller identity.
//!
//! Tokens are issued elsewhere; this service only validates a bearer token and
//! turns it into a [`Principal`]. A request without an `Authorization` header is
//! anonymous, a request with a bad one is rejected outright.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::Role;
use crate::domain::value_objects::UserId;
use crate::ShopError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub admin: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authorization header must be 'Bearer <token>'")]
    Malformed,
    #[error("Invalid or expired token")]
    InvalidToken,
}

impl From<AuthError> for ShopError {
    fn from(err: AuthError) -> Self { ShopError::Unauthorized(err.to_string()) }
}

pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Token body shared with the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: i64,
}

pub struct JwtIdentityResolver {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityResolver {
    pub fn new(secret: &str) -> Self {
        Self { key: DecodingKey::from_secret(secret.as_bytes()), validation: Validation::new(Algorithm::HS256) }
    }
}

impl IdentityResolver for JwtIdentityResolver {
    fn resolve(&self, token: &str) -> Result<Principal, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "rejected bearer token");
            AuthError::InvalidToken
        })?;
        let admin = data.claims.role.as_deref().and_then(Role::parse) == Some(Role::Admin);
        Ok(Principal { user_id: UserId::from_uuid(data.claims.sub), admin })
    }
}

/// Signs a token the way the identity provider does. Used by local tooling and tests.
pub fn issue_token(secret: &str, user: UserId, role: Role, ttl: chrono::Duration) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims { sub: user.as_uuid(), role: Some(role.as_str().to_string()), exp: (chrono::Utc::now() + ttl).timestamp() };
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

fn bearer(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    let Some(header) = headers.get(AUTHORIZATION) else { return Ok(None) };
    let token = header
        .to_str()
        .ok()
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::Malformed)?;
    Ok(Some(token))
}

fn principal<S>(parts: &Parts, state: &S) -> Result<Option<Principal>, AuthError>
where
    Arc<dyn IdentityResolver>: FromRef<S>,
{
    let resolver = <Arc<dyn IdentityResolver> as FromRef<S>>::from_ref(state);
    bearer(&parts.headers)?.map(|token| resolver.resolve(token)).transpose()
}

/// Caller when a token was supplied, `None` for anonymous requests.
pub struct MaybeCaller(pub Option<Principal>);

impl MaybeCaller {
    pub fn user_id(&self) -> Option<UserId> { self.0.map(|p| p.user_id) }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeCaller
where
    S: Send + Sync,
    Arc<dyn IdentityResolver>: FromRef<S>,
{
    type Rejection = ShopError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(principal(parts, state)?))
    }
}

/// Authenticated caller.
pub struct Caller(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
    Arc<dyn IdentityResolver>: FromRef<S>,
{
    type Rejection = ShopError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        principal(parts, state)?
            .map(Self)
            .ok_or_else(|| ShopError::Unauthorized("Authentication required".into()))
    }
}

/// Authenticated caller holding the admin role.
pub struct Admin(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for Admin
where
    S: Send + Sync,
    Arc<dyn IdentityResolver>: FromRef<S>,
{
    type Rejection = ShopError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Caller(principal) = Caller::from_request_parts(parts, state).await?;
        if !principal.admin {
            return Err(ShopError::Forbidden("Administrator role required".into()));
        }
        Ok(Self(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret-0123";

    #[test]
    fn test_round_trip_admin_claim() {
        let user = UserId::generate();
        let token = issue_token(SECRET, user, Role::Admin, chrono::Duration::minutes(5)).unwrap();
        let principal = JwtIdentityResolver::new(SECRET).resolve(&token).unwrap();
        assert_eq!(principal, Principal { user_id: user, admin: true });
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_token(SECRET, UserId::generate(), Role::Customer, chrono::Duration::minutes(5)).unwrap();
        assert_eq!(JwtIdentityResolver::new("another-secret-4567").resolve(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = issue_token(SECRET, UserId::generate(), Role::Customer, chrono::Duration::hours(-2)).unwrap();
        assert_eq!(JwtIdentityResolver::new(SECRET).resolve(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_bearer_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer(&headers), Ok(None));
        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer(&headers), Err(AuthError::Malformed));
        headers.insert(AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer(&headers), Ok(Some("abc")));
    }
}
