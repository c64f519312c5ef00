//! Bearer-token authentication.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use super::AppState;
use crate::domain::aggregates::User;
use crate::permissions::Principal;
use crate::ShopError;

/// The caller, loaded fresh from the repository so role changes and
/// deletions take effect immediately.
pub struct AuthUser(pub User);

impl AuthUser {
    pub fn principal(&self) -> Principal { Principal::from(&self.0) }
}

/// Like [`AuthUser`] but anonymous callers are let through. A token that is
/// present but invalid is still rejected.
pub struct MaybeAuthUser(pub Option<User>);

fn bearer_token(parts: &Parts) -> Result<Option<&str>, ShopError> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else { return Ok(None) };
    let value = value
        .to_str()
        .map_err(|_| ShopError::Unauthorized("Invalid authorization header".into()))?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("JWT "))
        .map(|t| Some(t.trim()))
        .ok_or_else(|| ShopError::Unauthorized("Expected 'Bearer <token>'".into()))
}

async fn load_user(state: &AppState, token: &str) -> Result<User, ShopError> {
    let claims = state.auth.verify(token)?;
    state
        .repo
        .user_by_id(claims.sub)
        .await?
        .ok_or_else(|| ShopError::Unauthorized("User not found".into()))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ShopError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?
            .ok_or_else(|| ShopError::Unauthorized("Authentication credentials were not provided".into()))?;
        Ok(Self(load_user(state, token).await?))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = ShopError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match bearer_token(parts)? {
            Some(token) => Ok(Self(Some(load_user(state, token).await?))),
            None => Ok(Self(None)),
        }
    }
}
