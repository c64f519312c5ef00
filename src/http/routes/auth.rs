use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::{Order, ProfileUpdate, Role, User, WishlistItem};
use crate::http::{AppState, AuthUser};
use crate::permissions;
use crate::repository::{OrderScope, Page, MAX_PER_PAGE};
use crate::services::auth::{AccessToken, Credentials, Registration};
use crate::{Result, ShopError};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/users", post(register))
        .route("/auth/jwt/create", post(login))
        .route("/auth/users/me", get(me).patch(update_me))
        .route("/auth/users/:id/role", put(set_role))
}

#[derive(Serialize)]
struct Profile {
    #[serde(flatten)]
    user: User,
    wishlist: Vec<WishlistItem>,
    orders: Vec<Order>,
}

#[derive(Deserialize)]
struct RoleChange {
    role: Role,
}

async fn register(State(s): State<AppState>, Json(form): Json<Registration>) -> Result<(StatusCode, Json<User>)> {
    let user = s.auth.register(s.repo.as_ref(), form).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login(State(s): State<AppState>, Json(credentials): Json<Credentials>) -> Result<Json<AccessToken>> {
    Ok(Json(s.auth.login(s.repo.as_ref(), credentials).await?))
}

async fn me(State(s): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<Profile>> {
    let wishlist = s.repo.wishlist(user.id).await?;
    let orders = s.repo.orders(OrderScope::Buyer(user.id), Page::new(Some(1), Some(MAX_PER_PAGE))).await?.items;
    Ok(Json(Profile { user, wishlist, orders }))
}

async fn update_me(
    State(s): State<AppState>,
    AuthUser(user): AuthUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<User>> {
    if update.phone_number.as_deref().is_some_and(|p| p.chars().count() > 15) {
        return Err(ShopError::Validation("phone_number: at most 15 characters".into()));
    }
    let user = s.repo.update_profile(user.id, update).await?.ok_or(ShopError::NotFound("User"))?;
    Ok(Json(user))
}

async fn set_role(
    State(s): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
    Json(change): Json<RoleChange>,
) -> Result<Json<User>> {
    if !permissions::can_assign_roles(&caller.principal()) {
        return Err(ShopError::Forbidden("Only staff can change roles".into()));
    }
    let user = s.repo.set_role(id, change.role).await?.ok_or(ShopError::NotFound("User"))?;
    tracing::info!(user_id = %user.id, role = %user.role, "role changed");
    Ok(Json(user))
}
