use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::aggregates::WishlistItem;
use crate::http::{AppState, AuthUser};
use crate::{Result, ShopError};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/wishlist", get(list).post(add))
        .route("/wishlist/:id", get(show).delete(remove))
}

#[derive(Deserialize)]
struct AddToWishlist {
    product_id: Uuid,
}

async fn list(State(s): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<Vec<WishlistItem>>> {
    Ok(Json(s.repo.wishlist(user.id).await?))
}

async fn add(
    State(s): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<AddToWishlist>,
) -> Result<(StatusCode, Json<WishlistItem>)> {
    s.repo.product(body.product_id).await?.ok_or(ShopError::NotFound("Product"))?;
    Ok((StatusCode::CREATED, Json(s.repo.add_to_wishlist(user.id, body.product_id).await?)))
}

async fn show(State(s): State<AppState>, AuthUser(user): AuthUser, Path(id): Path<Uuid>) -> Result<Json<WishlistItem>> {
    Ok(Json(s.repo.wishlist_item(user.id, id).await?.ok_or(ShopError::NotFound("Wishlist item"))?))
}

async fn remove(State(s): State<AppState>, AuthUser(user): AuthUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    if !s.repo.remove_from_wishlist(user.id, id).await? {
        return Err(ShopError::NotFound("Wishlist item"));
    }
    Ok(StatusCode::NO_CONTENT)
}
