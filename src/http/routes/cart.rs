use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartItem, User};
use crate::domain::value_objects::{Money, Quantity};
use crate::http::{AppState, AuthUser};
use crate::{Result, ShopError};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(show))
        .route("/cart/:cart_id/items", get(items).post(add_item))
        .route("/cart/:cart_id/items/:item_id", get(item).patch(update_item).delete(remove_item))
}

#[derive(Serialize)]
struct CartView {
    #[serde(flatten)]
    cart: Cart,
    total: Money,
}

impl TryFrom<Cart> for CartView {
    type Error = ShopError;
    fn try_from(cart: Cart) -> Result<Self> { Ok(Self { total: cart.total()?, cart }) }
}

#[derive(Deserialize)]
struct AddItem {
    product_id: Uuid,
    quantity: Quantity,
}

#[derive(Deserialize)]
struct UpdateItem {
    quantity: Quantity,
}

/// Carts belong to one user; anyone else gets a 404.
async fn own_cart(s: &AppState, user: &User, cart_id: Uuid) -> Result<Cart> {
    s.repo
        .cart(cart_id)
        .await?
        .filter(|cart| cart.user_id == user.id)
        .ok_or(ShopError::NotFound("Cart"))
}

async fn show(State(s): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<CartView>> {
    Ok(Json(s.repo.cart_for_user(user.id).await?.try_into()?))
}

async fn items(State(s): State<AppState>, AuthUser(user): AuthUser, Path(cart_id): Path<Uuid>) -> Result<Json<Vec<CartItem>>> {
    Ok(Json(own_cart(&s, &user, cart_id).await?.items))
}

async fn add_item(
    State(s): State<AppState>,
    AuthUser(user): AuthUser,
    Path(cart_id): Path<Uuid>,
    Json(body): Json<AddItem>,
) -> Result<(StatusCode, Json<CartItem>)> {
    own_cart(&s, &user, cart_id).await?;
    let item = s.repo.add_cart_item(cart_id, body.product_id, body.quantity).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn item(
    State(s): State<AppState>,
    AuthUser(user): AuthUser,
    Path((cart_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<CartItem>> {
    let cart = own_cart(&s, &user, cart_id).await?;
    Ok(Json(cart.item(item_id).cloned().ok_or(ShopError::NotFound("Cart item"))?))
}

async fn update_item(
    State(s): State<AppState>,
    AuthUser(user): AuthUser,
    Path((cart_id, item_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateItem>,
) -> Result<Json<CartItem>> {
    own_cart(&s, &user, cart_id).await?;
    let item = s
        .repo
        .update_cart_item(cart_id, item_id, body.quantity)
        .await?
        .ok_or(ShopError::NotFound("Cart item"))?;
    Ok(Json(item))
}

async fn remove_item(
    State(s): State<AppState>,
    AuthUser(user): AuthUser,
    Path((cart_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    own_cart(&s, &user, cart_id).await?;
    if !s.repo.remove_cart_item(cart_id, item_id).await? {
        return Err(ShopError::NotFound("Cart item"));
    }
    Ok(StatusCode::NO_CONTENT)
}
