use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderStatus};
use crate::http::{AppState, AuthUser, PageParams, PaginatedResponse};
use crate::services::orders;
use crate::Result;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list).post(create))
        .route("/orders/:id", get(show).delete(remove))
        .route("/orders/:id/cancel", post(cancel))
        .route("/orders/:id/update_status", patch(update_status))
}

#[derive(Deserialize)]
struct PlaceOrder {
    cart_id: Uuid,
}

#[derive(Deserialize)]
struct StatusChange {
    status: OrderStatus,
}

async fn list(
    State(s): State<AppState>,
    caller: AuthUser,
    Query(p): Query<PageParams>,
) -> Result<Json<PaginatedResponse<Order>>> {
    let page = p.page();
    let paged = orders::list_orders(s.repo.as_ref(), &caller.principal(), page).await?;
    Ok(Json(PaginatedResponse::new(paged, page)))
}

async fn create(
    State(s): State<AppState>,
    AuthUser(buyer): AuthUser,
    Json(body): Json<PlaceOrder>,
) -> Result<(StatusCode, Json<Order>)> {
    let order = orders::place_order(s.repo.as_ref(), &s.events, &buyer, body.cart_id).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn show(State(s): State<AppState>, caller: AuthUser, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(orders::visible_order(s.repo.as_ref(), &caller.principal(), id).await?))
}

async fn remove(State(s): State<AppState>, caller: AuthUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    orders::delete_order(s.repo.as_ref(), &caller.principal(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn cancel(State(s): State<AppState>, caller: AuthUser, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(orders::cancel_order(s.repo.as_ref(), &s.events, &caller.principal(), id).await?))
}

async fn update_status(
    State(s): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusChange>,
) -> Result<Json<Order>> {
    Ok(Json(orders::update_status(s.repo.as_ref(), &s.events, &caller.principal(), id, body.status).await?))
}
