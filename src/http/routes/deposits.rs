use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use crate::domain::aggregates::Deposit;
use crate::http::{AppState, AuthUser, PageParams, PaginatedResponse};
use crate::permissions;
use crate::repository::DepositScope;
use crate::services::deposits::{self, DepositRequest, DepositSession};
use crate::{Result, ShopError};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/deposits", get(list).post(create))
        .route("/deposits/:id", get(show).delete(remove))
}

async fn list(
    State(s): State<AppState>,
    caller: AuthUser,
    Query(p): Query<PageParams>,
) -> Result<Json<PaginatedResponse<Deposit>>> {
    let principal = caller.principal();
    let scope = if principal.is_admin() { DepositScope::All } else { DepositScope::User(principal.user_id) };
    let page = p.page();
    Ok(Json(PaginatedResponse::new(s.repo.deposits(scope, page).await?, page)))
}

/// Opens a gateway session; the wallet is credited when the gateway calls back.
async fn create(
    State(s): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<DepositRequest>,
) -> Result<(StatusCode, Json<DepositSession>)> {
    let session = deposits::create_deposit(s.repo.as_ref(), s.gateway.as_ref(), &s.config, &user, request).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn show(State(s): State<AppState>, caller: AuthUser, Path(id): Path<Uuid>) -> Result<Json<Deposit>> {
    let deposit = s
        .repo
        .deposit(id)
        .await?
        .filter(|d| permissions::can_view_deposit(&caller.principal(), d))
        .ok_or(ShopError::NotFound("Deposit"))?;
    Ok(Json(deposit))
}

async fn remove(State(s): State<AppState>, caller: AuthUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    if !permissions::can_delete_deposit(&caller.principal()) {
        return Err(ShopError::Forbidden("Only staff can delete deposits".into()));
    }
    if !s.repo.delete_deposit(id).await? {
        return Err(ShopError::NotFound("Deposit"));
    }
    Ok(StatusCode::NO_CONTENT)
}
