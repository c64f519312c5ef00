use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;
use validator::Validate;

use super::products::{product_query, ProductParams};
use crate::domain::aggregates::{Category, CategorySummary, NewCategory, Product};
use crate::http::{AppState, AuthUser, PageParams, PaginatedResponse};
use crate::permissions;
use crate::{Result, ShopError};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list).post(create))
        .route("/categories/:id", get(show).put(update).delete(remove))
        .route("/categories/:id/products", get(products))
}

fn require_staff(caller: &AuthUser) -> Result<()> {
    if permissions::can_manage_catalog(&caller.principal()) {
        Ok(())
    } else {
        Err(ShopError::Forbidden("Only staff can manage categories".into()))
    }
}

async fn list(State(s): State<AppState>, Query(p): Query<PageParams>) -> Result<Json<PaginatedResponse<CategorySummary>>> {
    let page = p.page();
    Ok(Json(PaginatedResponse::new(s.repo.list_categories(page).await?, page)))
}

async fn show(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<CategorySummary>> {
    Ok(Json(s.repo.category(id).await?.ok_or(ShopError::NotFound("Category"))?))
}

async fn create(
    State(s): State<AppState>,
    caller: AuthUser,
    Json(new): Json<NewCategory>,
) -> Result<(StatusCode, Json<Category>)> {
    require_staff(&caller)?;
    new.validate()?;
    Ok((StatusCode::CREATED, Json(s.repo.create_category(new).await?)))
}

async fn update(
    State(s): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
    Json(new): Json<NewCategory>,
) -> Result<Json<Category>> {
    require_staff(&caller)?;
    new.validate()?;
    Ok(Json(s.repo.update_category(id, new).await?.ok_or(ShopError::NotFound("Category"))?))
}

async fn remove(State(s): State<AppState>, caller: AuthUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    require_staff(&caller)?;
    if !s.repo.delete_category(id).await? {
        return Err(ShopError::NotFound("Category"));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn products(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<ProductParams>,
) -> Result<Json<PaginatedResponse<Product>>> {
    s.repo.category(id).await?.ok_or(ShopError::NotFound("Category"))?;
    let mut query = product_query(&params)?;
    query.filter.category_id = Some(id);
    let paged = s.repo.list_products(&query).await?;
    Ok(Json(PaginatedResponse::new(paged, query.page)))
}
