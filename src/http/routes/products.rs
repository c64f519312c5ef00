use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::product::ProductOrdering;
use crate::domain::aggregates::{NewProduct, NewReview, Product, ProductImage, ProductUpdate, Review};
use crate::domain::value_objects::Money;
use crate::http::{AppState, AuthUser, MaybeAuthUser, PaginatedResponse};
use crate::permissions;
use crate::repository::{Page, ProductQuery};
use crate::{Result, ShopError};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list).post(create))
        .route("/products/:id", get(show).put(update).patch(update).delete(remove))
        .route("/products/:id/images", get(images).post(add_image))
        .route("/products/:id/images/:image_id", delete(remove_image))
        .route("/products/:id/reviews", get(reviews).post(add_review))
        .route("/products/:id/reviews/:review_id", get(review).put(edit_review).delete(remove_review))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductParams {
    pub search: Option<String>,
    pub category: Option<Uuid>,
    pub price_min: Option<String>,
    pub price_max: Option<String>,
    pub ordering: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
struct NewImage {
    #[validate(url)]
    url: String,
}

fn price_param(name: &str, value: Option<&str>) -> Result<Option<Money>> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else { return Ok(None) };
    let amount = Decimal::from_str(raw).map_err(|_| ShopError::Validation(format!("{name}: not a number")))?;
    Ok(Some(Money::new(amount)?))
}

pub fn product_query(params: &ProductParams) -> Result<ProductQuery> {
    let mut query = ProductQuery { page: Page::new(params.page, params.per_page), ..Default::default() };
    query.filter.search = params.search.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from);
    query.filter.category_id = params.category;
    query.filter.price_min = price_param("price_min", params.price_min.as_deref())?;
    query.filter.price_max = price_param("price_max", params.price_max.as_deref())?;
    if let Some(ordering) = params.ordering.as_deref().filter(|o| !o.is_empty()) {
        query.ordering = ProductOrdering::parse(ordering)
            .ok_or_else(|| ShopError::Validation(format!("ordering: unknown field '{ordering}'")))?;
    }
    Ok(query)
}

async fn load(s: &AppState, id: Uuid) -> Result<Product> {
    s.repo.product(id).await?.ok_or(ShopError::NotFound("Product"))
}

async fn owned(s: &AppState, caller: &AuthUser, id: Uuid) -> Result<Product> {
    let product = load(s, id).await?;
    if !permissions::can_modify_product(&caller.principal(), &product) {
        return Err(ShopError::Forbidden("You do not own this product".into()));
    }
    Ok(product)
}

/// Sellers browsing the catalog see only their own listings.
async fn list(
    State(s): State<AppState>,
    MaybeAuthUser(caller): MaybeAuthUser,
    Query(params): Query<ProductParams>,
) -> Result<Json<PaginatedResponse<Product>>> {
    let mut query = product_query(&params)?;
    if let Some(seller) = caller.as_ref().filter(|u| permissions::Principal::from(*u).is_seller()) {
        query.filter.seller_id = Some(seller.id);
    }
    let paged = s.repo.list_products(&query).await?;
    Ok(Json(PaginatedResponse::new(paged, query.page)))
}

async fn show(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Product>> {
    Ok(Json(load(&s, id).await?))
}

async fn create(
    State(s): State<AppState>,
    caller: AuthUser,
    Json(new): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>)> {
    if !permissions::can_create_product(&caller.principal()) {
        return Err(ShopError::Forbidden("Only sellers and staff can list products".into()));
    }
    new.validate()?;
    let product = s.repo.create_product(caller.0.id, new).await?;
    tracing::info!(product_id = %product.id, seller_id = %product.seller_id, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update(
    State(s): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
    Json(update): Json<ProductUpdate>,
) -> Result<Json<Product>> {
    update.validate()?;
    owned(&s, &caller, id).await?;
    Ok(Json(s.repo.update_product(id, update).await?.ok_or(ShopError::NotFound("Product"))?))
}

async fn remove(State(s): State<AppState>, caller: AuthUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    owned(&s, &caller, id).await?;
    if !s.repo.delete_product(id).await? {
        return Err(ShopError::NotFound("Product"));
    }
    tracing::info!(product_id = %id, "product deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn images(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Vec<ProductImage>>> {
    load(&s, id).await?;
    Ok(Json(s.repo.product_images(id).await?))
}

async fn add_image(
    State(s): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
    Json(image): Json<NewImage>,
) -> Result<(StatusCode, Json<ProductImage>)> {
    image.validate()?;
    owned(&s, &caller, id).await?;
    Ok((StatusCode::CREATED, Json(s.repo.add_product_image(id, image.url).await?)))
}

async fn remove_image(
    State(s): State<AppState>,
    caller: AuthUser,
    Path((id, image_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    owned(&s, &caller, id).await?;
    if !s.repo.delete_product_image(id, image_id).await? {
        return Err(ShopError::NotFound("Image"));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn reviews(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Vec<Review>>> {
    load(&s, id).await?;
    Ok(Json(s.repo.reviews(id).await?))
}

async fn review(State(s): State<AppState>, Path((id, review_id)): Path<(Uuid, Uuid)>) -> Result<Json<Review>> {
    Ok(Json(s.repo.review(id, review_id).await?.ok_or(ShopError::NotFound("Review"))?))
}

async fn add_review(
    State(s): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(new): Json<NewReview>,
) -> Result<(StatusCode, Json<Review>)> {
    new.validate()?;
    load(&s, id).await?;
    Ok((StatusCode::CREATED, Json(s.repo.create_review(id, user.id, new).await?)))
}

async fn edit_review(
    State(s): State<AppState>,
    caller: AuthUser,
    Path((id, review_id)): Path<(Uuid, Uuid)>,
    Json(new): Json<NewReview>,
) -> Result<Json<Review>> {
    new.validate()?;
    let existing = s.repo.review(id, review_id).await?.ok_or(ShopError::NotFound("Review"))?;
    if !permissions::can_edit_review(&caller.principal(), &existing) {
        return Err(ShopError::Forbidden("Only the author can edit a review".into()));
    }
    Ok(Json(s.repo.update_review(review_id, new).await?.ok_or(ShopError::NotFound("Review"))?))
}

async fn remove_review(
    State(s): State<AppState>,
    caller: AuthUser,
    Path((id, review_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    let existing = s.repo.review(id, review_id).await?.ok_or(ShopError::NotFound("Review"))?;
    if !permissions::can_delete_review(&caller.principal(), &existing) {
        return Err(ShopError::Forbidden("You can not delete this review".into()));
    }
    s.repo.delete_review(review_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_query_from_params() {
        let params = ProductParams {
            search: Some("  rice ".into()),
            price_min: Some("10.5".into()),
            ordering: Some("-price".into()),
            page: Some(2),
            ..Default::default()
        };
        let query = product_query(&params).unwrap();
        assert_eq!(query.filter.search.as_deref(), Some("rice"));
        assert_eq!(query.filter.price_min, Some(Money::new(Decimal::new(105, 1)).unwrap()));
        assert!(query.ordering.descending);
        assert_eq!(query.page.page, 2);
    }

    #[test]
    fn test_bad_params_are_rejected() {
        let bad_order = ProductParams { ordering: Some("stock".into()), ..Default::default() };
        assert!(matches!(product_query(&bad_order), Err(ShopError::Validation(_))));
        let bad_price = ProductParams { price_max: Some("cheap".into()), ..Default::default() };
        assert!(matches!(product_query(&bad_price), Err(ShopError::Validation(_))));
        let negative = ProductParams { price_min: Some("-1".into()), ..Default::default() };
        assert!(matches!(product_query(&negative), Err(ShopError::Value(_))));
    }
}
