use axum::Router;

use super::AppState;

mod auth;
mod cart;
mod categories;
mod dashboard;
mod deposits;
mod orders;
mod payments;
mod products;
mod wishlist;

pub fn api() -> Router<AppState> {
    Router::new()
        .merge(auth::routes())
        .merge(categories::routes())
        .merge(products::routes())
        .merge(wishlist::routes())
        .merge(cart::routes())
        .merge(orders::routes())
        .merge(deposits::routes())
        .merge(payments::routes())
        .merge(dashboard::routes())
}
