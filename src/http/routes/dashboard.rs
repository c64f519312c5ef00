use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::http::{AppState, AuthUser};
use crate::repository::{AdminDashboard, SellerDashboard};
use crate::{Result, ShopError};

pub fn routes() -> Router<AppState> {
    Router::new().route("/dashboard", get(dashboard))
}

#[derive(Serialize)]
#[serde(untagged)]
enum Dashboard {
    Admin(AdminDashboard),
    Seller(SellerDashboard),
}

async fn dashboard(State(s): State<AppState>, caller: AuthUser) -> Result<Json<Dashboard>> {
    let principal = caller.principal();
    if principal.is_admin() {
        Ok(Json(Dashboard::Admin(s.repo.admin_dashboard().await?)))
    } else if principal.is_seller() {
        Ok(Json(Dashboard::Seller(s.repo.seller_dashboard(principal.user_id).await?)))
    } else {
        Err(ShopError::Forbidden("Dashboards are for sellers and staff".into()))
    }
}
