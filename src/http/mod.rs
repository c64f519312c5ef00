//! REST API.
//!
//! Everything lives under `/api/v1` except the health probe. Handlers stay
//! thin: they authenticate, check permissions and call into the services or
//! the repository.

pub mod error;
mod extract;
mod pagination;
mod routes;

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use extract::{AuthUser, MaybeAuthUser};
pub use pagination::{PageParams, PaginatedResponse};

use crate::config::Config;
use crate::repository::Repository;
use crate::services::{AuthService, EventPublisher, PaymentGateway};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub auth: AuthService,
    pub gateway: Arc<dyn PaymentGateway>,
    pub events: EventPublisher,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "grocera"})) }))
        .nest("/api/v1", routes::api())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
