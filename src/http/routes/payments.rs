//! Gateway callbacks. The customer's browser is posted here by the hosted
//! payment page, so every outcome ends in a redirect back to the frontend.

use axum::extract::State;
use axum::response::Redirect;
use axum::routing::post;
use axum::{Form, Router};

use crate::http::AppState;
use crate::services::deposits::{self, CallbackKind, GatewayCallback};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/payment/success", post(success))
        .route("/payment/fail", post(fail))
        .route("/payment/cancel", post(cancel))
}

async fn success(State(s): State<AppState>, Form(callback): Form<GatewayCallback>) -> Redirect {
    settle(&s, CallbackKind::Success, callback).await
}

async fn fail(State(s): State<AppState>, Form(callback): Form<GatewayCallback>) -> Redirect {
    settle(&s, CallbackKind::Fail, callback).await
}

async fn cancel(State(s): State<AppState>, Form(callback): Form<GatewayCallback>) -> Redirect {
    settle(&s, CallbackKind::Cancel, callback).await
}

async fn settle(s: &AppState, kind: CallbackKind, callback: GatewayCallback) -> Redirect {
    let status = match deposits::settle_from_callback(s.repo.as_ref(), s.gateway.as_ref(), &s.events, kind, callback).await {
        Ok(settlement) => settlement.deposit.status.to_string(),
        Err(e) => {
            tracing::warn!(?kind, error = %e, "payment callback rejected");
            "error".to_string()
        }
    };
    Redirect::to(&format!("{}/dashboard/deposits/?status={status}", s.config.frontend_url))
}
