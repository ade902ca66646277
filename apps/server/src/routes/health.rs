use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tracing::warn;

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub store: &'static str,
}

/// GET /api/health
///
/// Always 200 so load balancers can tell "up but degraded" from "down".
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    let healthy = state.db.health_check().await;
    if !healthy {
        warn!(store = state.db.kind(), "Store health check failed");
    }

    Json(Health {
        status: if healthy { "ok" } else { "degraded" },
        store: state.db.kind(),
    })
}
