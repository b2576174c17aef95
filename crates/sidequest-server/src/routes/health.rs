use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use sidequest_core::ServiceStatus;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub service: ServiceStatus,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: state.service.status().clone(),
    })
}
