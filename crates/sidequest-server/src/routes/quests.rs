use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde_json::Value;
use sidequest_schema::QuestRequest;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(create_quest))
}

async fn create_quest(
    State(state): State<AppState>,
    payload: Result<Json<QuestRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let outcome = state.service.generate(request).await?;
    Ok(Json(outcome.to_json()))
}
