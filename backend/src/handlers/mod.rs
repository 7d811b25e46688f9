use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::json;
use std::sync::Arc;

use crate::AppState;

pub mod workflows;

pub use workflows::workflow_routes;

pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "deskflow-api",
            "workflows": state.engine.list_workflows().await.len(),
            "schedulerEnabled": state.config.scheduler_enabled,
        })),
    )
}
