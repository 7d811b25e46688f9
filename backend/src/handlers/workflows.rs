use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use deskflow_shared::{
    AuditLogResponse, CreateWorkflowRequest, DeleteResponse, EventDispatchRequest,
    EventDispatchResponse, RunListResponse, TriggerSource, UpdateWorkflowRequest,
    ValidationResponse, Workflow, WorkflowListResponse, WorkflowRun,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::validation::{validate_workflow, WorkflowCandidate};
use crate::workflows::engine::apply_update;
use crate::workflows::triggers::TriggerEvent;
use crate::AppState;

const DEFAULT_AUDIT_PAGE: usize = 100;

pub fn workflow_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_workflows).post(create_workflow))
        .route("/validate", post(validate_workflow_body))
        .route("/audit", get(audit_log))
        .route("/events", post(dispatch_event))
        .route(
            "/:id",
            get(get_workflow).put(update_workflow).delete(delete_workflow),
        )
        .route("/:id/run", post(run_workflow))
        .route("/:id/runs", get(list_runs))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub workflow_id: Option<Uuid>,
    pub limit: Option<usize>,
}

/// Malformed bodies and unknown tags are a 400, before any rule checks run
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

// ==================== Handlers ====================

async fn list_workflows(State(state): State<Arc<AppState>>) -> Json<WorkflowListResponse> {
    Json(WorkflowListResponse {
        workflows: state.engine.list_workflows().await,
    })
}

async fn create_workflow(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateWorkflowRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Workflow>)> {
    let request = body(payload)?;

    let outcome = validate_workflow(WorkflowCandidate::from(&request));
    if !outcome.valid {
        return Err(ApiError::validation(outcome.errors));
    }

    let workflow = state.engine.create_workflow(request).await;
    Ok((StatusCode::CREATED, Json(workflow)))
}

async fn validate_workflow_body(
    payload: Result<Json<CreateWorkflowRequest>, JsonRejection>,
) -> ApiResult<Json<ValidationResponse>> {
    let request = body(payload)?;
    let outcome = validate_workflow(WorkflowCandidate::from(&request));
    Ok(Json(ValidationResponse {
        valid: outcome.valid,
        errors: outcome.errors,
    }))
}

async fn get_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Workflow>> {
    state
        .engine
        .get_workflow(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Workflow {}", id)))
}

async fn update_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateWorkflowRequest>, JsonRejection>,
) -> ApiResult<Json<Workflow>> {
    let partial = body(payload)?;

    let existing = state
        .engine
        .get_workflow(id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Workflow {}", id)))?;

    // Rules apply to the record as it would be stored, not to the partial body
    let merged = apply_update(&existing, &partial, chrono::Utc::now());
    let outcome = validate_workflow(WorkflowCandidate::from(&merged));
    if !outcome.valid {
        return Err(ApiError::validation(outcome.errors));
    }

    state
        .engine
        .update_workflow(id, partial)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Workflow {}", id)))
}

async fn delete_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Json<DeleteResponse> {
    Json(DeleteResponse {
        success: state.engine.delete_workflow(id).await,
    })
}

async fn run_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WorkflowRun>> {
    let run = state
        .engine
        .trigger_workflow(id, TriggerSource::Manual)
        .await?;
    Ok(Json(run))
}

async fn list_runs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Json<RunListResponse> {
    Json(RunListResponse {
        runs: state.engine.get_workflow_runs(id).await,
    })
}

async fn audit_log(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditQuery>,
) -> Json<AuditLogResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_PAGE);
    let entries = match query.workflow_id {
        Some(id) => state.engine.audit_log_for(id, limit).await,
        None => state.engine.audit_log(limit).await,
    };
    Json(AuditLogResponse { entries })
}

async fn dispatch_event(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<EventDispatchRequest>, JsonRejection>,
) -> ApiResult<Json<EventDispatchResponse>> {
    let request = body(payload)?;
    let event = TriggerEvent::new(request.event_type, request.event_data);

    let dispatch = state.engine.dispatch_event(event).await;
    Ok(Json(EventDispatchResponse {
        matched: dispatch.matched,
        runs: dispatch.runs,
        rate_limited: dispatch.rate_limited,
    }))
}
