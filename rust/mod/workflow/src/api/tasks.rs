use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use super::ServiceState;
use crate::error::TaskError;
use crate::model::{
    AssignRequest, BlockRequest, CompleteRequest, SkipRequest, TaskListQuery, TaskOutcome,
    WorkflowTask,
};

pub(super) fn router() -> Router<ServiceState> {
    Router::new()
        .route("/tasks", get(list_tasks))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}/@start", post(start_task))
        .route("/tasks/{id}/@complete", post(complete_task))
        .route("/tasks/{id}/@block", post(block_task))
        .route("/tasks/{id}/@unblock", post(unblock_task))
        .route("/tasks/{id}/@skip", post(skip_task))
        .route("/tasks/{id}/@assign", post(assign_task))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

async fn list_tasks(
    State(svc): State<ServiceState>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<serde_json::Value>, TaskError> {
    let result = svc.list_tasks(&query)?;
    Ok(Json(serde_json::json!({
        "items": result.items,
        "total": result.total,
    })))
}

async fn get_task(
    State(svc): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowTask>, TaskError> {
    Ok(Json(svc.get_task(&id)?))
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

async fn start_task(
    State(svc): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<TaskOutcome>, TaskError> {
    Ok(Json(svc.start(&id)?))
}

async fn complete_task(
    State(svc): State<ServiceState>,
    Path(id): Path<String>,
    body: Option<Json<CompleteRequest>>,
) -> Result<Json<TaskOutcome>, TaskError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    Ok(Json(svc.complete(&id, req.notes.as_deref())?))
}

async fn block_task(
    State(svc): State<ServiceState>,
    Path(id): Path<String>,
    Json(req): Json<BlockRequest>,
) -> Result<Json<TaskOutcome>, TaskError> {
    Ok(Json(svc.block(&id, &req.reason)?))
}

async fn unblock_task(
    State(svc): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<TaskOutcome>, TaskError> {
    Ok(Json(svc.unblock(&id)?))
}

async fn skip_task(
    State(svc): State<ServiceState>,
    Path(id): Path<String>,
    body: Option<Json<SkipRequest>>,
) -> Result<Json<TaskOutcome>, TaskError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    Ok(Json(svc.skip(&id, req.reason.as_deref())?))
}

async fn assign_task(
    State(svc): State<ServiceState>,
    Path(id): Path<String>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<TaskOutcome>, TaskError> {
    Ok(Json(svc.assign(&id, req.assignee.as_deref())?))
}
