use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use depot_core::ServiceError;

use super::ServiceState;
use crate::error::TaskError;
use crate::model::{ApplyWorkflowRequest, ParentKind, ParentRef, WorkflowView};

pub(super) fn router() -> Router<ServiceState> {
    Router::new()
        .route("/workflows", post(apply_workflow))
        .route("/workflows/{kind}/{parent_id}", get(get_workflow))
}

// ---------------------------------------------------------------------------
// POST /workflows
// ---------------------------------------------------------------------------

async fn apply_workflow(
    State(svc): State<ServiceState>,
    Json(req): Json<ApplyWorkflowRequest>,
) -> Result<(StatusCode, Json<WorkflowView>), TaskError> {
    let view = svc.apply(req)?;
    Ok((StatusCode::CREATED, Json(view)))
}

// ---------------------------------------------------------------------------
// GET /workflows/{kind}/{parent_id}
// ---------------------------------------------------------------------------

async fn get_workflow(
    State(svc): State<ServiceState>,
    Path((kind, parent_id)): Path<(String, String)>,
) -> Result<Json<WorkflowView>, TaskError> {
    let kind = ParentKind::parse(&kind)
        .ok_or_else(|| ServiceError::Validation(format!("unknown parent kind '{kind}'")))?;
    let view = svc.get_for_parent(&ParentRef {
        kind,
        id: parent_id,
    })?;
    Ok(Json(view))
}
