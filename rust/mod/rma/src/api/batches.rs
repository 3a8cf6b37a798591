use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};

use super::ServiceState;
use crate::error::BatchError;
use crate::model::{BatchListQuery, BatchOutcome, BatchView, CreateBatchRequest, NotesRequest, ShippingInfo};

pub(super) fn router() -> Router<ServiceState> {
    Router::new()
        .route("/batches", post(create_batch).get(list_batches))
        .route("/batches/{id}", get(get_batch))
        .route("/batches/{id}/@finalize", post(finalize_batch))
        .route("/batches/{id}/@ship", post(ship_batch))
        .route("/batches/{id}/@complete", post(complete_batch))
        .route("/batches/{id}/shipping", patch(update_shipping))
        .route("/batches/{id}/notes", patch(update_notes))
}

async fn create_batch(
    State(svc): State<ServiceState>,
    Json(req): Json<CreateBatchRequest>,
) -> Result<(StatusCode, Json<BatchView>), BatchError> {
    let view = svc.create_batch(req)?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn list_batches(
    State(svc): State<ServiceState>,
    Query(query): Query<BatchListQuery>,
) -> Result<Json<serde_json::Value>, BatchError> {
    let result = svc.list_batches(&query)?;
    Ok(Json(serde_json::json!({
        "items": result.items,
        "total": result.total,
    })))
}

async fn get_batch(
    State(svc): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<BatchView>, BatchError> {
    Ok(Json(svc.get_batch(&id)?))
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

async fn finalize_batch(
    State(svc): State<ServiceState>,
    Path(id): Path<String>,
    body: Option<Json<ShippingInfo>>,
) -> Result<Json<BatchOutcome>, BatchError> {
    let info = body.map(|Json(b)| b).unwrap_or_default();
    Ok(Json(svc.finalize(&id, &info)?))
}

async fn ship_batch(
    State(svc): State<ServiceState>,
    Path(id): Path<String>,
    body: Option<Json<ShippingInfo>>,
) -> Result<Json<BatchOutcome>, BatchError> {
    let info = body.map(|Json(b)| b).unwrap_or_default();
    Ok(Json(svc.ship(&id, &info)?))
}

async fn complete_batch(
    State(svc): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<BatchOutcome>, BatchError> {
    Ok(Json(svc.complete(&id)?))
}

async fn update_shipping(
    State(svc): State<ServiceState>,
    Path(id): Path<String>,
    Json(info): Json<ShippingInfo>,
) -> Result<Json<BatchOutcome>, BatchError> {
    Ok(Json(svc.update_shipping(&id, &info)?))
}

async fn update_notes(
    State(svc): State<ServiceState>,
    Path(id): Path<String>,
    Json(req): Json<NotesRequest>,
) -> Result<Json<BatchOutcome>, BatchError> {
    Ok(Json(svc.update_notes(&id, req.notes.as_deref())?))
}
