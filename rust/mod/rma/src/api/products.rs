use axum::extract::{Path, State};
use axum::routing::{delete, get};
use axum::{Json, Router};

use super::ServiceState;
use crate::error::BatchError;
use crate::model::{AddProductRequest, BatchOutcome, BatchProduct};

pub(super) fn router() -> Router<ServiceState> {
    Router::new()
        .route("/batches/{id}/products", get(list_products).post(add_product))
        .route("/batches/{id}/products/{entry}", delete(remove_product))
}

async fn list_products(
    State(svc): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<BatchProduct>>, BatchError> {
    Ok(Json(svc.list_products(&id)?))
}

async fn add_product(
    State(svc): State<ServiceState>,
    Path(id): Path<String>,
    Json(req): Json<AddProductRequest>,
) -> Result<Json<BatchOutcome>, BatchError> {
    Ok(Json(svc.add_product(&id, req)?))
}

/// `entry` is either the entry id or the unit's serial number.
async fn remove_product(
    State(svc): State<ServiceState>,
    Path((id, entry)): Path<(String, String)>,
) -> Result<Json<BatchOutcome>, BatchError> {
    Ok(Json(svc.remove_product(&id, &entry)?))
}
