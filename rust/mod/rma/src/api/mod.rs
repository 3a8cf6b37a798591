mod batches;
mod products;

use std::sync::Arc;

use axum::Router;

use crate::service::RmaService;

type ServiceState = Arc<RmaService>;

/// Build the complete RMA module router.
///
/// Routes:
/// - `POST   /rma/v1/batches`                         : open a draft batch
/// - `GET    /rma/v1/batches`                         : list (status, supplierId)
/// - `GET    /rma/v1/batches/{id}`                    : batch + products
/// - `GET    /rma/v1/batches/{id}/products`
/// - `POST   /rma/v1/batches/{id}/products`           : add a unit
/// - `DELETE /rma/v1/batches/{id}/products/{entry}`   : by entry id or serial
/// - `POST   /rma/v1/batches/{id}/@finalize`
/// - `POST   /rma/v1/batches/{id}/@ship`
/// - `POST   /rma/v1/batches/{id}/@complete`
/// - `PATCH  /rma/v1/batches/{id}/shipping`
/// - `PATCH  /rma/v1/batches/{id}/notes`
pub fn router(service: Arc<RmaService>) -> Router {
    Router::new().nest(
        "/rma/v1",
        Router::new()
            .merge(batches::router())
            .merge(products::router())
            .with_state(service),
    )
}
