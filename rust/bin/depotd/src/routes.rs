//! Route registration: module routers plus system endpoints.

use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

/// Merge every module router with `/health` and `/version`.
///
/// Module routers already carry their `/{module}/v1` prefix.
pub fn build_router(module_routes: Vec<(&str, Router)>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/version", get(version));

    for (name, router) in module_routes {
        tracing::debug!(module = name, "mounting module routes");
        app = app.merge(router);
    }
    app
}

async fn health() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
    }))
}

async fn version() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": "depotd",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
