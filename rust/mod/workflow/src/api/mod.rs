mod tasks;
mod workflows;

use std::sync::Arc;

use axum::Router;

use crate::service::WorkflowService;

type ServiceState = Arc<WorkflowService>;

/// Build the complete workflow module router.
///
/// Routes:
/// - `POST /workflow/v1/workflows`                   : apply template
/// - `GET  /workflow/v1/workflows/{kind}/{parentId}` : workflow + tasks
/// - `GET  /workflow/v1/tasks`                       : list / queue
/// - `GET  /workflow/v1/tasks/{id}`                  : get task
/// - `POST /workflow/v1/tasks/{id}/@start`
/// - `POST /workflow/v1/tasks/{id}/@complete`
/// - `POST /workflow/v1/tasks/{id}/@block`
/// - `POST /workflow/v1/tasks/{id}/@unblock`
/// - `POST /workflow/v1/tasks/{id}/@skip`
/// - `POST /workflow/v1/tasks/{id}/@assign`
pub fn router(service: Arc<WorkflowService>) -> Router {
    Router::new().nest(
        "/workflow/v1",
        Router::new()
            .merge(workflows::router())
            .merge(tasks::router())
            .with_state(service),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use depot_core::MemoryAudit;
    use depot_sql::SqliteStore;
    use tower::ServiceExt;

    use crate::store::WorkflowStore;

    fn setup() -> Router {
        let db = Arc::new(SqliteStore::open_in_memory().unwrap());
        let svc = WorkflowService::new(
            WorkflowStore::new(db).unwrap(),
            Arc::new(MemoryAudit::new()),
        );
        router(Arc::new(svc))
    }

    async fn call(
        router: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let body = match body {
            Some(v) => Body::from(serde_json::to_string(&v).unwrap()),
            None => Body::empty(),
        };
        let resp = router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::json!(null)
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::json!(null))
        };
        (status, json)
    }

    async fn apply_three(r: &Router, mode: &str) -> Vec<String> {
        let (s, body) = call(
            r,
            "POST",
            "/workflow/v1/workflows",
            Some(serde_json::json!({
                "parentKind": "ticket",
                "parentId": "T-42",
                "template": "repair",
                "mode": mode,
                "steps": [{"name": "Diagnose"}, {"name": "Repair"}, {"name": "QA", "required": false}]
            })),
        )
        .await;
        assert_eq!(s, StatusCode::CREATED, "{body}");
        body["tasks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["id"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn sequence_violation_is_409_with_blocking_task() {
        let r = setup();
        let ids = apply_three(&r, "strict").await;

        let (s, body) = call(&r, "POST", &format!("/workflow/v1/tasks/{}/@start", ids[1]), None).await;
        assert_eq!(s, StatusCode::CONFLICT);
        assert_eq!(body["code"], "SEQUENCE_VIOLATION");
        assert_eq!(body["details"]["blockingTask"]["id"], ids[0].as_str());
        assert_eq!(body["details"]["blockingTask"]["name"], "Diagnose");
    }

    #[tokio::test]
    async fn full_task_cycle() {
        let r = setup();
        let ids = apply_three(&r, "strict").await;

        let (s, body) = call(&r, "POST", &format!("/workflow/v1/tasks/{}/@start", ids[0]), None).await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(body["task"]["status"], "in_progress");

        let (s, body) = call(
            &r,
            "POST",
            &format!("/workflow/v1/tasks/{}/@block", ids[0]),
            Some(serde_json::json!({"reason": ""})),
        )
        .await;
        assert_eq!(s, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");

        let (s, _) = call(
            &r,
            "POST",
            &format!("/workflow/v1/tasks/{}/@block", ids[0]),
            Some(serde_json::json!({"reason": "no parts"})),
        )
        .await;
        assert_eq!(s, StatusCode::OK);

        let (s, _) = call(&r, "POST", &format!("/workflow/v1/tasks/{}/@unblock", ids[0]), None).await;
        assert_eq!(s, StatusCode::OK);

        let (s, body) = call(
            &r,
            "POST",
            &format!("/workflow/v1/tasks/{}/@complete", ids[0]),
            Some(serde_json::json!({"notes": "done"})),
        )
        .await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(body["task"]["status"], "completed");
        assert_eq!(body["task"]["completionNotes"], "done");
        assert!(body.get("warnings").is_none());

        let (s, body) = call(&r, "POST", &format!("/workflow/v1/tasks/{}/@skip", ids[2]), None).await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(body["task"]["status"], "skipped");

        let (s, body) = call(&r, "GET", "/workflow/v1/workflows/ticket/T-42", None).await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(body["workflow"]["mode"], "strict");
        assert_eq!(body["tasks"][0]["status"], "completed");
    }

    #[tokio::test]
    async fn flexible_complete_returns_warning() {
        let r = setup();
        let ids = apply_three(&r, "flexible").await;

        call(&r, "POST", &format!("/workflow/v1/tasks/{}/@start", ids[1]), None).await;
        let (s, body) = call(&r, "POST", &format!("/workflow/v1/tasks/{}/@complete", ids[1]), None).await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(body["warnings"][0]["code"], "OUT_OF_SEQUENCE");
        assert_eq!(body["warnings"][0]["predecessor"]["sequence"], 1);
    }

    #[tokio::test]
    async fn unknown_task_and_parent_kind() {
        let r = setup();
        let (s, body) = call(&r, "GET", "/workflow/v1/tasks/nope", None).await;
        assert_eq!(s, StatusCode::NOT_FOUND);
        assert_eq!(body["details"]["taskId"], "nope");

        let (s, body) = call(&r, "GET", "/workflow/v1/workflows/invoice/1", None).await;
        assert_eq!(s, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let r = setup();
        let ids = apply_three(&r, "strict").await;
        call(&r, "POST", &format!("/workflow/v1/tasks/{}/@start", ids[0]), None).await;

        let (s, body) = call(&r, "GET", "/workflow/v1/tasks?status=in_progress", None).await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["items"][0]["id"], ids[0].as_str());
    }
}
