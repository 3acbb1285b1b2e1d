//! Workflow endpoints (stubs).

use actix_web::HttpResponse;
use serde_json::json;
use studio_shared::ApiResponse;
use uuid::Uuid;

/// POST /api/workflows/start
pub async fn start_workflow() -> HttpResponse {
    HttpResponse::Accepted().json(ApiResponse::ok_with_message(
        json!({ "workflow_id": Uuid::new_v4(), "state": "queued" }),
        "Workflow start accepted",
    ))
}
