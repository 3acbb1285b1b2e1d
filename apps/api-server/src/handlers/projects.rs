//! Project endpoints (stubs).

use actix_web::HttpResponse;
use serde_json::json;
use studio_shared::ApiResponse;
use uuid::Uuid;

/// POST /api/projects
pub async fn create_project() -> HttpResponse {
    HttpResponse::Created().json(ApiResponse::ok(json!({
        "id": Uuid::new_v4(),
        "status": "draft",
        "created_at": chrono::Utc::now().to_rfc3339(),
    })))
}

/// GET /api/projects
pub async fn list_projects() -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(json!({ "projects": [] })))
}
