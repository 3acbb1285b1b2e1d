//! Payment endpoints (stubs).

use actix_web::HttpResponse;
use serde_json::json;
use studio_shared::ApiResponse;
use uuid::Uuid;

/// POST /api/payments/charge
pub async fn charge() -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(json!({
        "charge_id": Uuid::new_v4(),
        "status": "pending",
    })))
}
