//! HTTP handlers and route configuration.
//!
//! Domain endpoints are stubs returning mock payloads; the admission
//! middleware in front of them is the real subsystem. The mutation routes
//! match the endpoint-specific entries in the default policy table.

mod health;
mod payments;
mod projects;
mod workflows;

use actix_web::web;

/// Configure all application routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health::health_check))
            .route("/projects", web::post().to(projects::create_project))
            .route("/projects", web::get().to(projects::list_projects))
            .route("/workflows/start", web::post().to(workflows::start_workflow))
            .route("/payments/charge", web::post().to(payments::charge)),
    );
}
