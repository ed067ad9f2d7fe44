//! handlers/health_handler.rs
use actix_web::{http::Method, web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde_json::json;

use crate::models::migration_model::ErrorResponse;
use crate::services::state_service::StateManager;

pub const SERVICE_NAME: &str = "Database Migration API";

/// GET /
pub async fn root_endpoint() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "operational",
        "docs": "/api/migrations"
    }))
}

/// GET /app/health/
pub async fn health_check_endpoint(state_manager: web::Data<StateManager>) -> HttpResponse {
    match state_manager.ping().await {
        Ok(_) => HttpResponse::Ok().json(json!({
            "status": "healthy",
            "store": "connected",
            "timestamp": Utc::now().to_rfc3339()
        })),
        Err(e) => {
            log::error!("Health check failed: {:?}", e);
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "unhealthy",
                "error": e.to_string(),
                "timestamp": Utc::now().to_rfc3339()
            }))
        }
    }
}

/// Rutas no registradas: preflight CORS o 404 con el sobre de error
pub async fn fallback_endpoint(req: HttpRequest) -> HttpResponse {
    if req.method() == Method::OPTIONS {
        return HttpResponse::NoContent().finish();
    }

    HttpResponse::NotFound().json(ErrorResponse::new(
        "Not Found",
        Some(json!({ "path": req.path() })),
    ))
}
