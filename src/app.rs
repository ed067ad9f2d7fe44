//! app.rs
use crate::handlers::{health_handler, migration_handler};
use crate::models::migration_model::ErrorResponse;
use actix_web::{error, middleware::DefaultHeaders, web, HttpResponse};

/// Headers CORS permisivos para todas las respuestas
pub fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", "*"))
        .add(("Access-Control-Allow-Methods", "GET, POST, DELETE, OPTIONS"))
        .add(("Access-Control-Allow-Headers", "*"))
}

/// Body JSON inválido -> 422 con el sobre de error
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let detail = err.to_string();
        error::InternalError::from_response(
            err,
            HttpResponse::UnprocessableEntity().json(ErrorResponse::new(
                "Request failed",
                Some(serde_json::Value::String(detail)),
            )),
        )
        .into()
    })
}

pub fn init_app(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/", web::get().to(health_handler::root_endpoint))
        .service(
            web::scope("/app/health")
                .route("", web::get().to(health_handler::health_check_endpoint))
                .route("/", web::get().to(health_handler::health_check_endpoint)),
        )
        .service(
            web::scope("/api/migrations")
                .route(
                    "/validate",
                    web::post().to(migration_handler::validate_migrations_endpoint),
                )
                .route(
                    "/start",
                    web::post().to(migration_handler::start_migration_endpoint),
                )
                .route("/jobs", web::get().to(migration_handler::list_jobs_endpoint))
                .route(
                    "/jobs/{job_id}",
                    web::get().to(migration_handler::get_job_endpoint),
                )
                .route(
                    "/jobs/{job_id}",
                    web::delete().to(migration_handler::delete_job_endpoint),
                )
                .route(
                    "/jobs/{job_id}/events",
                    web::get().to(migration_handler::job_events_endpoint),
                )
                .route(
                    "/jobs/{job_id}/rollback",
                    web::post().to(migration_handler::rollback_job_endpoint),
                ),
        )
        .default_service(web::to(health_handler::fallback_endpoint));
}
