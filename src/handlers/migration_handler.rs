//! handlers/migration_handler.rs
//! Endpoints de /api/migrations.

use actix_web::{web, HttpResponse};
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::json;

use crate::errors::MigrationError;
use crate::models::job_model::MigrationStatus;
use crate::models::migration_model::{
    ErrorResponse, JobListItem, RollbackRequest, StartMigrationRequest,
    ValidateMigrationsRequest,
};
use crate::services::job_runner_service::JobRunner;
use crate::services::progress_service::ProgressEvent;

const DEFAULT_LIST_LIMIT: u32 = 50;

#[derive(Deserialize)]
pub struct ListJobsQuery {
    limit: Option<u32>,
}

fn internal_error(context: &str, e: anyhow::Error) -> HttpResponse {
    log::error!("{}: {:?}", context, e);
    HttpResponse::InternalServerError().json(ErrorResponse::new(
        format!("{}: {}", context, e),
        None,
    ))
}

/// POST /api/migrations/validate
pub async fn validate_migrations_endpoint(
    runner: web::Data<JobRunner>,
    body: web::Json<ValidateMigrationsRequest>,
) -> HttpResponse {
    let req = body.into_inner();
    let runner = runner.into_inner();

    // la validación lee disco; no bloquear el worker de actix
    match web::block(move || runner.validate(&req.migrations_dir)).await {
        Ok(validation) => HttpResponse::Ok().json(validation),
        Err(e) => internal_error("Validation failed", anyhow::anyhow!(e.to_string())),
    }
}

/// POST /api/migrations/start
pub async fn start_migration_endpoint(
    runner: web::Data<JobRunner>,
    body: web::Json<StartMigrationRequest>,
) -> HttpResponse {
    match runner.start_from_request(body.into_inner()).await {
        Ok(resp) => HttpResponse::Accepted().json(resp),
        Err(e) => {
            if matches!(e, MigrationError::Internal(_) | MigrationError::CallbackFailed(_)) {
                log::error!("Error starting migration: {:?}", e);
            } else {
                log::warn!("Rejected migration request: {}", e);
            }
            e.to_response("Failed to start migration")
        }
    }
}

/// GET /api/migrations/jobs
pub async fn list_jobs_endpoint(
    runner: web::Data<JobRunner>,
    query: web::Query<ListJobsQuery>,
) -> HttpResponse {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);

    match runner.list_jobs(limit).await {
        Ok(jobs) => {
            let items: Vec<JobListItem> = jobs.iter().map(JobListItem::from).collect();
            HttpResponse::Ok().json(items)
        }
        Err(e) => internal_error("Failed to list jobs", e),
    }
}

/// GET /api/migrations/jobs/{job_id}
pub async fn get_job_endpoint(
    runner: web::Data<JobRunner>,
    path: web::Path<String>,
) -> HttpResponse {
    let job_id = path.into_inner();

    match runner.get_job_status(&job_id).await {
        Ok(Some(status)) => HttpResponse::Ok().json(status),
        Ok(None) => MigrationError::JobNotFound(job_id).to_response(""),
        Err(e) => internal_error("Failed to retrieve job status", e),
    }
}

/// DELETE /api/migrations/jobs/{job_id}
pub async fn delete_job_endpoint(
    runner: web::Data<JobRunner>,
    path: web::Path<String>,
) -> HttpResponse {
    let job_id = path.into_inner();

    match runner.delete_job(&job_id).await {
        Ok(_) => HttpResponse::Ok().json(json!({
            "job_id": job_id,
            "message": "Job history deleted"
        })),
        Err(e) => e.to_response("Failed to delete job"),
    }
}

/// POST /api/migrations/jobs/{job_id}/rollback
pub async fn rollback_job_endpoint(
    runner: web::Data<JobRunner>,
    path: web::Path<String>,
    body: web::Json<RollbackRequest>,
) -> HttpResponse {
    let job_id = path.into_inner();

    match runner.rollback_job(&job_id, body.into_inner()).await {
        Ok(resp) => HttpResponse::Accepted().json(resp),
        Err(e) => e.to_response("Failed to start rollback"),
    }
}

/// GET /api/migrations/jobs/{job_id}/events
///
/// Stream SSE: primero el estado actual y luego cada actualización hasta `job_complete`.
pub async fn job_events_endpoint(
    runner: web::Data<JobRunner>,
    path: web::Path<String>,
) -> HttpResponse {
    let job_id = path.into_inner();

    // suscribirse antes de leer el estado para no perder un `job_complete`
    let subscription = runner.progress_hub().subscribe(&job_id);

    let status = match runner.get_job_status(&job_id).await {
        Ok(Some(status)) => status,
        Ok(None) => return MigrationError::JobNotFound(job_id).to_response(""),
        Err(e) => return internal_error("Failed to retrieve job status", e),
    };

    let finished = status
        .status
        .parse::<MigrationStatus>()
        .map(|s| s.is_terminal())
        .unwrap_or(false);

    let mut frames = vec![ProgressEvent::ProgressUpdate(status.clone()).to_sse_frame()];
    if finished {
        frames.push(ProgressEvent::JobComplete(status).to_sse_frame());
    }
    let head = stream::iter(
        frames
            .into_iter()
            .map(|f| Ok::<_, std::io::Error>(Bytes::from(f))),
    );

    let body = if finished {
        drop(subscription);
        head.boxed_local()
    } else {
        // sin monitor vivo nadie publicaría el cierre del job
        if runner.spawn_monitor(&job_id) {
            log::info!("Started progress monitor for job {} on stream request", job_id);
        }
        let tail = stream::unfold(Some(subscription), |state| async move {
            let mut subscription = state?;
            let event = subscription.recv().await?;
            let done = matches!(event, ProgressEvent::JobComplete(_));
            let frame = Ok::<_, std::io::Error>(Bytes::from(event.to_sse_frame()));
            Some((frame, if done { None } else { Some(subscription) }))
        });
        head.chain(tail).boxed_local()
    };

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .append_header(("Cache-Control", "no-cache"))
        .streaming(body)
}
