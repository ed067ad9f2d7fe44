//! errors.rs
//! Errores de dominio que se traducen a códigos HTTP.

use actix_web::{http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;

use crate::models::migration_model::ErrorResponse;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Invalid migrations directory")]
    InvalidDirectory { errors: Vec<String> },

    #[error("Migration validation failed")]
    ValidationFailed {
        errors: Vec<String>,
        warnings: Vec<String>,
    },

    #[error("No migration scripts found")]
    NoScripts,

    #[error("No tenants supplied")]
    NoTenants,

    #[error("Job {0} not found")]
    JobNotFound(String),

    #[error("Before job callback failed: {0}")]
    CallbackFailed(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl MigrationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MigrationError::InvalidDirectory { .. }
            | MigrationError::ValidationFailed { .. }
            | MigrationError::NoScripts
            | MigrationError::NoTenants => StatusCode::BAD_REQUEST,
            MigrationError::JobNotFound(_) => StatusCode::NOT_FOUND,
            MigrationError::CallbackFailed(_) | MigrationError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Arma el `ErrorResponse`; `context` se antepone a los errores 500.
    pub fn to_response(&self, context: &str) -> HttpResponse {
        let body = match self {
            MigrationError::InvalidDirectory { errors } => ErrorResponse::new(
                self.to_string(),
                Some(json!({ "validation_errors": errors })),
            ),
            MigrationError::ValidationFailed { errors, warnings } => ErrorResponse::new(
                self.to_string(),
                Some(json!({
                    "validation_errors": errors,
                    "validation_warnings": warnings
                })),
            ),
            MigrationError::CallbackFailed(_) | MigrationError::Internal(_) => {
                ErrorResponse::new(format!("{}: {}", context, self), None)
            }
            _ => ErrorResponse::new(self.to_string(), None),
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}
