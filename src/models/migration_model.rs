//! models/migration_model.rs
//! Estructuras de scripts de migración y requests/responses de la API.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::models::job_model::{MigrationJobState, TenantMigrationResult};

/// Tipo de script según el prefijo del nombre de archivo (V, R, S)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptType {
    Migration,
    Rollback,
    Seed,
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptType::Migration => write!(f, "migration"),
            ScriptType::Rollback => write!(f, "rollback"),
            ScriptType::Seed => write!(f, "seed"),
        }
    }
}

/// Un script cargado desde el directorio de migraciones
#[derive(Debug, Clone)]
pub struct MigrationScript {
    pub filename: String,
    pub filepath: PathBuf,
    pub version: String,
    pub description: String,
    pub script_type: ScriptType,
    pub content: String,
}

impl MigrationScript {
    /// Forma "plana" que viaja hacia los workers.
    pub fn to_payload(&self) -> ScriptPayload {
        ScriptPayload {
            filename: self.filename.clone(),
            content: self.content.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            script_type: self.script_type,
        }
    }
}

impl fmt::Display for MigrationScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MigrationScript(v{}: {})", self.version, self.description)
    }
}

/// Script serializable (lo que reciben workers y callbacks)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptPayload {
    pub filename: String,
    pub content: String,
    pub version: String,
    pub description: String,
    pub script_type: ScriptType,
}

/// Modo de ejecución de la migración
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MigrationMode {
    #[default]
    DryRun,
    Apply,
    /// Se comporta como `dry_run`: valida y registra los scripts pero nunca
    /// ejecuta SQL contra las bases de los tenants.
    ValidateOnly,
}

impl MigrationMode {
    /// `validate_only` nunca toca las bases de los tenants
    pub fn is_dry_run(&self) -> bool {
        !matches!(self, MigrationMode::Apply)
    }
}

/// Datos de conexión de un tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartMigrationTenantRequest {
    /// Puede ser guid, int, lo que sirva para identificar al tenant en logs
    pub tenant_id: String,
    #[serde(default)]
    pub tenant_name: Option<String>,
    pub user: String,
    pub password: String,
    pub database_name: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub connection_string: Option<String>,
}

impl StartMigrationTenantRequest {
    /// Nombre legible; si no viene se usa el id
    pub fn display_name(&self) -> &str {
        self.tenant_name.as_deref().unwrap_or(&self.tenant_id)
    }
}

// No queremos passwords en los logs
impl fmt::Display for StartMigrationTenantRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}@{}/{})",
            self.tenant_id,
            self.user,
            self.host.as_deref().unwrap_or("localhost"),
            self.database_name
        )
    }
}

fn default_parallel() -> bool {
    true
}

/// Request para iniciar un job de migración
#[derive(Debug, Clone, Deserialize)]
pub struct StartMigrationRequest {
    pub tenants: Vec<StartMigrationTenantRequest>,
    pub migrations_dir: String,
    #[serde(default)]
    pub mode: MigrationMode,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    #[serde(default)]
    pub job_name: Option<String>,
}

/// Request para validar sin ejecutar
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateMigrationsRequest {
    pub migrations_dir: String,
}

/// Request para revertir un job ya ejecutado
#[derive(Debug, Clone, Deserialize)]
pub struct RollbackRequest {
    pub migrations_dir: String,
    pub tenants: Vec<StartMigrationTenantRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub scripts_found: usize,
    pub report: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartMigrationResponse {
    pub job_id: String,
    pub task_id: String,
    pub message: String,
    pub status_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackResponse {
    pub job_id: String,
    pub tenant_count: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantResultResponse {
    pub tenant_id: String,
    pub status: String,
    pub scripts_applied: Vec<String>,
    pub scripts_skipped: Vec<String>,
    pub callback_metadata: HashMap<String, serde_json::Value>,
    pub error_message: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub duration_seconds: Option<f64>,
}

impl From<&TenantMigrationResult> for TenantResultResponse {
    fn from(r: &TenantMigrationResult) -> Self {
        TenantResultResponse {
            tenant_id: r.tenant_id.clone(),
            status: r.status.to_string(),
            scripts_applied: r.scripts_applied.clone(),
            scripts_skipped: r.scripts_skipped.clone(),
            callback_metadata: r.callback_metadata.clone(),
            error_message: r.error_message.clone(),
            started_at: r.started_at.clone(),
            completed_at: r.completed_at.clone(),
            duration_seconds: r.duration_seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgressResponse {
    pub total: usize,
    pub completed: usize,
    pub successful: usize,
    pub failed: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub job_name: Option<String>,
    pub status: String,
    pub progress: JobProgressResponse,
    pub started_at: String,
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub tenant_results: HashMap<String, TenantResultResponse>,
}

impl From<&MigrationJobState> for JobStatusResponse {
    fn from(job: &MigrationJobState) -> Self {
        let percent = if job.total_tenants > 0 {
            job.completed_tenants as f64 / job.total_tenants as f64 * 100.0
        } else {
            0.0
        };

        JobStatusResponse {
            job_id: job.job_id.clone(),
            job_name: job.job_name.clone(),
            status: job.status.to_string(),
            progress: JobProgressResponse {
                total: job.total_tenants,
                completed: job.completed_tenants,
                successful: job.successful_tenants,
                failed: job.failed_tenants,
                percent,
            },
            started_at: job.started_at.clone(),
            completed_at: job.completed_at.clone(),
            error_message: job.error_message.clone(),
            tenant_results: job
                .tenant_results
                .iter()
                .map(|(k, v)| (k.clone(), TenantResultResponse::from(v)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListItem {
    pub job_id: String,
    pub job_name: Option<String>,
    pub status: String,
    pub total_tenants: usize,
    pub successful_tenants: usize,
    pub failed_tenants: usize,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl From<&MigrationJobState> for JobListItem {
    fn from(job: &MigrationJobState) -> Self {
        JobListItem {
            job_id: job.job_id.clone(),
            job_name: job.job_name.clone(),
            status: job.status.to_string(),
            total_tenants: job.total_tenants,
            successful_tenants: job.successful_tenants,
            failed_tenants: job.failed_tenants,
            started_at: job.started_at.clone(),
            completed_at: job.completed_at.clone(),
        }
    }
}

/// Sobre estándar de error para todas las respuestas fallidas
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: Option<serde_json::Value>,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, detail: Option<serde_json::Value>) -> Self {
        ErrorResponse {
            error: error.into(),
            detail,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
