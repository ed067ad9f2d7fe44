//! services/job_runner_service.rs
//! Orquesta los jobs: valida, crea el estado, agenda los tenants (en paralelo o en
//! secuencia) y finaliza cuando todos terminaron.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::errors::MigrationError;
use crate::models::callback_model::{CallbackContext, CallbackHook};
use crate::models::job_model::{MigrationJobState, MigrationStatus};
use crate::models::migration_model::{
    JobStatusResponse, RollbackRequest, RollbackResponse, ScriptPayload, ScriptType,
    StartMigrationRequest, StartMigrationResponse, StartMigrationTenantRequest,
    ValidationResponse,
};
use crate::services::callback_service::CallbackRegistry;
use crate::services::progress_service::{monitor_job_progress, ProgressHub};
use crate::services::state_service::StateManager;
use crate::services::validator_service::MigrationValidator;
use crate::services::worker_service::MigrationWorker;

/// Lo que devuelve `start_migration_job` apenas quedan agendados los tenants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartedJob {
    pub job_id: String,
    pub task_ids: Vec<String>,
    /// "chord" (paralelo + finalización) o "sequential"
    pub task_type: String,
    pub tenant_count: usize,
    pub mode: String,
}

#[derive(Clone)]
pub struct JobRunner {
    state_manager: StateManager,
    worker: MigrationWorker,
    callbacks: Arc<CallbackRegistry>,
    progress_hub: ProgressHub,
    max_parallel: usize,
    monitor_interval: Duration,
}

impl JobRunner {
    pub fn new(
        state_manager: StateManager,
        worker: MigrationWorker,
        callbacks: Arc<CallbackRegistry>,
        progress_hub: ProgressHub,
        max_parallel: usize,
        monitor_interval: Duration,
    ) -> Self {
        JobRunner {
            state_manager,
            worker,
            callbacks,
            progress_hub,
            max_parallel: max_parallel.max(1),
            monitor_interval,
        }
    }

    pub fn progress_hub(&self) -> &ProgressHub {
        &self.progress_hub
    }

    /// Arranca el monitor de progreso del job salvo que ya haya uno vivo.
    /// Devuelve `true` si lo lanzó.
    pub fn spawn_monitor(&self, job_id: &str) -> bool {
        let Some(claim) = self.progress_hub.claim_monitor(job_id) else {
            return false;
        };

        let runner = self.clone();
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            let _claim = claim;
            let hub = runner.progress_hub.clone();
            let interval = runner.monitor_interval;
            monitor_job_progress(runner, hub, job_id, interval).await;
        });
        true
    }

    /// Valida sin ejecutar nada
    pub fn validate(&self, migrations_dir: &str) -> ValidationResponse {
        let mut validator = MigrationValidator::new(migrations_dir);

        if !validator.validate_directory_structure() {
            return ValidationResponse {
                valid: false,
                errors: validator.errors.clone(),
                warnings: validator.warnings.clone(),
                scripts_found: 0,
                report: validator.get_report(),
            };
        }

        let scripts = validator.load_scripts();
        ValidationResponse {
            valid: validator.errors.is_empty(),
            errors: validator.errors.clone(),
            warnings: validator.warnings.clone(),
            scripts_found: scripts.len(),
            report: validator.get_report(),
        }
    }

    /// Carga los scripts de un directorio o devuelve el error de validación.
    fn load_valid_scripts(&self, migrations_dir: &str) -> Result<Vec<ScriptPayload>, MigrationError> {
        let mut validator = MigrationValidator::new(migrations_dir);

        if !validator.validate_directory_structure() {
            return Err(MigrationError::InvalidDirectory {
                errors: validator.errors,
            });
        }

        let scripts = validator.load_scripts();
        if !validator.errors.is_empty() {
            return Err(MigrationError::ValidationFailed {
                errors: validator.errors,
                warnings: validator.warnings,
            });
        }

        Ok(scripts.iter().map(|s| s.to_payload()).collect())
    }

    /// Flujo completo de POST /api/migrations/start
    pub async fn start_from_request(
        &self,
        request: StartMigrationRequest,
    ) -> Result<StartMigrationResponse, MigrationError> {
        log::info!("Beginning processing of migration job");

        if request.tenants.is_empty() {
            return Err(MigrationError::NoTenants);
        }

        let scripts = self.load_valid_scripts(&request.migrations_dir)?;
        if scripts.is_empty() {
            return Err(MigrationError::NoScripts);
        }

        let job_id = self.generate_job_id(request.tenants.len()).await?;
        let tenant_count = request.tenants.len();

        let started = self
            .start_migration_job(
                &job_id,
                request.job_name,
                request.tenants,
                scripts,
                request.mode.is_dry_run(),
                request.parallel,
            )
            .await?;

        self.spawn_monitor(&job_id);

        log::info!(
            "Started migration job {} with {} tenants",
            job_id,
            tenant_count
        );

        Ok(StartMigrationResponse {
            job_id: job_id.clone(),
            task_id: started.job_id,
            message: format!("Migration job started for {} tenant(s)", tenant_count),
            status_url: format!("/api/migrations/jobs/{}", job_id),
        })
    }

    /// `migration_<fecha>_<n>_tenants`; si ya existe se agrega un sufijo aleatorio
    pub async fn generate_job_id(&self, tenant_count: usize) -> Result<String> {
        let base = format!(
            "migration_{}_{}_tenants",
            Utc::now().format("%Y%m%d_%H%M%S"),
            tenant_count
        );

        if !self.state_manager.job_exists(&base).await? {
            return Ok(base);
        }

        let suffix = Uuid::new_v4().simple().to_string();
        Ok(format!("{}_{}", base, &suffix[..8]))
    }

    /// Corre before_job, crea el job y agenda los tenants. Retorna sin esperar.
    pub async fn start_migration_job(
        &self,
        job_id: &str,
        job_name: Option<String>,
        tenants: Vec<StartMigrationTenantRequest>,
        scripts: Vec<ScriptPayload>,
        dry_run: bool,
        parallel: bool,
    ) -> Result<StartedJob, MigrationError> {
        log::info!(
            "Starting job {}: tenants={}, scripts={}, dry_run={}, parallel={}",
            job_id,
            tenants.len(),
            scripts.len(),
            dry_run,
            parallel
        );

        let tenant_ids: Vec<String> = tenants.iter().map(|t| t.tenant_id.clone()).collect();
        let mut context =
            CallbackContext::for_job(job_id, scripts.clone()).with_metadata("tenants", json!(tenant_ids));

        let callback_result = self
            .callbacks
            .run_callbacks(CallbackHook::BeforeJob, &mut context)
            .await;
        if !callback_result.success {
            log::error!(
                "Failed to run before_job callbacks: {}",
                callback_result.message_or_empty()
            );
            return Err(MigrationError::CallbackFailed(
                callback_result.message_or_empty().to_string(),
            ));
        }

        self.state_manager
            .create_job(job_id, job_name, &tenants)
            .await?;
        self.state_manager
            .update_job_status(job_id, MigrationStatus::Running)
            .await?;

        let tenant_count = tenants.len();
        let scripts = Arc::new(scripts);

        if parallel {
            let chord_id = Uuid::new_v4().to_string();
            let runner = self.clone();
            let job_id_owned = job_id.to_string();

            tokio::spawn(async move {
                runner
                    .run_parallel(&job_id_owned, tenants, scripts, dry_run)
                    .await;
            });

            log::info!(
                "Parallel migration started - Chord ID: {} ({} tenant tasks)",
                chord_id,
                tenant_count
            );

            Ok(StartedJob {
                job_id: job_id.to_string(),
                task_ids: vec![chord_id],
                task_type: "chord".to_string(),
                tenant_count,
                mode: "parallel".to_string(),
            })
        } else {
            let task_ids: Vec<String> = tenants.iter().map(|_| Uuid::new_v4().to_string()).collect();
            let runner = self.clone();
            let job_id_owned = job_id.to_string();

            tokio::spawn(async move {
                runner
                    .run_sequential(&job_id_owned, tenants, scripts, dry_run)
                    .await;
            });

            log::info!(
                "Sequential migration started - {} tasks queued",
                task_ids.len()
            );

            Ok(StartedJob {
                job_id: job_id.to_string(),
                task_ids,
                task_type: "sequential".to_string(),
                tenant_count,
                mode: "sequential".to_string(),
            })
        }
    }

    async fn run_parallel(
        &self,
        job_id: &str,
        tenants: Vec<StartMigrationTenantRequest>,
        scripts: Arc<Vec<ScriptPayload>>,
        dry_run: bool,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));

        let tasks = tenants.into_iter().map(|tenant| {
            let semaphore = semaphore.clone();
            let scripts = scripts.clone();
            let worker = self.worker.clone();
            let job_id = job_id.to_string();

            tokio::spawn(async move {
                // el semáforo nunca se cierra
                let _permit = semaphore.acquire_owned().await.ok();
                worker
                    .apply_migration_to_tenant(&job_id, &tenant, &scripts, dry_run)
                    .await
            })
        });

        for joined in join_all(tasks).await {
            if let Err(e) = joined {
                log::error!("Tenant task for job {} panicked: {:?}", job_id, e);
            }
        }

        self.finalize(job_id).await;
    }

    async fn run_sequential(
        &self,
        job_id: &str,
        tenants: Vec<StartMigrationTenantRequest>,
        scripts: Arc<Vec<ScriptPayload>>,
        dry_run: bool,
    ) {
        for tenant in &tenants {
            log::info!("Running tenant {} for job {}", tenant, job_id);
            self.worker
                .apply_migration_to_tenant(job_id, tenant, &scripts, dry_run)
                .await;
        }

        self.finalize(job_id).await;
    }

    async fn finalize(&self, job_id: &str) {
        if let Err(e) = self.worker.finalize_migration_job(job_id).await {
            log::error!("Failed to finalize job {}: {:?}", job_id, e);
        }
    }

    pub async fn get_job_status(&self, job_id: &str) -> Result<Option<JobStatusResponse>> {
        Ok(self
            .state_manager
            .get_job(job_id)
            .await?
            .as_ref()
            .map(JobStatusResponse::from))
    }

    pub async fn list_jobs(&self, limit: u32) -> Result<Vec<MigrationJobState>> {
        self.state_manager.get_all_jobs(limit).await
    }

    pub async fn delete_job(&self, job_id: &str) -> Result<bool, MigrationError> {
        let deleted = self.state_manager.delete_job(job_id).await?;
        if !deleted {
            return Err(MigrationError::JobNotFound(job_id.to_string()));
        }
        Ok(deleted)
    }

    /// Agenda el rollback de los tenants indicados con los scripts `R...` del directorio.
    pub async fn rollback_job(
        &self,
        job_id: &str,
        request: RollbackRequest,
    ) -> Result<RollbackResponse, MigrationError> {
        if self.state_manager.get_job(job_id).await?.is_none() {
            return Err(MigrationError::JobNotFound(job_id.to_string()));
        }
        if request.tenants.is_empty() {
            return Err(MigrationError::NoTenants);
        }

        let mut rollback_scripts: Vec<ScriptPayload> = self
            .load_valid_scripts(&request.migrations_dir)?
            .into_iter()
            .filter(|s| s.script_type == ScriptType::Rollback)
            .collect();
        if rollback_scripts.is_empty() {
            return Err(MigrationError::NoScripts);
        }
        // el worker los corre en orden inverso: de la versión más alta a la más baja
        rollback_scripts.sort_by(|a, b| compare_versions(&a.version, &b.version));

        let tenant_count = request.tenants.len();
        let runner = self.clone();
        let job_id_owned = job_id.to_string();

        tokio::spawn(async move {
            let mut first_error: Option<String> = None;
            for tenant in &request.tenants {
                let outcome = runner
                    .worker
                    .rollback_migration(&job_id_owned, tenant, &rollback_scripts)
                    .await;
                if first_error.is_none() {
                    first_error = outcome.error.map(|error| {
                        format!("Rollback failed for tenant {}: {}", outcome.tenant_id, error)
                    });
                }
            }

            let recorded = match first_error {
                Some(message) => {
                    log::error!("Rollback of job {} finished with failures", job_id_owned);
                    runner.state_manager.set_job_error(&job_id_owned, &message).await
                }
                None => {
                    runner
                        .state_manager
                        .update_job_status(&job_id_owned, MigrationStatus::RolledBack)
                        .await
                }
            };
            if let Err(e) = recorded {
                log::error!("Could not record rollback result for job {}: {:?}", job_id_owned, e);
            }
        });

        Ok(RollbackResponse {
            job_id: job_id.to_string(),
            tenant_count,
            message: format!("Rollback started for {} tenant(s)", tenant_count),
        })
    }
}

/// Compara versiones tipo "001", "1.2" o "2_1" por sus partes numéricas.
pub fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    fn parts(v: &str) -> Vec<u64> {
        v.split(|c: char| !c.is_ascii_digit())
            .filter(|p| !p.is_empty())
            .map(|p| p.parse::<u64>().unwrap_or(u64::MAX))
            .collect()
    }
    parts(a).cmp(&parts(b)).then_with(|| a.cmp(b))
}
