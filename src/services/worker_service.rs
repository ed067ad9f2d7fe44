//! services/worker_service.rs
//! Aplicación de scripts a un tenant, finalización de jobs y rollback.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::callback_model::{CallbackContext, CallbackHook};
use crate::models::job_model::{MigrationStatus, TenantMigrationResult};
use crate::models::migration_model::{ScriptPayload, StartMigrationTenantRequest};
use crate::services::callback_service::CallbackRegistry;
use crate::services::database_service::ScriptExecutor;
use crate::services::progress_service::{ProgressEvent, ProgressHub};
use crate::services::state_service::StateManager;

pub const TIME_LIMIT_MESSAGE: &str = "Migration exceeded time limit";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizeResult {
    pub job_id: String,
    pub status: MigrationStatus,
    pub summary: JobSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackOutcome {
    pub success: bool,
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct MigrationWorker {
    state_manager: StateManager,
    callbacks: Arc<CallbackRegistry>,
    executor: Arc<dyn ScriptExecutor>,
    progress_hub: ProgressHub,
    tenant_timeout: Duration,
}

impl MigrationWorker {
    pub fn new(
        state_manager: StateManager,
        callbacks: Arc<CallbackRegistry>,
        executor: Arc<dyn ScriptExecutor>,
        progress_hub: ProgressHub,
        tenant_timeout: Duration,
    ) -> Self {
        MigrationWorker {
            state_manager,
            callbacks,
            executor,
            progress_hub,
            tenant_timeout,
        }
    }

    /// Aplica los scripts a un tenant. El resultado siempre queda guardado en el state store.
    pub async fn apply_migration_to_tenant(
        &self,
        job_id: &str,
        tenant: &StartMigrationTenantRequest,
        scripts: &[ScriptPayload],
        dry_run: bool,
    ) -> TenantMigrationResult {
        let started = Instant::now();
        let mut result = TenantMigrationResult::running(&tenant.tenant_id, Utc::now().to_rfc3339());

        log::info!(
            "Task received for tenant {} (job={}, scripts={}, dry_run={})",
            tenant,
            job_id,
            scripts.len(),
            dry_run
        );

        let outcome = tokio::time::timeout(
            self.tenant_timeout,
            self.run_tenant(job_id, tenant, scripts, dry_run, &mut result),
        )
        .await;

        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                log::error!("Migration failed for {}: {:?}", tenant.tenant_id, e);
                Some(format!("{:#}", e))
            }
            Err(_) => {
                log::error!("Migration timeout for {}", tenant.tenant_id);
                Some(TIME_LIMIT_MESSAGE.to_string())
            }
        };

        match error {
            None => {
                result.status = MigrationStatus::Success;
                log::info!("Successfully completed migration for {}", tenant.tenant_id);
            }
            Some(message) => {
                result.status = MigrationStatus::Failed;
                self.run_error_callbacks(job_id, &tenant.tenant_id, &message)
                    .await;
                result.error_message = Some(message);
            }
        }

        result.completed_at = Some(Utc::now().to_rfc3339());
        result.duration_seconds = Some(started.elapsed().as_secs_f64());

        if let Err(e) = self
            .state_manager
            .update_tenant_result(job_id, result.clone())
            .await
        {
            log::error!(
                "Could not store result of tenant {} for job {}: {:?}",
                tenant.tenant_id,
                job_id,
                e
            );
        }

        result
    }

    async fn run_tenant(
        &self,
        job_id: &str,
        tenant: &StartMigrationTenantRequest,
        scripts: &[ScriptPayload],
        dry_run: bool,
        result: &mut TenantMigrationResult,
    ) -> Result<()> {
        let mut context = CallbackContext::for_tenant(job_id, &tenant.tenant_id, scripts.to_vec());

        let callback_result = self
            .callbacks
            .run_callbacks(CallbackHook::BeforeTenant, &mut context)
            .await;
        if !callback_result.success {
            return Err(anyhow!(
                "Before tenant callback failed: {}",
                callback_result.message_or_empty()
            ));
        }
        result.callback_metadata.extend(context.metadata.clone());

        if dry_run {
            log::info!(
                "DRY RUN: Would apply {} scripts to {}",
                scripts.len(),
                tenant.tenant_id
            );
            result.scripts_applied = scripts.iter().map(|s| s.filename.clone()).collect();
            return Ok(());
        }

        for (idx, script) in scripts.iter().enumerate() {
            log::info!("Applying {} to {}", script.filename, tenant.tenant_id);

            let mut script_context = CallbackContext {
                script: Some(script.clone()),
                current_script_index: idx as i64,
                metadata: context.metadata.clone(),
                ..context.clone()
            };

            let callback_result = self
                .callbacks
                .run_callbacks(CallbackHook::BeforeScript, &mut script_context)
                .await;
            if !callback_result.success {
                return Err(anyhow!(
                    "Before script callback failed: {}",
                    callback_result.message_or_empty()
                ));
            }
            if callback_result.skip_script {
                log::info!(
                    "Skipping {}: {}",
                    script.filename,
                    callback_result.message_or_empty()
                );
                result.scripts_skipped.push(script.filename.clone());
                continue;
            }

            self.executor.execute_script(tenant, &script.content).await?;
            result.scripts_applied.push(script.filename.clone());

            let callback_result = self
                .callbacks
                .run_callbacks(CallbackHook::AfterScript, &mut script_context)
                .await;
            if !callback_result.success {
                return Err(anyhow!(
                    "After script callback failed: {}",
                    callback_result.message_or_empty()
                ));
            }
            result.callback_metadata.extend(script_context.metadata);

            self.progress_hub.broadcast_to_job(
                job_id,
                ProgressEvent::TenantProgress {
                    tenant_id: tenant.tenant_id.clone(),
                    scripts_completed: result.scripts_applied.len(),
                    total_scripts: scripts.len(),
                },
            );
        }

        let callback_result = self
            .callbacks
            .run_callbacks(CallbackHook::AfterTenant, &mut context)
            .await;
        if !callback_result.success {
            log::warn!(
                "After tenant callback failed: {}",
                callback_result.message_or_empty()
            );
        }

        Ok(())
    }

    async fn run_error_callbacks(&self, job_id: &str, tenant_id: &str, error_message: &str) {
        let mut context = CallbackContext::for_tenant(job_id, tenant_id, vec![])
            .with_metadata("error", json!(error_message));

        let callback_result = self
            .callbacks
            .run_callbacks(CallbackHook::OnError, &mut context)
            .await;
        if !callback_result.success {
            log::error!(
                "Error callback failed for tenant {}: {}",
                tenant_id,
                callback_result.message_or_empty()
            );
        }
    }

    /// Corre cuando todos los tenants del job terminaron.
    pub async fn finalize_migration_job(&self, job_id: &str) -> Result<Option<FinalizeResult>> {
        log::info!("Finalizing migration job {}", job_id);

        let Some(job) = self.state_manager.get_job(job_id).await? else {
            log::error!("Job {} not found", job_id);
            return Ok(None);
        };

        let mut context = CallbackContext::for_job(job_id, vec![])
            .with_metadata("total_tenants", json!(job.total_tenants))
            .with_metadata("successful_tenants", json!(job.successful_tenants))
            .with_metadata("failed_tenants", json!(job.failed_tenants));

        let callback_result = self
            .callbacks
            .run_callbacks(CallbackHook::AfterJob, &mut context)
            .await;
        if !callback_result.success {
            log::error!(
                "After job callback failed: {}",
                callback_result.message_or_empty()
            );
        }

        log::info!(
            "Migration job {} completed: total={} successful={} failed={}",
            job_id,
            job.total_tenants,
            job.successful_tenants,
            job.failed_tenants
        );

        Ok(Some(FinalizeResult {
            job_id: job_id.to_string(),
            status: job.status,
            summary: JobSummary {
                total: job.total_tenants,
                successful: job.successful_tenants,
                failed: job.failed_tenants,
            },
        }))
    }

    /// Ejecuta los scripts de rollback en orden inverso.
    pub async fn rollback_migration(
        &self,
        job_id: &str,
        tenant: &StartMigrationTenantRequest,
        rollback_scripts: &[ScriptPayload],
    ) -> RollbackOutcome {
        log::warn!(
            "Rolling back migration for tenant {} (job: {})",
            tenant.tenant_id,
            job_id
        );

        for script in rollback_scripts.iter().rev() {
            log::info!("Rollback {} on {}", script.filename, tenant.tenant_id);
            if let Err(e) = self.executor.execute_script(tenant, &script.content).await {
                log::error!("Rollback failed for {}: {:?}", tenant.tenant_id, e);
                return RollbackOutcome {
                    success: false,
                    tenant_id: tenant.tenant_id.clone(),
                    error: Some(format!("{:#}", e)),
                };
            }
        }

        log::info!("Rollback successful for {}", tenant.tenant_id);
        RollbackOutcome {
            success: true,
            tenant_id: tenant.tenant_id.clone(),
            error: None,
        }
    }
}
