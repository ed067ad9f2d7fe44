//! services/state_service.rs
//! Persistencia del estado de los jobs en SQLite.
//!
//! Cada job se guarda como un documento JSON bajo la clave `migration:job:<id>`
//! con una expiración que se renueva en cada escritura.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};
use tokio::sync::Mutex;

use crate::config::app_config::DEFAULT_JOB_TTL_SECS;
use crate::models::job_model::{MigrationJobState, MigrationStatus, TenantMigrationResult};
use crate::models::migration_model::StartMigrationTenantRequest;

pub const JOB_PREFIX: &str = "migration:job:";

#[derive(Clone, Debug)]
pub struct StateManager {
    db_pool: Pool<Sqlite>,
    ttl_secs: i64,
    /// Serializa los read-modify-write (varios tenants terminan a la vez)
    write_lock: Arc<Mutex<()>>,
}

impl StateManager {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        Self::with_ttl(db_pool, DEFAULT_JOB_TTL_SECS)
    }

    pub fn with_ttl(db_pool: Pool<Sqlite>, ttl_secs: i64) -> Self {
        StateManager {
            db_pool,
            ttl_secs,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Corre migraciones con sqlx
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db_pool)
            .await
            .context("Failed to run state store migrations")?;
        Ok(())
    }

    pub fn job_key(job_id: &str) -> String {
        format!("{}{}", JOB_PREFIX, job_id)
    }

    /// Comprueba que el store responda (health check)
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.db_pool)
            .await
            .context("State store unreachable")?;
        Ok(())
    }

    /// Crea el job en estado "pending"
    pub async fn create_job(
        &self,
        job_id: &str,
        job_name: Option<String>,
        tenants: &[StartMigrationTenantRequest],
    ) -> Result<MigrationJobState> {
        let state = MigrationJobState {
            job_id: job_id.to_string(),
            job_name,
            status: MigrationStatus::Pending,
            tenants: tenants.iter().map(|t| t.display_name().to_string()).collect(),
            total_tenants: tenants.len(),
            completed_tenants: 0,
            successful_tenants: 0,
            failed_tenants: 0,
            tenant_results: Default::default(),
            started_at: Utc::now().to_rfc3339(),
            completed_at: None,
            error_message: None,
        };

        let _guard = self.write_lock.lock().await;
        self.save_job(&state).await?;
        Ok(state)
    }

    /// `true` si ya hay un job vivo con ese id
    pub async fn job_exists(&self, job_id: &str) -> Result<bool> {
        Ok(self.get_job(job_id).await?.is_some())
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<MigrationJobState>> {
        let row = sqlx::query(
            r#"
            SELECT state FROM migration_jobs
            WHERE job_key = ?1 AND expires_at > ?2
            "#,
        )
        .bind(Self::job_key(job_id))
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.db_pool)
        .await
        .context("Fallo al leer job")?;

        match row {
            Some(row) => {
                let data: String = row.try_get("state")?;
                Ok(Some(Self::parse_job(&data)?))
            }
            None => Ok(None),
        }
    }

    /// Actualiza el estado general del job
    pub async fn update_job_status(&self, job_id: &str, status: MigrationStatus) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let Some(mut job) = self.get_job(job_id).await? else {
            log::warn!("update_job_status: job {} not found", job_id);
            return Ok(());
        };

        job.status = status;
        if status.sets_completion() {
            job.completed_at = Some(Utc::now().to_rfc3339());
        }
        self.save_job(&job).await
    }

    /// Registra el error del job sin tocar su estado; conserva el primero.
    pub async fn set_job_error(&self, job_id: &str, message: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let Some(mut job) = self.get_job(job_id).await? else {
            log::warn!("set_job_error: job {} not found", job_id);
            return Ok(());
        };

        if job.error_message.is_none() {
            job.error_message = Some(message.to_string());
            self.save_job(&job).await?;
        }
        Ok(())
    }

    /// Marca como fallidos los jobs que quedaron pendientes o corriendo
    /// (sus tareas murieron con el proceso anterior). Devuelve cuántos.
    pub async fn fail_interrupted_jobs(&self, message: &str) -> Result<u64> {
        let _guard = self.write_lock.lock().await;

        let rows = sqlx::query(
            r#"
            SELECT state FROM migration_jobs
            WHERE expires_at > ?1 AND status IN (?2, ?3)
            "#,
        )
        .bind(Utc::now().timestamp())
        .bind(MigrationStatus::Pending.to_string())
        .bind(MigrationStatus::Running.to_string())
        .fetch_all(&self.db_pool)
        .await
        .context("Fallo al buscar jobs interrumpidos")?;

        let mut failed = 0;
        for row in rows {
            let data: String = row.try_get("state")?;
            let mut job = match Self::parse_job(&data) {
                Ok(job) => job,
                Err(e) => {
                    log::error!("Skipping unreadable job record: {:?}", e);
                    continue;
                }
            };
            job.status = MigrationStatus::Failed;
            job.completed_at = Some(Utc::now().to_rfc3339());
            job.error_message.get_or_insert_with(|| message.to_string());
            self.save_job(&job).await?;
            failed += 1;
        }
        Ok(failed)
    }

    /// Guarda el resultado de un tenant y recalcula el estado del job
    pub async fn update_tenant_result(
        &self,
        job_id: &str,
        tenant_result: TenantMigrationResult,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let Some(mut job) = self.get_job(job_id).await? else {
            log::warn!(
                "update_tenant_result: job {} not found (tenant {})",
                job_id,
                tenant_result.tenant_id
            );
            return Ok(());
        };

        job.apply_tenant_result(tenant_result, Utc::now().to_rfc3339());
        self.save_job(&job).await
    }

    /// Jobs más recientes primero
    pub async fn get_all_jobs(&self, limit: u32) -> Result<Vec<MigrationJobState>> {
        let rows = sqlx::query(
            r#"
            SELECT state FROM migration_jobs
            WHERE expires_at > ?1
            ORDER BY started_at DESC
            LIMIT ?2
            "#,
        )
        .bind(Utc::now().timestamp())
        .bind(limit as i64)
        .fetch_all(&self.db_pool)
        .await
        .context("Fallo al listar jobs")?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            let data: String = row.try_get("state")?;
            match Self::parse_job(&data) {
                Ok(job) => jobs.push(job),
                Err(e) => log::error!("Skipping unreadable job record: {:?}", e),
            }
        }
        Ok(jobs)
    }

    /// Borra el registro del job; no afecta la ejecución
    pub async fn delete_job(&self, job_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query("DELETE FROM migration_jobs WHERE job_key = ?1 AND expires_at > ?2")
            .bind(Self::job_key(job_id))
            .bind(Utc::now().timestamp())
            .execute(&self.db_pool)
            .await
            .context("Fallo al borrar job")?;

        Ok(result.rows_affected() > 0)
    }

    /// Elimina los registros expirados; devuelve cuántos se borraron
    pub async fn purge_expired(&self) -> Result<u64> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query("DELETE FROM migration_jobs WHERE expires_at <= ?1")
            .bind(Utc::now().timestamp())
            .execute(&self.db_pool)
            .await
            .context("Fallo al purgar jobs expirados")?;

        Ok(result.rows_affected())
    }

    fn parse_job(data: &str) -> Result<MigrationJobState> {
        serde_json::from_str(data).context("Job record is not valid JSON")
    }

    async fn save_job(&self, job: &MigrationJobState) -> Result<()> {
        let data = serde_json::to_string(job).context("Fallo al serializar job")?;
        let expires_at = Utc::now().timestamp() + self.ttl_secs;

        sqlx::query(
            r#"
            INSERT INTO migration_jobs (job_key, job_id, status, started_at, expires_at, state)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(job_key) DO UPDATE SET
                status = excluded.status,
                expires_at = excluded.expires_at,
                state = excluded.state
            "#,
        )
        .bind(Self::job_key(&job.job_id))
        .bind(&job.job_id)
        .bind(job.status.to_string())
        .bind(&job.started_at)
        .bind(expires_at)
        .bind(data)
        .execute(&self.db_pool)
        .await
        .with_context(|| format!("Fallo al guardar job {}", job.job_id))?;

        Ok(())
    }
}
