//! tests/support.rs
//! Helpers compartidos: state store en memoria, executor falso y directorios de scripts.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

use crate::models::job_model::MigrationStatus;
use crate::models::migration_model::{JobStatusResponse, StartMigrationTenantRequest};
use crate::services::callback_service::CallbackRegistry;
use crate::services::database_service::ScriptExecutor;
use crate::services::job_runner_service::JobRunner;
use crate::services::progress_service::ProgressHub;
use crate::services::state_service::StateManager;
use crate::services::worker_service::MigrationWorker;

/// State store sobre SQLite en memoria (una sola conexión para no perder la base)
pub async fn memory_state() -> StateManager {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");
    let state = StateManager::new(pool);
    state.run_migrations().await.expect("Failed to run migrations");
    state
}

/// Executor que registra lo que "ejecuta" en vez de ir a PostgreSQL
#[derive(Default)]
pub struct RecordingExecutor {
    executed: Mutex<Vec<(String, String)>>,
    failing_tenants: HashSet<String>,
    delay: Option<Duration>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(tenants: &[&str]) -> Self {
        RecordingExecutor {
            failing_tenants: tenants.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        RecordingExecutor {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn executed(&self) -> Vec<(String, String)> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScriptExecutor for RecordingExecutor {
    async fn execute_script(
        &self,
        tenant: &StartMigrationTenantRequest,
        script_content: &str,
    ) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_tenants.contains(&tenant.tenant_id) {
            return Err(anyhow!("relation \"users\" already exists"));
        }
        self.executed
            .lock()
            .unwrap()
            .push((tenant.tenant_id.clone(), script_content.to_string()));
        Ok(())
    }
}

pub fn tenant(id: &str) -> StartMigrationTenantRequest {
    StartMigrationTenantRequest {
        tenant_id: id.to_string(),
        tenant_name: None,
        user: "app".to_string(),
        password: "secret".to_string(),
        database_name: format!("{}_db", id),
        host: None,
        connection_string: None,
    }
}

pub fn write_script(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).expect("Failed to write script");
}

/// Directorio con dos migraciones y un rollback válidos
pub fn migrations_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    write_script(
        dir.path(),
        "V001__create_users.sql",
        "CREATE TABLE users (id SERIAL PRIMARY KEY);",
    );
    write_script(
        dir.path(),
        "V002__add_email.sql",
        "ALTER TABLE users ADD COLUMN email TEXT;",
    );
    write_script(
        dir.path(),
        "R001__drop_users.sql",
        "BEGIN; DROP TABLE users; COMMIT;",
    );
    dir
}

pub fn worker(
    state: &StateManager,
    callbacks: CallbackRegistry,
    executor: Arc<dyn ScriptExecutor>,
    hub: &ProgressHub,
    tenant_timeout: Duration,
) -> MigrationWorker {
    MigrationWorker::new(
        state.clone(),
        Arc::new(callbacks),
        executor,
        hub.clone(),
        tenant_timeout,
    )
}

pub fn runner_with(
    state: &StateManager,
    callbacks: CallbackRegistry,
    executor: Arc<dyn ScriptExecutor>,
) -> JobRunner {
    let hub = ProgressHub::new();
    let callbacks_for_worker = callbacks.clone();
    let worker = worker(
        state,
        callbacks_for_worker,
        executor,
        &hub,
        Duration::from_secs(30),
    );
    JobRunner::new(
        state.clone(),
        worker,
        Arc::new(callbacks),
        hub,
        4,
        Duration::from_millis(10),
    )
}

/// Espera hasta que el job llegue a un estado terminal
pub async fn wait_for_job(runner: &JobRunner, job_id: &str) -> JobStatusResponse {
    for _ in 0..500 {
        if let Some(status) = runner.get_job_status(job_id).await.unwrap() {
            let terminal = status
                .status
                .parse::<MigrationStatus>()
                .map(|s| s.is_terminal())
                .unwrap_or(false);
            if terminal {
                return status;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Job {} did not finish in time", job_id);
}
