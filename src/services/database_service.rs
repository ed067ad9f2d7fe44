//! services/database_service.rs
//! Ejecución de scripts contra la base de datos de cada tenant.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Connection, Executor, PgConnection};

use crate::models::migration_model::StartMigrationTenantRequest;

pub const DEFAULT_TENANT_HOST: &str = "localhost";
pub const DEFAULT_TENANT_PORT: u16 = 5432;

/// Ejecuta el contenido de un script en la base de un tenant.
///
/// El worker sólo depende de este trait, así los tests usan un executor en memoria.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    async fn execute_script(
        &self,
        tenant: &StartMigrationTenantRequest,
        script_content: &str,
    ) -> Result<()>;
}

/// Executor real sobre PostgreSQL; una conexión por script.
#[derive(Clone, Debug, Default)]
pub struct DatabaseConnectionManager;

impl DatabaseConnectionManager {
    pub fn new() -> Self {
        DatabaseConnectionManager
    }

    pub fn get_connection_string(
        user: &str,
        password: &str,
        database_name: &str,
        host: Option<&str>,
    ) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            user,
            password,
            host.filter(|h| !h.is_empty()).unwrap_or(DEFAULT_TENANT_HOST),
            DEFAULT_TENANT_PORT,
            database_name
        )
    }

    /// Usa el connection string explícito si viene, si no lo arma.
    pub fn connection_string_for(tenant: &StartMigrationTenantRequest) -> String {
        match tenant.connection_string.as_deref() {
            Some(cs) if !cs.trim().is_empty() => cs.to_string(),
            _ => Self::get_connection_string(
                &tenant.user,
                &tenant.password,
                &tenant.database_name,
                tenant.host.as_deref(),
            ),
        }
    }
}

#[async_trait]
impl ScriptExecutor for DatabaseConnectionManager {
    async fn execute_script(
        &self,
        tenant: &StartMigrationTenantRequest,
        script_content: &str,
    ) -> Result<()> {
        let url = Self::connection_string_for(tenant);
        let mut conn = PgConnection::connect(&url)
            .await
            .with_context(|| format!("No se pudo conectar a la base del tenant {}", tenant))?;

        // Todo el script va en una sola transacción; si falla se hace rollback al soltar `tx`
        let mut tx = conn.begin().await.context("Fallo al abrir transacción")?;
        (&mut *tx)
            .execute(script_content)
            .await
            .with_context(|| format!("Script failed for tenant {}", tenant.tenant_id))?;
        tx.commit().await.context("Fallo al hacer commit")?;

        if let Err(e) = conn.close().await {
            log::warn!("Error cerrando conexión de {}: {}", tenant.tenant_id, e);
        }
        Ok(())
    }
}
