//! models/job_model.rs
//! Estado persistido de los jobs de migración.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Pending,
    Running,
    Success,
    Failed,
    RolledBack,
    /// Algunos tenants terminaron bien y otros no
    Partial,
}

impl MigrationStatus {
    /// Estados en los que el job ya no avanza
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MigrationStatus::Success
                | MigrationStatus::Failed
                | MigrationStatus::Partial
                | MigrationStatus::RolledBack
        )
    }

    /// Estados que marcan `completed_at` al actualizar el job
    pub fn sets_completion(&self) -> bool {
        matches!(
            self,
            MigrationStatus::Success | MigrationStatus::Failed | MigrationStatus::Partial
        )
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MigrationStatus::Pending => "pending",
            MigrationStatus::Running => "running",
            MigrationStatus::Success => "success",
            MigrationStatus::Failed => "failed",
            MigrationStatus::RolledBack => "rolled_back",
            MigrationStatus::Partial => "partial",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for MigrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MigrationStatus::Pending),
            "running" => Ok(MigrationStatus::Running),
            "success" => Ok(MigrationStatus::Success),
            "failed" => Ok(MigrationStatus::Failed),
            "rolled_back" => Ok(MigrationStatus::RolledBack),
            "partial" => Ok(MigrationStatus::Partial),
            other => Err(format!("Estado desconocido: {}", other)),
        }
    }
}

/// Resultado de un solo tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantMigrationResult {
    pub tenant_id: String,
    pub status: MigrationStatus,
    #[serde(default)]
    pub scripts_applied: Vec<String>,
    #[serde(default)]
    pub scripts_skipped: Vec<String>,
    #[serde(default)]
    pub callback_metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
}

impl TenantMigrationResult {
    pub fn running(tenant_id: impl Into<String>, started_at: String) -> Self {
        TenantMigrationResult {
            tenant_id: tenant_id.into(),
            status: MigrationStatus::Running,
            scripts_applied: vec![],
            scripts_skipped: vec![],
            callback_metadata: HashMap::new(),
            error_message: None,
            started_at: Some(started_at),
            completed_at: None,
            duration_seconds: None,
        }
    }
}

/// Estado general de un job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationJobState {
    pub job_id: String,
    #[serde(default)]
    pub job_name: Option<String>,
    pub status: MigrationStatus,
    pub tenants: Vec<String>,
    pub total_tenants: usize,
    pub completed_tenants: usize,
    pub successful_tenants: usize,
    pub failed_tenants: usize,
    #[serde(default)]
    pub tenant_results: HashMap<String, TenantMigrationResult>,
    pub started_at: String,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl MigrationJobState {
    /// Registra el resultado de un tenant y recalcula contadores/estado.
    pub fn apply_tenant_result(&mut self, result: TenantMigrationResult, now: String) {
        match result.status {
            MigrationStatus::Success => self.successful_tenants += 1,
            MigrationStatus::Failed => self.failed_tenants += 1,
            _ => {}
        }
        self.tenant_results.insert(result.tenant_id.clone(), result);
        self.completed_tenants += 1;

        if self.completed_tenants == self.total_tenants {
            self.status = if self.failed_tenants == 0 {
                MigrationStatus::Success
            } else if self.successful_tenants == 0 {
                MigrationStatus::Failed
            } else {
                MigrationStatus::Partial
            };
            self.completed_at = Some(now);
        } else if self.status == MigrationStatus::Pending {
            self.status = MigrationStatus::Running;
        }
    }
}
