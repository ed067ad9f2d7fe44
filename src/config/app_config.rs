//! config/app_config.rs
//! Configuración global del servicio, leída de variables de entorno (.env incluido).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_STATE_DB: &str = "./data/simply_migrate.db";
pub const DEFAULT_MAX_PARALLEL: usize = 8;
/// 1 hora por tenant
pub const DEFAULT_TENANT_TIMEOUT_SECS: u64 = 3600;
/// Los jobs se guardan 7 días
pub const DEFAULT_JOB_TTL_SECS: i64 = 86400 * 7;
pub const DEFAULT_MONITOR_INTERVAL_MS: u64 = 2000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub state_db: PathBuf,
    pub callback_file: Option<PathBuf>,
    pub max_parallel: usize,
    pub tenant_timeout: Duration,
    pub job_ttl_secs: i64,
    pub monitor_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            state_db: PathBuf::from(DEFAULT_STATE_DB),
            callback_file: None,
            max_parallel: DEFAULT_MAX_PARALLEL,
            tenant_timeout: Duration::from_secs(DEFAULT_TENANT_TIMEOUT_SECS),
            job_ttl_secs: DEFAULT_JOB_TTL_SECS,
            monitor_interval: Duration::from_millis(DEFAULT_MONITOR_INTERVAL_MS),
        }
    }
}

impl AppConfig {
    /// Lee la configuración del entorno; lo que no esté usa el default.
    pub fn from_env() -> Result<Self> {
        let defaults = AppConfig::default();

        let callback_file = env::var("SIMPLY_MIGRATE_CALLBACK_FILE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let max_parallel: usize = parse_var("SIMPLY_MIGRATE_MAX_PARALLEL", defaults.max_parallel)?;

        Ok(AppConfig {
            host: env::var("SIMPLY_MIGRATE_HOST").unwrap_or(defaults.host),
            port: parse_var("SIMPLY_MIGRATE_PORT", defaults.port)?,
            state_db: env::var("SIMPLY_MIGRATE_STATE_DB")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_db),
            callback_file,
            max_parallel: max_parallel.max(1),
            tenant_timeout: Duration::from_secs(parse_var(
                "SIMPLY_MIGRATE_TENANT_TIMEOUT_SECS",
                DEFAULT_TENANT_TIMEOUT_SECS,
            )?),
            job_ttl_secs: parse_var("SIMPLY_MIGRATE_JOB_TTL_SECS", defaults.job_ttl_secs)?,
            monitor_interval: Duration::from_millis(parse_var(
                "SIMPLY_MIGRATE_MONITOR_INTERVAL_MS",
                DEFAULT_MONITOR_INTERVAL_MS,
            )?),
        })
    }

    /// URL de SQLite para el state store
    pub fn state_db_url(&self) -> String {
        format!("sqlite:{}", self.state_db.to_string_lossy())
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Valor inválido en {}: {:?}", name, raw)),
        _ => Ok(default),
    }
}
