use std::str::FromStr;
use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::config::app_config::AppConfig;
use crate::logger::init_logger;
use crate::services::callback_service::CallbackRegistry;
use crate::services::database_service::DatabaseConnectionManager;
use crate::services::job_runner_service::JobRunner;
use crate::services::progress_service::ProgressHub;
use crate::services::state_service::StateManager;
use crate::services::validator_service::MigrationValidator;
use crate::services::worker_service::MigrationWorker;

mod app;
mod config;
mod errors;
mod handlers;
mod logger;
mod models;
mod services;

#[cfg(test)]
mod tests;

/// Simply Migrate: migraciones SQL para muchos tenants.
#[derive(Debug, Parser)]
#[clap(name = "simply-migrate", version)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Levanta la API HTTP
    Api {
        #[clap(long, env = "SIMPLY_MIGRATE_HOST")]
        host: Option<String>,
        #[clap(short, long, env = "SIMPLY_MIGRATE_PORT")]
        port: Option<u16>,
    },
    /// Valida un directorio de migraciones sin ejecutar nada
    Validate {
        /// Directorio con los scripts V/R/S
        migrations_dir: String,
    },
    /// Borra del state store los jobs expirados
    Purge,
}

async fn setup_database(config: &AppConfig) -> Result<Pool<Sqlite>> {
    if let Some(parent) = config.state_db.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("No se pudo crear directorio {:?}", parent))?;
        }
    }

    let db_url = config.state_db_url();
    log::info!("Conectando a SQLite en {}", db_url);

    let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);
    let db_pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .context("No se pudo conectar a la base de datos SQLite")?;

    Ok(db_pool)
}

fn load_callbacks(config: &AppConfig) -> Result<CallbackRegistry> {
    let mut registry = CallbackRegistry::new();
    match &config.callback_file {
        Some(path) => {
            registry.load_from_file(path)?;
        }
        None => log::info!(
            "SIMPLY_MIGRATE_CALLBACK_FILE not supplied, running without callbacks"
        ),
    }
    Ok(registry)
}

async fn run_api(config: AppConfig) -> Result<()> {
    let db_pool = setup_database(&config).await?;

    let state_manager = StateManager::with_ttl(db_pool.clone(), config.job_ttl_secs);
    state_manager.run_migrations().await?;
    state_manager.ping().await?;
    log::info!("State store connection established");

    // las tareas de tenants no sobreviven a un reinicio
    let interrupted = state_manager
        .fail_interrupted_jobs("Job interrupted by service restart")
        .await?;
    if interrupted > 0 {
        log::warn!("Marked {} interrupted job(s) as failed", interrupted);
    }

    let callbacks = Arc::new(load_callbacks(&config)?);
    let progress_hub = ProgressHub::new();

    let worker = MigrationWorker::new(
        state_manager.clone(),
        callbacks.clone(),
        Arc::new(DatabaseConnectionManager::new()),
        progress_hub.clone(),
        config.tenant_timeout,
    );
    let runner = JobRunner::new(
        state_manager.clone(),
        worker,
        callbacks,
        progress_hub,
        config.max_parallel,
        config.monitor_interval,
    );

    log::info!("Migration API starting up on {}:{}", config.host, config.port);
    HttpServer::new(move || {
        App::new()
            .wrap(app::cors_headers())
            .app_data(web::Data::new(state_manager.clone()))
            .app_data(web::Data::new(runner.clone()))
            .configure(app::init_app)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    log::info!("Migration API shutting down...");
    db_pool.close().await;
    Ok(())
}

fn run_validate(migrations_dir: &str) -> Result<()> {
    println!("📂 Validating migrations directory: {}", migrations_dir);

    let mut validator = MigrationValidator::new(migrations_dir);
    if !validator.validate_directory_structure() {
        println!("{}", validator.get_report());
        bail!("Invalid migrations directory");
    }

    let scripts = validator.load_scripts();
    println!("{}", validator.get_report());

    if !validator.errors.is_empty() {
        bail!("Validation failed. Please fix errors before proceeding.");
    }

    println!("\n📋 Loaded {} script(s):", scripts.len());
    for script in &scripts {
        println!(
            "  • {} [{}] - {}",
            script.filename, script.script_type, script.description
        );
    }
    Ok(())
}

async fn run_purge(config: AppConfig) -> Result<()> {
    let db_pool = setup_database(&config).await?;
    let state_manager = StateManager::with_ttl(db_pool.clone(), config.job_ttl_secs);
    state_manager.run_migrations().await?;

    let removed = state_manager.purge_expired().await?;
    log::info!("Purged {} expired job(s)", removed);
    db_pool.close().await;
    Ok(())
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv().ok(); // Cargar .env al inicio
    init_logger();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;

    match cli.command {
        Command::Api { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            run_api(config).await
        }
        Command::Validate { migrations_dir } => run_validate(&migrations_dir),
        Command::Purge => run_purge(config).await,
    }
}
