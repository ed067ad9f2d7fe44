//! services/mod.rs
//! Módulo que agrupa los distintos "servicios" o "capas de negocio" de la app.

pub mod callback_service;
pub mod database_service;
pub mod job_runner_service;
pub mod progress_service;
pub mod state_service;
pub mod validator_service;
pub mod worker_service;
