//! handlers/mod.rs
//! Módulo que agrupa los handlers HTTP (migraciones, health).

pub mod health_handler;
pub mod migration_handler;
