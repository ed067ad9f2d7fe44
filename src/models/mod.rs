//! models/mod.rs
//! Módulo raíz para modelos/estructuras compartidas.

pub mod callback_model;
pub mod job_model;
pub mod migration_model;
