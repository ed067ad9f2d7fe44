//! tests/mod.rs
//! Pruebas unitarias y de integración del servicio.

mod support;
mod validator_tests;
mod worker_tests;
