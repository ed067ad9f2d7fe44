//! logger.rs
//! Logger del servicio con env_logger (stderr, sin buffer).

/// Filtro por defecto: info para el servicio, sqlx sólo avisos (loguea cada query en info)
const DEFAULT_FILTER: &str = "info,sqlx=warn";

pub fn init_logger() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());

    // try_init: los tests pueden llamarlo más de una vez
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp_secs()
        .format_module_path(false)
        .format_target(true)
        .try_init();
}
