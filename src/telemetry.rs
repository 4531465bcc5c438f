//! Instalación del subscriber de `tracing` para el binario.
use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str =
    "workbench=info,workbench_rust=info,wb_pipeline=info,wb_services=info,wb_core=info,tower_http=info";

/// Instala un subscriber fmt filtrado por `RUST_LOG` (o `DEFAULT_FILTER`).
/// Llamadas repetidas no fallan: sólo la primera instala el subscriber.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt().with_env_filter(filter)
                                     .with_target(true)
                                     .with_writer(std::io::stderr)
                                     .try_init();
}
