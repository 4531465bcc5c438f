//! Workbench: pipeline por etapas término -> entidad -> cálculo -> artefacto.
//!
//! Este crate es el borde de la aplicación:
//! - `config`: `AppConfig` desde el entorno.
//! - `telemetry`: subscriber de `tracing`.
//! - `bootstrap`: ensamblado de orquestador y routers.
//!
//! La lógica vive en `wb-core`, `wb-domain`, `wb-services` y `wb-pipeline`.

pub mod bootstrap;
pub mod config;
pub mod telemetry;

pub use bootstrap::{BootstrapError, Service};
pub use config::{AppConfig, ConfigError, ServiceEndpoints};
