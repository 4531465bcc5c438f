//! Constantes del pipeline.
//!
//! Ambos valores participan en el cálculo de fingerprints: cambiarlos invalida
//! de forma determinista todas las claves de caché existentes.

/// Versión lógica del orquestador. Entra en cada `CacheKey`.
pub const PIPELINE_VERSION: &str = "P1.0";

/// Versión del esquema de los payloads intercambiados entre etapas (cuerpos
/// HTTP y `Envelope`). Incrementar sólo ante cambios incompatibles.
pub const WIRE_SCHEMA_VERSION: u32 = 1;
