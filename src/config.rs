//! Configuración central de la aplicación.
//!
//! Se lee una sola vez del entorno (más un `.env` opcional vía `dotenvy`) y se
//! entrega como `AppConfig` inmutable. Los errores son `ConfigError`, nunca
//! pánicos: el binario los reporta al arrancar.
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;
use wb_core::RetryPolicy;
use wb_domain::ArtifactSize;
use wb_pipeline::StagePolicy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{var}: invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Endpoints de las tres etapas remotas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    pub lexicon: Url,
    pub calculation: Url,
    pub interpretation: Url,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    pub stage: StagePolicy,
    pub retention: Duration,
    pub kb_path: Option<PathBuf>,
    pub artifact_size: ArtifactSize,
    /// None si no hay ningún endpoint configurado (modo local).
    pub endpoints: Option<ServiceEndpoints>,
}

impl AppConfig {
    /// Carga `.env` si existe y lee el entorno del proceso.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Construye la configuración a partir de una función de búsqueda.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
        where F: Fn(&str) -> Option<String>
    {
        let port = parse_or(&lookup, "PORT", 8000u16)?;
        let timeout_ms = parse_or(&lookup, "WORKBENCH_STAGE_TIMEOUT_MS", 5000u64)?;
        let max_attempts = parse_or(&lookup, "WORKBENCH_MAX_ATTEMPTS", 3u32)?;
        let base_ms = parse_or(&lookup, "WORKBENCH_RETRY_BASE_MS", 200u64)?;
        let max_ms = parse_or(&lookup, "WORKBENCH_RETRY_MAX_MS", 5000u64)?;
        let retention_secs = parse_or(&lookup, "WORKBENCH_RUN_RETENTION_SECS", 3600u64)?;
        if timeout_ms == 0 {
            return Err(invalid("WORKBENCH_STAGE_TIMEOUT_MS", "0", "must be positive"));
        }
        if max_attempts == 0 {
            return Err(invalid("WORKBENCH_MAX_ATTEMPTS", "0", "must be at least 1"));
        }

        let defaults = ArtifactSize::default();
        let width = parse_or(&lookup, "ARTIFACT_WIDTH", defaults.width)?;
        let height = parse_or(&lookup, "ARTIFACT_HEIGHT", defaults.height)?;
        let artifact_size = ArtifactSize::new(width, height)
            .map_err(|e| invalid("ARTIFACT_WIDTH", &format!("{width}x{height}"), &e.to_string()))?;

        let stage = StagePolicy { timeout: Duration::from_millis(timeout_ms),
                                  retry: RetryPolicy::new(max_attempts,
                                                          Duration::from_millis(base_ms),
                                                          Duration::from_millis(max_ms)) };
        Ok(Self { port,
                  stage,
                  retention: Duration::from_secs(retention_secs),
                  kb_path: lookup("WORKBENCH_KB_PATH").filter(|p| !p.trim().is_empty()).map(PathBuf::from),
                  artifact_size,
                  endpoints: endpoints(&lookup)? })
    }

    /// Endpoints obligatorios para el orquestador remoto.
    pub fn require_endpoints(&self) -> Result<&ServiceEndpoints, ConfigError> {
        self.endpoints.as_ref().ok_or(ConfigError::Missing("LEXICON_SERVICE_URL"))
    }
}

const ENDPOINT_VARS: [&str; 3] = ["LEXICON_SERVICE_URL", "CALCULATION_SERVICE_URL", "INTERPRETATION_SERVICE_URL"];

fn endpoints<F>(lookup: &F) -> Result<Option<ServiceEndpoints>, ConfigError>
    where F: Fn(&str) -> Option<String>
{
    let raw: Vec<Option<String>> = ENDPOINT_VARS.iter().map(|var| lookup(*var)).collect();
    if raw.iter().all(Option::is_none) {
        return Ok(None);
    }
    let mut urls = Vec::with_capacity(3);
    for (var, value) in ENDPOINT_VARS.into_iter().zip(raw) {
        let value = value.ok_or(ConfigError::Missing(var))?;
        urls.push(service_url(var, &value)?);
    }
    let mut urls = urls.into_iter();
    match (urls.next(), urls.next(), urls.next()) {
        (Some(lexicon), Some(calculation), Some(interpretation)) => {
            Ok(Some(ServiceEndpoints { lexicon,
                                       calculation,
                                       interpretation }))
        }
        _ => Err(ConfigError::Missing("LEXICON_SERVICE_URL")),
    }
}

fn service_url(var: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| invalid(var, value, &e.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        _ => Err(invalid(var, value, "expected an absolute http(s) URL")),
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
    where F: Fn(&str) -> Option<String>,
          T: FromStr,
          T::Err: std::fmt::Display
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| invalid(var, &raw, &e.to_string())),
    }
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { var,
                           value: value.to_string(),
                           reason: reason.to_string() }
}
