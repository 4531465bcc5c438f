//! Sobre versionado de los datos que cruzan una frontera de etapa.
//!
//! Un `Envelope` transporta un cuerpo JSON junto con:
//! - `kind`: qué tipo de payload contiene (entidad, resultado, artefacto).
//! - `schema_version`: versión del esquema del cuerpo; el consumidor la
//!   verifica antes de decodificar.
//! - `hash`: hash del JSON canónico del cuerpo. Sirve como identidad del
//!   output para fingerprints de etapas posteriores.
//!
//! Los tipos de dominio implementan `StagePayload` para construir y leer
//! sobres sin tocar JSON a mano.

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::errors::StageError;
use crate::hashing::hash_value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    ResolvedEntity,
    CalculationResult,
    RenderedArtifact,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PayloadKind::ResolvedEntity => "resolved_entity",
            PayloadKind::CalculationResult => "calculation_result",
            PayloadKind::RenderedArtifact => "rendered_artifact",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: PayloadKind,
    pub schema_version: u32,
    pub hash: String,
    pub body: Value,
}

impl Envelope {
    /// Recalcula el hash del cuerpo y lo compara con el declarado.
    pub fn verify_hash(&self) -> bool {
        hash_value(&self.body) == self.hash
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EnvelopeError {
    #[error("expected payload kind {expected}, found {found}")]
    KindMismatch { expected: PayloadKind, found: PayloadKind },
    #[error("expected schema version {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("payload hash does not match body")]
    HashMismatch,
    #[error("serialize: {0}")]
    Serialize(String),
    #[error("deserialize: {0}")]
    Deserialize(String),
    #[error("validation: {0}")]
    Validation(String),
}

impl From<EnvelopeError> for StageError {
    fn from(e: EnvelopeError) -> Self {
        match e {
            EnvelopeError::VersionMismatch { expected, found } => StageError::SchemaMismatch { expected,
                                                                                              found: Some(found) },
            other => StageError::Transport(other.to_string()),
        }
    }
}

/// Payload tipado transportable en un `Envelope`.
pub trait StagePayload: Sized + Serialize + DeserializeOwned {
    const KIND: PayloadKind;
    /// Versión de esquema (incrementar en cambios incompatibles).
    const SCHEMA_VERSION: u32 = 1;

    /// Validación semántica ligera. Opcional.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    fn to_envelope(&self) -> Result<Envelope, EnvelopeError> {
        let body = serde_json::to_value(self).map_err(|e| EnvelopeError::Serialize(e.to_string()))?;
        let hash = hash_value(&body);
        Ok(Envelope { kind: Self::KIND,
                      schema_version: Self::SCHEMA_VERSION,
                      hash,
                      body })
    }

    /// Decodifica verificando kind, versión, hash y validación.
    fn from_envelope(env: &Envelope) -> Result<Self, EnvelopeError> {
        if env.kind != Self::KIND {
            return Err(EnvelopeError::KindMismatch { expected: Self::KIND,
                                                     found: env.kind });
        }
        if env.schema_version != Self::SCHEMA_VERSION {
            return Err(EnvelopeError::VersionMismatch { expected: Self::SCHEMA_VERSION,
                                                        found: env.schema_version });
        }
        if !env.verify_hash() {
            return Err(EnvelopeError::HashMismatch);
        }
        let decoded: Self =
            serde_json::from_value(env.body.clone()).map_err(|e| EnvelopeError::Deserialize(e.to_string()))?;
        decoded.validate().map_err(EnvelopeError::Validation)?;
        Ok(decoded)
    }
}
