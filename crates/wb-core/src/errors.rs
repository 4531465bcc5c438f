//! Taxonomía de errores del pipeline.
//!
//! - `ErrorCode`: código estable expuesto en el cuerpo HTTP
//!   (`{"error": {"code": ..., "message": ...}}`).
//! - `ErrorKind`: clase del error; sólo `Availability` es reintentable.
//! - `StageError`: lo que una etapa (local o remota) devuelve al orquestador.
//! - `FailureReason`: lo que queda registrado en un `PipelineRun` fallido.
//! - `CoreError`: violaciones internas (transiciones inválidas, runs
//!   desconocidos).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stage::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    Ambiguous,
    InvalidParameter,
    ComputationError,
    RenderError,
    SchemaMismatch,
    Timeout,
    Unavailable,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Ambiguous => "AMBIGUOUS",
            ErrorCode::InvalidParameter => "INVALID_PARAMETER",
            ErrorCode::ComputationError => "COMPUTATION_ERROR",
            ErrorCode::RenderError => "RENDER_ERROR",
            ErrorCode::SchemaMismatch => "SCHEMA_MISMATCH",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Unavailable => "UNAVAILABLE",
            ErrorCode::Internal => "INTERNAL",
        }
    }

    /// Parsea el código recibido por la red. Códigos desconocidos -> None.
    pub fn from_wire(code: &str) -> Option<Self> {
        let code = match code {
            "NOT_FOUND" => ErrorCode::NotFound,
            "AMBIGUOUS" => ErrorCode::Ambiguous,
            "INVALID_PARAMETER" => ErrorCode::InvalidParameter,
            "COMPUTATION_ERROR" => ErrorCode::ComputationError,
            "RENDER_ERROR" => ErrorCode::RenderError,
            "SCHEMA_MISMATCH" => ErrorCode::SchemaMismatch,
            "TIMEOUT" => ErrorCode::Timeout,
            "UNAVAILABLE" => ErrorCode::Unavailable,
            "INTERNAL" => ErrorCode::Internal,
            _ => return None,
        };
        Some(code)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ErrorCode::NotFound | ErrorCode::Ambiguous | ErrorCode::InvalidParameter => ErrorKind::Validation,
            ErrorCode::ComputationError => ErrorKind::DomainComputation,
            ErrorCode::RenderError | ErrorCode::Internal => ErrorKind::Render,
            ErrorCode::SchemaMismatch | ErrorCode::Timeout | ErrorCode::Unavailable => ErrorKind::Availability,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Término o parámetros inválidos. Se devuelve tal cual al cliente.
    Validation,
    /// Cálculo estructuralmente imposible.
    DomainComputation,
    /// Contrato roto entre calculadora e intérprete (defecto interno).
    Render,
    /// Etapa inalcanzable, timeout o sobre malformado.
    Availability,
}

impl ErrorKind {
    pub fn is_retriable(&self) -> bool {
        matches!(self, ErrorKind::Availability)
    }
}

/// Error devuelto por una etapa.
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageError {
    /// La etapa respondió y rechazó la petición.
    #[error("{code}: {message}")]
    Rejected { code: ErrorCode, message: String },
    /// Fallo de transporte: conexión, 5xx o cuerpo ilegible.
    #[error("transport failure: {0}")]
    Transport(String),
    /// El payload declara una versión de esquema distinta de la esperada.
    #[error("schema mismatch: expected v{expected}, found {found:?}")]
    SchemaMismatch { expected: u32, found: Option<u32> },
}

impl StageError {
    pub fn rejected(code: ErrorCode, message: impl Into<String>) -> Self {
        StageError::Rejected { code,
                               message: message.into() }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            StageError::Rejected { code, .. } => *code,
            StageError::Transport(_) => ErrorCode::Unavailable,
            StageError::SchemaMismatch { .. } => ErrorCode::SchemaMismatch,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.code().kind()
    }

    pub fn is_retriable(&self) -> bool {
        self.kind().is_retriable()
    }
}

/// Motivo terminal registrado en un run fallido.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// El último intento excedió el timeout de la etapa.
    Timeout,
    /// Se agotaron los reintentos por fallos de transporte.
    Unavailable { detail: String },
    /// La etapa rechazó la petición (no reintentable).
    Rejected { code: ErrorCode, message: String },
}

impl FailureReason {
    pub fn code(&self) -> ErrorCode {
        match self {
            FailureReason::Timeout => ErrorCode::Timeout,
            FailureReason::Unavailable { .. } => ErrorCode::Unavailable,
            FailureReason::Rejected { code, .. } => *code,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.code().kind()
    }

    pub fn is_retriable(&self) -> bool {
        self.kind().is_retriable()
    }
}

impl From<StageError> for FailureReason {
    fn from(e: StageError) -> Self {
        match e {
            StageError::Rejected { code, message } => FailureReason::Rejected { code, message },
            other => FailureReason::Unavailable { detail: other.to_string() },
        }
    }
}

/// Errores internos del core.
#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum CoreError {
    #[error("unknown run {0}")]
    UnknownRun(uuid::Uuid),
    #[error("run already submitted")]
    DuplicateRun,
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("stage {0} already recorded an output")]
    StageAlreadyRecorded(Stage),
    #[error("run is not retriable")]
    NotRetriable,
    #[error("internal: {0}")]
    Internal(String),
}
