use thiserror::Error;
use wb_core::{ErrorCode, StageError};

/// Error del dominio. Cada variante tiene un código de wire estable.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    #[error("term is empty after normalization")]
    EmptyTerm,
    #[error("no entity matches '{0}'")]
    NotFound(String),
    #[error("term '{term}' matches several entities: {}", candidates.join(", "))]
    Ambiguous { term: String, candidates: Vec<String> },
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("computation failed: {0}")]
    Computation(String),
    #[error("cannot render result: {0}")]
    Render(String),
    #[error("knowledge base error: {0}")]
    KnowledgeBase(String),
}

impl DomainError {
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        DomainError::InvalidParameter { name: name.into(),
                                        reason: reason.into() }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            DomainError::EmptyTerm | DomainError::NotFound(_) => ErrorCode::NotFound,
            DomainError::Ambiguous { .. } => ErrorCode::Ambiguous,
            DomainError::InvalidParameter { .. } => ErrorCode::InvalidParameter,
            DomainError::Computation(_) => ErrorCode::ComputationError,
            DomainError::Render(_) => ErrorCode::RenderError,
            DomainError::KnowledgeBase(_) => ErrorCode::Internal,
        }
    }
}

impl From<DomainError> for StageError {
    fn from(e: DomainError) -> Self {
        StageError::rejected(e.code(), e.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self {
        DomainError::KnowledgeBase(e.to_string())
    }
}
