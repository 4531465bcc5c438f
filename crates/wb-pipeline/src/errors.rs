use thiserror::Error;
use uuid::Uuid;
use wb_core::{CoreError, StageError};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("unknown run {0}")]
    UnknownRun(Uuid),
    #[error("run {0} cannot be retried")]
    NotRetriable(Uuid),
    #[error("missing component: {0}")]
    Missing(&'static str),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("stage error: {0}")]
    Stage(#[from] StageError),
    #[error("run task failed: {0}")]
    Join(String),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("core: {0}")]
    Core(CoreError),
}

impl From<CoreError> for OrchestratorError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::UnknownRun(id) => OrchestratorError::UnknownRun(id),
            other => OrchestratorError::Core(other),
        }
    }
}
