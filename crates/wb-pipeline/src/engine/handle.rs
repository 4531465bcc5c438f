use tokio::task::JoinHandle;
use uuid::Uuid;
use wb_core::PipelineRun;

use crate::errors::OrchestratorError;

/// Run lanzado en su propia tarea.
pub struct RunHandle {
    run_id: Uuid,
    join: JoinHandle<Result<PipelineRun, OrchestratorError>>,
}

impl RunHandle {
    pub(crate) fn new(run_id: Uuid, join: JoinHandle<Result<PipelineRun, OrchestratorError>>) -> Self {
        Self { run_id, join }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Espera el estado terminal del run.
    pub async fn wait(self) -> Result<PipelineRun, OrchestratorError> {
        self.join.await.map_err(|e| OrchestratorError::Join(e.to_string()))?
    }
}
