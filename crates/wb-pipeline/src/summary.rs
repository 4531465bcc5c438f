//! Proyección de un `PipelineRun` para clientes.
//!
//! Nunca expone trazas internas: los fallos de render se reportan con un
//! mensaje genérico y los de disponibilidad sin el detalle de transporte.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wb_core::{ErrorCode, ErrorKind, FailureReason, PipelineRun, RunState, Stage, StagePayload};
use wb_domain::{RenderedArtifact, ResolvedEntity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureSummary {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub message: String,
    pub retriable: bool,
}

impl FailureSummary {
    fn new(stage: Stage, reason: &FailureReason) -> Self {
        let message = match reason {
            FailureReason::Timeout => format!("{stage} stage timed out"),
            FailureReason::Unavailable { .. } => format!("{stage} stage is unavailable"),
            FailureReason::Rejected { code: ErrorCode::RenderError | ErrorCode::Internal, .. } => {
                "the result could not be rendered".to_string()
            }
            FailureReason::Rejected { message, .. } => message.clone(),
        };
        Self { stage,
               kind: reason.kind(),
               code: reason.code(),
               message,
               retriable: reason.is_retriable() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub term: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<RenderedArtifact>,
    pub attempts: BTreeMap<Stage, u32>,
    pub cached: Vec<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn from_run(run: &PipelineRun) -> Self {
        let failure = match &run.state {
            RunState::Failed { stage, reason } => Some(FailureSummary::new(*stage, reason)),
            _ => None,
        };
        let entity_id = run.output(Stage::Resolve)
                           .and_then(|env| ResolvedEntity::from_envelope(env).ok())
                           .map(|e| e.id);
        let artifact = run.output(Stage::Interpret)
                          .and_then(|env| RenderedArtifact::from_envelope(env).ok());
        Self { run_id: run.id,
               term: run.term.clone(),
               state: run.state.label().to_string(),
               failure,
               entity_id,
               artifact,
               attempts: run.stages.iter().map(|r| (r.stage, r.attempts)).collect(),
               cached: run.stages.iter().filter(|r| r.cached).map(|r| r.stage).collect(),
               run_fingerprint: run.run_fingerprint.clone(),
               created_at: run.created_at,
               updated_at: run.updated_at }
    }

    pub fn is_completed(&self) -> bool {
        self.state == "completed"
    }
}
