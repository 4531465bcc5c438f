//! Eventos append-only de un run. El estado se reconstruye aplicándolos en
//! orden (`PipelineRun::replay`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::FailureReason;
use crate::model::Envelope;
use crate::stage::Stage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub seq: u64,
    pub run_id: Uuid,
    pub kind: RunEventKind,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEventKind {
    /// Primer evento de todo run.
    RunSubmitted { term: String, request: Value },
    StageStarted { stage: Stage },
    StageAttempted { stage: Stage, attempt: u32 },
    StageRetryScheduled { stage: Stage, attempt: u32, delay_ms: u64, error: String },
    StageFinished { stage: Stage, output: Envelope, fingerprint: String, cached: bool },
    StageFailed { stage: Stage, reason: FailureReason },
    /// Reabre un run fallido por disponibilidad. Retoma tras la última etapa
    /// con output registrado.
    RunReopened,
    RunCancelled { stage: Option<Stage> },
    RunCompleted { run_fingerprint: String },
}

impl RunEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            RunEventKind::RunSubmitted { .. } => "run_submitted",
            RunEventKind::StageStarted { .. } => "stage_started",
            RunEventKind::StageAttempted { .. } => "stage_attempted",
            RunEventKind::StageRetryScheduled { .. } => "stage_retry_scheduled",
            RunEventKind::StageFinished { .. } => "stage_finished",
            RunEventKind::StageFailed { .. } => "stage_failed",
            RunEventKind::RunReopened => "run_reopened",
            RunEventKind::RunCancelled { .. } => "run_cancelled",
            RunEventKind::RunCompleted { .. } => "run_completed",
        }
    }
}
