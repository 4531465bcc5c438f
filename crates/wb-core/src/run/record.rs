//! Estado reconstruido de un run.
//!
//! `PipelineRun` es una proyección de sus eventos: `apply` valida cada
//! transición contra `RunState::can_transition_to` y nunca sobrescribe el
//! output de una etapa ya registrada.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{RunEvent, RunEventKind, RunState};
use crate::errors::CoreError;
use crate::model::Envelope;
use crate::stage::Stage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub output: Option<Envelope>,
    pub fingerprint: Option<String>,
    pub attempts: u32,
    pub cached: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StageRecord {
    fn empty(stage: Stage) -> Self {
        Self { stage,
               output: None,
               fingerprint: None,
               attempts: 0,
               cached: false,
               started_at: None,
               finished_at: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub term: String,
    pub request: Value,
    pub state: RunState,
    pub stages: Vec<StageRecord>,
    pub run_fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineRun {
    /// Construye el run a partir de su evento `RunSubmitted`.
    pub fn from_submitted(ev: &RunEvent) -> Result<Self, CoreError> {
        match &ev.kind {
            RunEventKind::RunSubmitted { term, request } => {
                Ok(Self { id: ev.run_id,
                          term: term.clone(),
                          request: request.clone(),
                          state: RunState::Submitted,
                          stages: Stage::ALL.iter().map(|s| StageRecord::empty(*s)).collect(),
                          run_fingerprint: None,
                          created_at: ev.ts,
                          updated_at: ev.ts })
            }
            other => Err(CoreError::Internal(format!("first event must be run_submitted, got {}", other.name()))),
        }
    }

    /// Replay lineal de una secuencia de eventos.
    pub fn replay(events: &[RunEvent]) -> Result<Self, CoreError> {
        let (first, rest) = events.split_first()
                                  .ok_or_else(|| CoreError::Internal("empty event log".into()))?;
        let mut run = Self::from_submitted(first)?;
        for ev in rest {
            run.apply(ev)?;
        }
        Ok(run)
    }

    pub fn record(&self, stage: Stage) -> &StageRecord {
        &self.stages[stage.index()]
    }

    pub fn output(&self, stage: Stage) -> Option<&Envelope> {
        self.record(stage).output.as_ref()
    }

    /// Última etapa con output registrado.
    pub fn last_recorded(&self) -> Option<Stage> {
        Stage::ALL.iter().rev().copied().find(|s| self.output(*s).is_some())
    }

    fn transition(&mut self, next: RunState) -> Result<(), CoreError> {
        if !self.state.can_transition_to(&next) {
            return Err(CoreError::InvalidTransition { from: self.state.to_string(),
                                                      to: next.to_string() });
        }
        self.state = next;
        Ok(())
    }

    fn expect_running(&self, stage: Stage) -> Result<(), CoreError> {
        if self.state == RunState::running(stage) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition { from: self.state.to_string(),
                                               to: RunState::running(stage).to_string() })
        }
    }

    pub fn apply(&mut self, ev: &RunEvent) -> Result<(), CoreError> {
        if ev.run_id != self.id {
            return Err(CoreError::Internal(format!("event for run {} applied to {}", ev.run_id, self.id)));
        }
        match &ev.kind {
            RunEventKind::RunSubmitted { .. } => return Err(CoreError::DuplicateRun),
            RunEventKind::StageStarted { stage } => {
                if self.output(*stage).is_some() {
                    return Err(CoreError::StageAlreadyRecorded(*stage));
                }
                self.transition(RunState::running(*stage))?;
                self.stages[stage.index()].started_at = Some(ev.ts);
            }
            RunEventKind::StageAttempted { stage, .. } => {
                self.expect_running(*stage)?;
                self.stages[stage.index()].attempts += 1;
            }
            RunEventKind::StageRetryScheduled { stage, .. } => self.expect_running(*stage)?,
            RunEventKind::StageFinished { stage,
                                          output,
                                          fingerprint,
                                          cached, } => {
                if self.output(*stage).is_some() {
                    return Err(CoreError::StageAlreadyRecorded(*stage));
                }
                self.transition(RunState::done(*stage))?;
                let rec = &mut self.stages[stage.index()];
                rec.output = Some(output.clone());
                rec.fingerprint = Some(fingerprint.clone());
                rec.cached = *cached;
                rec.finished_at = Some(ev.ts);
            }
            RunEventKind::StageFailed { stage, reason } => {
                self.transition(RunState::Failed { stage: *stage,
                                                   reason: reason.clone() })?;
                self.stages[stage.index()].finished_at = Some(ev.ts);
            }
            RunEventKind::RunReopened => {
                match &self.state {
                    RunState::Failed { reason, .. } if reason.is_retriable() => {}
                    _ => return Err(CoreError::NotRetriable),
                }
                self.state = self.last_recorded().map(RunState::done).unwrap_or(RunState::Submitted);
            }
            RunEventKind::RunCancelled { stage } => self.transition(RunState::Cancelled { stage: *stage })?,
            RunEventKind::RunCompleted { run_fingerprint } => {
                if self.state != RunState::Completed || self.run_fingerprint.is_some() {
                    return Err(CoreError::InvalidTransition { from: self.state.to_string(),
                                                              to: "completed".into() });
                }
                self.run_fingerprint = Some(run_fingerprint.clone());
            }
        }
        self.updated_at = ev.ts;
        Ok(())
    }
}
