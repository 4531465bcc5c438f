use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::{PipelineRun, RunEvent, RunEventKind};
use crate::errors::CoreError;

/// Almacenamiento append-only de eventos de run con snapshot materializado.
pub trait RunStore: Send + Sync {
    /// Valida el evento contra el snapshot actual y lo agrega de forma atómica.
    /// Un `RunSubmitted` crea el run; cualquier otro exige que exista.
    fn append(&self, run_id: Uuid, kind: RunEventKind) -> Result<RunEvent, CoreError>;
    /// Eventos del run en orden ascendente de `seq`.
    fn events(&self, run_id: Uuid) -> Vec<RunEvent>;
    fn snapshot(&self, run_id: Uuid) -> Option<PipelineRun>;
    fn run_ids(&self) -> Vec<Uuid>;
    /// Elimina runs terminales cuya última actualización es anterior a `cutoff`.
    fn prune_terminal_before(&self, cutoff: DateTime<Utc>) -> usize;
}

struct RunEntry {
    events: Vec<RunEvent>,
    snapshot: PipelineRun,
}

#[derive(Default)]
pub struct InMemoryRunStore {
    runs: DashMap<Uuid, RunEntry>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunStore for InMemoryRunStore {
    fn append(&self, run_id: Uuid, kind: RunEventKind) -> Result<RunEvent, CoreError> {
        if matches!(kind, RunEventKind::RunSubmitted { .. }) {
            return match self.runs.entry(run_id) {
                Entry::Occupied(_) => Err(CoreError::DuplicateRun),
                Entry::Vacant(slot) => {
                    let ev = RunEvent { seq: 0,
                                        run_id,
                                        kind,
                                        ts: Utc::now() };
                    let snapshot = PipelineRun::from_submitted(&ev)?;
                    slot.insert(RunEntry { events: vec![ev.clone()],
                                           snapshot });
                    Ok(ev)
                }
            };
        }
        let mut entry = self.runs.get_mut(&run_id).ok_or(CoreError::UnknownRun(run_id))?;
        let ev = RunEvent { seq: entry.events.len() as u64,
                            run_id,
                            kind,
                            ts: Utc::now() };
        let mut next = entry.snapshot.clone();
        next.apply(&ev)?;
        entry.snapshot = next;
        entry.events.push(ev.clone());
        tracing::debug!(%run_id, seq = ev.seq, event = ev.kind.name(), "run event appended");
        Ok(ev)
    }

    fn events(&self, run_id: Uuid) -> Vec<RunEvent> {
        self.runs.get(&run_id).map(|e| e.events.clone()).unwrap_or_default()
    }

    fn snapshot(&self, run_id: Uuid) -> Option<PipelineRun> {
        self.runs.get(&run_id).map(|e| e.snapshot.clone())
    }

    fn run_ids(&self) -> Vec<Uuid> {
        self.runs.iter().map(|e| *e.key()).collect()
    }

    fn prune_terminal_before(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.runs.len();
        self.runs
            .retain(|_, e| !(e.snapshot.state.is_terminal() && e.snapshot.updated_at < cutoff));
        before - self.runs.len()
    }
}
