use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::FailureReason;
use crate::stage::Stage;

/// Estado de un run. Avanza sólo hacia delante; `Completed`, `Failed` y
/// `Cancelled` son terminales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Submitted,
    Resolving,
    Resolved,
    Calculating,
    Calculated,
    Interpreting,
    Completed,
    Failed { stage: Stage, reason: FailureReason },
    Cancelled { stage: Option<Stage> },
}

impl RunState {
    /// Estado mientras `stage` está en curso.
    pub fn running(stage: Stage) -> Self {
        match stage {
            Stage::Resolve => RunState::Resolving,
            Stage::Calculate => RunState::Calculating,
            Stage::Interpret => RunState::Interpreting,
        }
    }

    /// Estado tras el éxito de `stage`.
    pub fn done(stage: Stage) -> Self {
        match stage {
            Stage::Resolve => RunState::Resolved,
            Stage::Calculate => RunState::Calculated,
            Stage::Interpret => RunState::Completed,
        }
    }

    /// Etapa en curso, si la hay.
    pub fn active_stage(&self) -> Option<Stage> {
        match self {
            RunState::Resolving => Some(Stage::Resolve),
            RunState::Calculating => Some(Stage::Calculate),
            RunState::Interpreting => Some(Stage::Interpret),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed { .. } | RunState::Cancelled { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunState::Submitted => "submitted",
            RunState::Resolving => "resolving",
            RunState::Resolved => "resolved",
            RunState::Calculating => "calculating",
            RunState::Calculated => "calculated",
            RunState::Interpreting => "interpreting",
            RunState::Completed => "completed",
            RunState::Failed { .. } => "failed",
            RunState::Cancelled { .. } => "cancelled",
        }
    }

    /// Posición en la secuencia lineal. None para los estados de salida.
    fn rank(&self) -> Option<u8> {
        match self {
            RunState::Submitted => Some(0),
            RunState::Resolving => Some(1),
            RunState::Resolved => Some(2),
            RunState::Calculating => Some(3),
            RunState::Calculated => Some(4),
            RunState::Interpreting => Some(5),
            RunState::Completed => Some(6),
            RunState::Failed { .. } | RunState::Cancelled { .. } => None,
        }
    }

    pub fn can_transition_to(&self, next: &RunState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(from), Some(to)) => to == from + 1,
            (None, Some(_)) => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Failed { stage, reason } => write!(f, "failed({stage}, {})", reason.code()),
            RunState::Cancelled { stage: Some(stage) } => write!(f, "cancelled({stage})"),
            other => f.write_str(other.label()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_only() {
        assert!(RunState::Submitted.can_transition_to(&RunState::Resolving));
        assert!(RunState::Resolving.can_transition_to(&RunState::Resolved));
        assert!(!RunState::Resolving.can_transition_to(&RunState::Calculating));
        assert!(!RunState::Calculated.can_transition_to(&RunState::Resolving));
        assert!(!RunState::Completed.can_transition_to(&RunState::Cancelled { stage: None }));
    }

    #[test]
    fn exits_reachable_from_any_non_terminal() {
        let failed = RunState::Failed { stage: Stage::Calculate,
                                        reason: FailureReason::Timeout };
        for s in [RunState::Submitted, RunState::Resolved, RunState::Interpreting] {
            assert!(s.can_transition_to(&failed));
            assert!(s.can_transition_to(&RunState::Cancelled { stage: None }));
        }
        assert!(!failed.can_transition_to(&RunState::Cancelled { stage: None }));
    }

    #[test]
    fn done_interpret_is_completed() {
        assert_eq!(RunState::done(Stage::Interpret), RunState::Completed);
        assert_eq!(RunState::running(Stage::Calculate), RunState::Calculating);
        assert_eq!(RunState::Calculating.active_stage(), Some(Stage::Calculate));
        assert_eq!(RunState::Resolved.active_stage(), None);
    }
}
