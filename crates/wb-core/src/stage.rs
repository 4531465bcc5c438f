use std::fmt;

use serde::{Deserialize, Serialize};

/// Etapas del pipeline, en orden de ejecución.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolve,
    Calculate,
    Interpret,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Resolve, Stage::Calculate, Stage::Interpret];

    /// Nombre estable usado en eventos, logs y respuestas de error.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Resolve => "resolve",
            Stage::Calculate => "calculate",
            Stage::Interpret => "interpret",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Stage::Resolve => 0,
            Stage::Calculate => 1,
            Stage::Interpret => 2,
        }
    }

    /// Etapa anterior (None para la primera).
    pub fn previous(&self) -> Option<Stage> {
        match self {
            Stage::Resolve => None,
            Stage::Calculate => Some(Stage::Resolve),
            Stage::Interpret => Some(Stage::Calculate),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
