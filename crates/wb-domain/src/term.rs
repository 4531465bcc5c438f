use std::fmt;

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// Término de búsqueda tal como lo envió el usuario, junto con su forma
/// normalizada (recortado, minúsculas Unicode, espacios internos colapsados).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Term {
    raw: String,
    normalized: String,
}

impl Term {
    pub fn new(raw: &str) -> Result<Self, DomainError> {
        let normalized = normalize(raw);
        if normalized.is_empty() {
            return Err(DomainError::EmptyTerm);
        }
        Ok(Self { raw: raw.to_string(),
                  normalized })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }
}

/// Colación usada tanto para términos como para nombres y alias de la KB.
pub fn normalize(input: &str) -> String {
    input.split_whitespace()
         .map(|w| w.to_lowercase())
         .collect::<Vec<_>>()
         .join(" ")
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}
