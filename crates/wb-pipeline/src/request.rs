use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use wb_domain::{ArtifactSize, DomainError};

/// Petición de cliente. El término se valida dentro del run (un término vacío
/// produce un run fallido en `resolve`), no al aceptar la petición.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub term: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl PipelineRequest {
    pub fn new(term: impl Into<String>) -> Self {
        Self { term: term.into(),
               parameters: BTreeMap::new(),
               width: None,
               height: None }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Tamaño pedido, completando con `default` lo que falte.
    pub fn artifact_size(&self, default: ArtifactSize) -> Result<ArtifactSize, DomainError> {
        ArtifactSize::new(self.width.unwrap_or(default.width), self.height.unwrap_or(default.height))
    }
}
