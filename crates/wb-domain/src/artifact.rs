use serde::{Deserialize, Serialize};
use wb_core::{PayloadKind, StagePayload};

use crate::DomainError;

/// Dimensiones explícitas del gráfico.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactSize {
    pub width: u32,
    pub height: u32,
}

impl ArtifactSize {
    pub fn new(width: u32, height: u32) -> Result<Self, DomainError> {
        if width == 0 || height == 0 {
            return Err(DomainError::invalid_parameter("size", "width and height must be positive"));
        }
        Ok(Self { width, height })
    }
}

impl Default for ArtifactSize {
    fn default() -> Self {
        Self { width: 640,
               height: 360 }
    }
}

/// Artefacto terminal del pipeline: SVG dimensionado + narrativa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedArtifact {
    pub width: u32,
    pub height: u32,
    pub media_type: String,
    pub payload: String,
    pub narrative: String,
    pub series_labels: Vec<String>,
    /// `provenance_hash` del `CalculationResult` de origen.
    pub source_hash: String,
    pub interpretive_engine: String,
}

impl RenderedArtifact {
    pub fn size(&self) -> ArtifactSize {
        ArtifactSize { width: self.width,
                       height: self.height }
    }
}

impl StagePayload for RenderedArtifact {
    const KIND: PayloadKind = PayloadKind::RenderedArtifact;

    fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("artifact must declare positive dimensions".into());
        }
        if self.media_type.is_empty() {
            return Err("artifact has no media type".into());
        }
        Ok(())
    }
}

/// Texto de definición de una entidad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub entity_id: String,
    pub definition_text: String,
}
