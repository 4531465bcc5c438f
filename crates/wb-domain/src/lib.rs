//! wb-domain: tipos de dominio del pipeline.
//!
//! Término, entidad resuelta, base de conocimiento, petición y resultado de
//! cálculo, artefacto renderizado. Los tipos que cruzan una frontera de etapa
//! implementan `wb_core::StagePayload`.
pub mod artifact;
pub mod calculation;
pub mod entity;
pub mod error;
pub mod knowledge_base;
pub mod term;

pub use artifact::{ArtifactSize, Definition, RenderedArtifact};
pub use calculation::{CalculationRequest, CalculationResult, Provenance, ResultSeries};
pub use entity::{ParameterSpec, ResolvedEntity};
pub use error::DomainError;
pub use knowledge_base::{InMemoryKnowledgeBase, KbEntry, KnowledgeBase, SEED_VERSION};
pub use term::Term;
