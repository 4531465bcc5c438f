//! Contratos de etapa. Toda implementación (local o remota) devuelve el
//! output ya envuelto en un `Envelope` versionado.
use async_trait::async_trait;
use wb_core::{Envelope, StageError};
use wb_domain::{ArtifactSize, CalculationRequest, CalculationResult, Term};

#[async_trait]
pub trait LexiconResolver: Send + Sync {
    fn name(&self) -> &str;
    /// Versión actual de la base de conocimiento.
    async fn kb_version(&self) -> Result<String, StageError>;
    /// term -> `ResolvedEntity` | NOT_FOUND | AMBIGUOUS.
    async fn resolve(&self, term: &Term) -> Result<Envelope, StageError>;
}

#[async_trait]
pub trait Calculator: Send + Sync {
    fn name(&self) -> &str;
    /// Función pura de la petición: `CalculationResult` | COMPUTATION_ERROR.
    async fn calculate(&self, request: &CalculationRequest) -> Result<Envelope, StageError>;
}

#[async_trait]
pub trait Interpreter: Send + Sync {
    fn name(&self) -> &str;
    /// `RenderedArtifact` | RENDER_ERROR.
    async fn interpret(&self, result: &CalculationResult, size: ArtifactSize) -> Result<Envelope, StageError>;
}
