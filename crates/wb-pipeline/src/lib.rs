//! wb-pipeline: orquestador de runs resolve -> calculate -> interpret.
//!
//! Cada run se ejecuta como tarea tokio independiente. Las etapas de un run
//! son secuenciales; runs distintos sólo comparten la caché de etapas y el
//! run store.
pub mod engine;
pub mod errors;
pub mod gateway;
pub mod policy;
pub mod request;
pub mod summary;

pub use engine::{Orchestrator, OrchestratorBuilder, RunHandle};
pub use errors::OrchestratorError;
pub use policy::StagePolicy;
pub use request::PipelineRequest;
pub use summary::{FailureSummary, RunSummary};
