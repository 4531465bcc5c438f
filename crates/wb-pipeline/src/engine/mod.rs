//! Motor de orquestación.

pub mod builder;
pub mod core;
pub mod handle;

pub use builder::OrchestratorBuilder;
pub use self::core::Orchestrator;
pub use handle::RunHandle;
