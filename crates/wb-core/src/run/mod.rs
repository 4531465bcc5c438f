//! Ciclo de vida de un `PipelineRun`: estados, eventos append-only, replay y
//! almacenamiento.

pub mod event;
pub mod record;
pub mod state;
pub mod store;

pub use event::{RunEvent, RunEventKind};
pub use record::{PipelineRun, StageRecord};
pub use state::RunState;
pub use store::{InMemoryRunStore, RunStore};
