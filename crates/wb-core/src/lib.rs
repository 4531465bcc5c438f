//! wb-core: piezas neutrales del pipeline por etapas.
//!
//! Este crate no conoce el dominio (términos, entidades, cálculos). Provee:
//! - `hashing`: JSON canónico + hash estable para fingerprints.
//! - `model`: `Envelope` versionado que viaja entre etapas.
//! - `run`: eventos append-only y replay de un `PipelineRun`.
//! - `cache`: caché single-flight por clave de etapa.
//! - `retry`: política de reintentos con backoff exponencial acotado.
pub mod cache;
pub mod constants;
pub mod errors;
pub mod hashing;
pub mod model;
pub mod retry;
pub mod run;
pub mod stage;

pub use cache::{get_or_compute, CacheKey, InMemoryStageCache, StageCache};
pub use errors::{CoreError, ErrorCode, ErrorKind, FailureReason, StageError};
pub use model::{Envelope, EnvelopeError, PayloadKind, StagePayload};
pub use retry::RetryPolicy;
pub use run::{InMemoryRunStore, PipelineRun, RunEvent, RunEventKind, RunState, RunStore, StageRecord};
pub use stage::Stage;
