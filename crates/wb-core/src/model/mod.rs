//! Modelos intercambiados entre etapas (Envelope, StagePayload).

pub mod envelope;

pub use envelope::{Envelope, EnvelopeError, PayloadKind, StagePayload};
