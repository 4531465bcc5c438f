//! wb-services: las tres etapas del pipeline.
//!
//! - `contracts`: traits async que consume el orquestador.
//! - `lexicon`, `calculator`, `interpreter`: implementaciones locales.
//! - `server`: routers axum que exponen cada etapa como microservicio.
//! - `client`: implementaciones HTTP de los mismos traits.
//! - `wire`: cuerpos de petición/respuesta compartidos por servidor y cliente.
pub mod calculator;
pub mod client;
pub mod contracts;
pub mod interpreter;
pub mod lexicon;
pub mod server;
pub mod wire;

pub use calculator::{CalculationKernel, KernelCalculator, MolarMassKernel};
pub use client::{ClientError, HttpCalculator, HttpInterpreter, HttpResolver, HttpStageClient};
pub use contracts::{Calculator, Interpreter, LexiconResolver};
pub use interpreter::{describe, ChartInterpreter};
pub use lexicon::KnowledgeBaseResolver;
