#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use wb_core::{Envelope, ErrorCode, PayloadKind, StageError};
use wb_domain::{ArtifactSize, CalculationRequest, CalculationResult, InMemoryKnowledgeBase, Term};
use wb_pipeline::{Orchestrator, OrchestratorBuilder, StagePolicy};
use wb_services::{Calculator, ChartInterpreter, Interpreter, KernelCalculator, KnowledgeBaseResolver,
                  LexiconResolver};

/// Resolver real con contador y retardo opcional.
pub struct CountingResolver {
    inner: KnowledgeBaseResolver,
    pub calls: AtomicUsize,
    delay: Duration,
}

impl CountingResolver {
    pub fn new(delay: Duration) -> Self {
        Self { inner: KnowledgeBaseResolver::new(Arc::new(InMemoryKnowledgeBase::seed())),
               calls: AtomicUsize::new(0),
               delay }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LexiconResolver for CountingResolver {
    fn name(&self) -> &str {
        "counting"
    }

    async fn kb_version(&self) -> Result<String, StageError> {
        self.inner.kb_version().await
    }

    async fn resolve(&self, term: &Term) -> Result<Envelope, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.resolve(term).await
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    /// Falla con error de transporte mientras `down` esté activo.
    Down,
    /// Tarda más que cualquier timeout razonable.
    Hang,
    /// Rechaza con un error de cómputo.
    Reject,
    /// Señala `entered` y queda pendiente para siempre.
    Block,
}

/// Calculadora real envuelta con inyección de fallos.
pub struct FaultyCalculator {
    inner: KernelCalculator,
    pub calls: AtomicUsize,
    fault: Fault,
    /// Número de llamadas que fallan antes de responder bien (sólo `Down`).
    failures: usize,
    pub down: AtomicBool,
    pub entered: Notify,
}

impl FaultyCalculator {
    pub fn new(fault: Fault) -> Self {
        Self::failing(fault, usize::MAX)
    }

    pub fn failing(fault: Fault, failures: usize) -> Self {
        Self { inner: KernelCalculator::molar_mass(),
               calls: AtomicUsize::new(0),
               fault,
               failures,
               down: AtomicBool::new(true),
               entered: Notify::new() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Calculator for FaultyCalculator {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn calculate(&self, request: &CalculationRequest) -> Result<Envelope, StageError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.fault {
            Fault::Down if n < self.failures && self.down.load(Ordering::SeqCst) => {
                Err(StageError::Transport("connection refused".into()))
            }
            Fault::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                self.inner.calculate(request).await
            }
            Fault::Reject => Err(StageError::rejected(ErrorCode::ComputationError, "no usable molar mass")),
            Fault::Block => {
                self.entered.notify_one();
                std::future::pending().await
            }
            _ => self.inner.calculate(request).await,
        }
    }
}

pub struct CountingInterpreter {
    inner: ChartInterpreter,
    pub calls: AtomicUsize,
}

impl CountingInterpreter {
    pub fn new() -> Self {
        Self { inner: ChartInterpreter::new(),
               calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Interpreter for CountingInterpreter {
    fn name(&self) -> &str {
        "counting"
    }

    async fn interpret(&self, result: &CalculationResult, size: ArtifactSize) -> Result<Envelope, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.interpret(result, size).await
    }
}

pub struct Rig {
    pub resolver: Arc<CountingResolver>,
    pub calculator: Arc<FaultyCalculator>,
    pub interpreter: Arc<CountingInterpreter>,
}

impl Rig {
    pub fn new(calculator: FaultyCalculator) -> Self {
        Self::with_resolver(CountingResolver::new(Duration::ZERO), calculator)
    }

    pub fn with_resolver(resolver: CountingResolver, calculator: FaultyCalculator) -> Self {
        Self { resolver: Arc::new(resolver),
               calculator: Arc::new(calculator),
               interpreter: Arc::new(CountingInterpreter::new()) }
    }

    pub fn builder(&self) -> OrchestratorBuilder {
        Orchestrator::builder().resolver(self.resolver.clone())
                               .calculator(self.calculator.clone())
                               .interpreter(self.interpreter.clone())
                               .policy(StagePolicy::default())
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        Arc::new(self.builder().build().unwrap())
    }
}

pub fn moles(n: f64) -> BTreeMap<String, f64> {
    let mut p = BTreeMap::new();
    p.insert("moles".to_string(), n);
    p
}

/// Resolver que devuelve sobres con otra versión de esquema mientras
/// `tampering` esté activo.
pub struct VersionSkewResolver {
    inner: KnowledgeBaseResolver,
    pub calls: AtomicUsize,
    pub tampering: AtomicBool,
}

impl VersionSkewResolver {
    pub fn new() -> Self {
        Self { inner: KnowledgeBaseResolver::new(Arc::new(InMemoryKnowledgeBase::seed())),
               calls: AtomicUsize::new(0),
               tampering: AtomicBool::new(true) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LexiconResolver for VersionSkewResolver {
    fn name(&self) -> &str {
        "version-skew"
    }

    async fn kb_version(&self) -> Result<String, StageError> {
        self.inner.kb_version().await
    }

    async fn resolve(&self, term: &Term) -> Result<Envelope, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut env = self.inner.resolve(term).await?;
        if self.tampering.load(Ordering::SeqCst) {
            env.schema_version = 2;
        }
        Ok(env)
    }
}

/// Intérprete que etiqueta su artefacto como si fuera una entidad.
pub struct MislabelingInterpreter {
    inner: ChartInterpreter,
}

impl MislabelingInterpreter {
    pub fn new() -> Self {
        Self { inner: ChartInterpreter::new() }
    }
}

#[async_trait]
impl Interpreter for MislabelingInterpreter {
    fn name(&self) -> &str {
        "mislabeling"
    }

    async fn interpret(&self, result: &CalculationResult, size: ArtifactSize) -> Result<Envelope, StageError> {
        let mut env = self.inner.interpret(result, size).await?;
        env.kind = PayloadKind::ResolvedEntity;
        Ok(env)
    }
}
