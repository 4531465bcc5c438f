//! Builder para `Orchestrator`.
//!
//! Las tres etapas son obligatorias; caché y run store son en memoria si no
//! se inyectan otros.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use wb_core::{InMemoryRunStore, InMemoryStageCache, RunStore, StageCache};
use wb_domain::ArtifactSize;
use wb_services::{Calculator, Interpreter, LexiconResolver};

use super::Orchestrator;
use crate::errors::OrchestratorError;
use crate::policy::StagePolicy;

pub struct OrchestratorBuilder {
    resolver: Option<Arc<dyn LexiconResolver>>,
    calculator: Option<Arc<dyn Calculator>>,
    interpreter: Option<Arc<dyn Interpreter>>,
    cache: Option<Arc<dyn StageCache>>,
    runs: Option<Arc<dyn RunStore>>,
    policy: StagePolicy,
    artifact_size: ArtifactSize,
    retention: Duration,
    kb_version: Option<String>,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self { resolver: None,
               calculator: None,
               interpreter: None,
               cache: None,
               runs: None,
               policy: StagePolicy::default(),
               artifact_size: ArtifactSize::default(),
               retention: Duration::from_secs(3600),
               kb_version: None }
    }
}

impl OrchestratorBuilder {
    pub fn resolver(mut self, resolver: Arc<dyn LexiconResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn calculator(mut self, calculator: Arc<dyn Calculator>) -> Self {
        self.calculator = Some(calculator);
        self
    }

    pub fn interpreter(mut self, interpreter: Arc<dyn Interpreter>) -> Self {
        self.interpreter = Some(interpreter);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn StageCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn run_store(mut self, runs: Arc<dyn RunStore>) -> Self {
        self.runs = Some(runs);
        self
    }

    pub fn policy(mut self, policy: StagePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn artifact_size(mut self, size: ArtifactSize) -> Self {
        self.artifact_size = size;
        self
    }

    /// Tiempo que un run terminal se conserva antes de `prune_runs`.
    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Versión de KB conocida de antemano. Sin ella se consulta al resolver
    /// en el primer run.
    pub fn kb_version(mut self, version: impl Into<String>) -> Self {
        self.kb_version = Some(version.into());
        self
    }

    pub fn build(self) -> Result<Orchestrator, OrchestratorError> {
        Ok(Orchestrator { resolver: self.resolver.ok_or(OrchestratorError::Missing("resolver"))?,
                          calculator: self.calculator.ok_or(OrchestratorError::Missing("calculator"))?,
                          interpreter: self.interpreter.ok_or(OrchestratorError::Missing("interpreter"))?,
                          cache: self.cache.unwrap_or_else(|| Arc::new(InMemoryStageCache::new())),
                          runs: self.runs.unwrap_or_else(|| Arc::new(InMemoryRunStore::new())),
                          policy: self.policy,
                          artifact_size: self.artifact_size,
                          retention: self.retention,
                          kb_version: RwLock::new(self.kb_version),
                          active: DashMap::new() })
    }
}
