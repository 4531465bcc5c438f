//! Implementación del `Orchestrator`.
//!
//! Un run avanza Submitted -> Resolving -> Resolved -> Calculating ->
//! Calculated -> Interpreting -> Completed, registrando cada transición como
//! evento en el `RunStore`. Reglas:
//! - una etapa con output registrado no se vuelve a invocar;
//! - el output de cada etapa se decodifica antes de cachearlo o registrarlo;
//! - cada intento está acotado por `StagePolicy::timeout`;
//! - timeouts y fallos de transporte se reintentan con backoff hasta
//!   `max_attempts`; los errores de validación, cómputo y render no;
//! - toda espera es cancelable mediante el `CancellationToken` del run. Una
//!   llamada en vuelo se abandona y su resultado se descarta.

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;
use wb_core::hashing::hash_value;
use wb_core::{get_or_compute, CacheKey, CoreError, Envelope, ErrorKind, FailureReason, PipelineRun, RunEvent,
              RunEventKind, RunStore, Stage, StageCache, StageError, StagePayload};
use wb_domain::{ArtifactSize, CalculationRequest, CalculationResult, RenderedArtifact, ResolvedEntity, Term};
use wb_services::{Calculator, Interpreter, LexiconResolver};

use super::{OrchestratorBuilder, RunHandle};
use crate::errors::OrchestratorError;
use crate::policy::StagePolicy;
use crate::request::PipelineRequest;
use crate::summary::RunSummary;

pub struct Orchestrator {
    pub(crate) resolver: Arc<dyn LexiconResolver>,
    pub(crate) calculator: Arc<dyn Calculator>,
    pub(crate) interpreter: Arc<dyn Interpreter>,
    pub(crate) cache: Arc<dyn StageCache>,
    pub(crate) runs: Arc<dyn RunStore>,
    pub(crate) policy: StagePolicy,
    pub(crate) artifact_size: ArtifactSize,
    pub(crate) retention: Duration,
    pub(crate) kb_version: RwLock<Option<String>>,
    pub(crate) active: DashMap<Uuid, CancellationToken>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    // ---------------- API pública ----------------

    /// Ejecuta un run en la tarea actual hasta su estado terminal.
    pub async fn run(&self, request: PipelineRequest) -> Result<PipelineRun, OrchestratorError> {
        let run_id = self.admit(&request)?;
        let token = self.track(run_id);
        self.drive(run_id, token).await
    }

    /// Lanza el run como tarea tokio independiente.
    pub fn submit(self: &Arc<Self>, request: PipelineRequest) -> Result<RunHandle, OrchestratorError> {
        let run_id = self.admit(&request)?;
        Ok(self.spawn(run_id))
    }

    /// Reabre un run fallido por disponibilidad y lo relanza. Las etapas con
    /// output registrado se reutilizan.
    pub fn retry_run(self: &Arc<Self>, run_id: Uuid) -> Result<RunHandle, OrchestratorError> {
        if self.active.contains_key(&run_id) {
            return Err(OrchestratorError::NotRetriable(run_id));
        }
        match self.runs.append(run_id, RunEventKind::RunReopened) {
            Ok(_) => {}
            Err(CoreError::NotRetriable) => return Err(OrchestratorError::NotRetriable(run_id)),
            Err(e) => return Err(e.into()),
        }
        info!(%run_id, "run reopened");
        Ok(self.spawn(run_id))
    }

    /// Cancela un run no terminal. Devuelve false si ya era terminal.
    pub fn cancel(&self, run_id: Uuid) -> Result<bool, OrchestratorError> {
        let run = self.runs.snapshot(run_id).ok_or(OrchestratorError::UnknownRun(run_id))?;
        if run.state.is_terminal() {
            return Ok(false);
        }
        let recorded = self.record(run_id,
                                   RunEventKind::RunCancelled { stage: run.state.active_stage() })?;
        if let Some(token) = self.active.get(&run_id) {
            token.cancel();
        }
        if recorded {
            info!(%run_id, state = %run.state, "run cancelled");
        }
        Ok(recorded)
    }

    pub fn run_snapshot(&self, run_id: Uuid) -> Option<PipelineRun> {
        self.runs.snapshot(run_id)
    }

    pub fn run_events(&self, run_id: Uuid) -> Vec<RunEvent> {
        self.runs.events(run_id)
    }

    pub fn summary(&self, run_id: Uuid) -> Option<RunSummary> {
        self.runs.snapshot(run_id).map(|run| RunSummary::from_run(&run))
    }

    pub fn is_active(&self, run_id: Uuid) -> bool {
        self.active.contains_key(&run_id)
    }

    pub fn cache(&self) -> &Arc<dyn StageCache> {
        &self.cache
    }

    /// Elimina los runs terminales más antiguos que la ventana de retención.
    pub fn prune_runs(&self) -> usize {
        let Ok(window) = chrono::Duration::from_std(self.retention) else {
            return 0;
        };
        let pruned = self.runs.prune_terminal_before(Utc::now() - window);
        if pruned > 0 {
            info!(pruned, "terminal runs pruned");
        }
        pruned
    }

    pub fn kb_version(&self) -> Option<String> {
        self.kb_version.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Fija una nueva versión de KB e invalida las entradas de caché de la
    /// anterior. Devuelve cuántas entradas se eliminaron.
    pub fn bump_kb_version(&self, version: impl Into<String>) -> usize {
        let version = version.into();
        let previous = {
            let mut guard = self.kb_version.write().unwrap_or_else(|e| e.into_inner());
            guard.replace(version.clone())
        };
        match previous {
            Some(old) if old != version => {
                let dropped = self.cache.invalidate_kb_version(&old);
                info!(old = %old, new = %version, dropped, "knowledge base version bumped");
                dropped
            }
            _ => 0,
        }
    }

    /// Consulta la versión actual al resolver y la adopta si cambió.
    pub async fn refresh_kb_version(&self) -> Result<String, OrchestratorError> {
        let version = tokio::time::timeout(self.policy.timeout, self.resolver.kb_version())
            .await
            .map_err(|_| StageError::Transport("kb version lookup timed out".into()))??;
        self.bump_kb_version(version.clone());
        Ok(version)
    }

    // ---------------- ciclo de vida ----------------

    fn admit(&self, request: &PipelineRequest) -> Result<Uuid, OrchestratorError> {
        request.artifact_size(self.artifact_size)
               .map_err(|e| OrchestratorError::InvalidRequest(e.to_string()))?;
        let run_id = Uuid::new_v4();
        self.runs.append(run_id,
                         RunEventKind::RunSubmitted { term: request.term.clone(),
                                                      request: serde_json::to_value(request)? })?;
        info!(%run_id, term = %request.term, "run submitted");
        Ok(run_id)
    }

    fn track(&self, run_id: Uuid) -> CancellationToken {
        let token = CancellationToken::new();
        self.active.insert(run_id, token.clone());
        token
    }

    fn spawn(self: &Arc<Self>, run_id: Uuid) -> RunHandle {
        let token = self.track(run_id);
        let this = Arc::clone(self);
        RunHandle::new(run_id, tokio::spawn(async move { this.drive(run_id, token).await }))
    }

    async fn drive(&self, run_id: Uuid, token: CancellationToken) -> Result<PipelineRun, OrchestratorError> {
        let outcome = self.advance(run_id, &token).await;
        self.active.remove(&run_id);
        outcome?;
        let run = self.runs.snapshot(run_id).ok_or(OrchestratorError::UnknownRun(run_id))?;
        info!(%run_id, state = %run.state, "run settled");
        Ok(run)
    }

    async fn advance(&self, run_id: Uuid, token: &CancellationToken) -> Result<(), OrchestratorError> {
        let run = self.runs.snapshot(run_id).ok_or(OrchestratorError::UnknownRun(run_id))?;
        let request: PipelineRequest = serde_json::from_value(run.request.clone())?;

        // resolve
        let entity_env = match run.output(Stage::Resolve) {
            Some(env) => env.clone(),
            None => {
                let term = match Term::new(&request.term) {
                    Ok(term) => term,
                    Err(e) => return self.fail(run_id, Stage::Resolve, StageError::from(e).into()),
                };
                if !self.start(run_id, Stage::Resolve, token)? {
                    return Ok(());
                }
                let kb_version = match guarded(token, self.kb_version_for(run_id)).await {
                    None => return self.halt_cancelled(run_id, Some(Stage::Resolve)),
                    Some(Err(reason)) => return self.fail(run_id, Stage::Resolve, reason),
                    Some(Ok(version)) => version,
                };
                let key = CacheKey::new(Stage::Resolve, kb_version, &json!({ "term": term.normalized() }));
                let resolver = &self.resolver;
                let term = &term;
                let op = move || resolver.resolve(term);
                match self.execute::<ResolvedEntity, _, _>(run_id, Stage::Resolve, key, token, op).await? {
                    Some(env) => env,
                    None => return Ok(()),
                }
            }
        };

        // calculate
        let result_env = match run.output(Stage::Calculate) {
            Some(env) => env.clone(),
            None => {
                let calc_request = match calculation_request(&entity_env, &request) {
                    Ok(r) => r,
                    Err(e) => return self.fail(run_id, Stage::Calculate, e.into()),
                };
                if !self.start(run_id, Stage::Calculate, token)? {
                    return Ok(());
                }
                let key = CacheKey::new(Stage::Calculate, calc_request.kb_version(), &calc_request.cache_material());
                let calculator = &self.calculator;
                let calc_request = &calc_request;
                let op = move || calculator.calculate(calc_request);
                match self.execute::<CalculationResult, _, _>(run_id, Stage::Calculate, key, token, op).await? {
                    Some(env) => env,
                    None => return Ok(()),
                }
            }
        };

        // interpret
        let artifact_env = match run.output(Stage::Interpret) {
            Some(env) => env.clone(),
            None => {
                let (result, size) = match self.interpretation_input(&result_env, &request) {
                    Ok(input) => input,
                    Err(e) => return self.fail(run_id, Stage::Interpret, e.into()),
                };
                if !self.start(run_id, Stage::Interpret, token)? {
                    return Ok(());
                }
                let material = json!({
                    "source_hash": result.provenance_hash(),
                    "width": size.width,
                    "height": size.height,
                });
                let key = CacheKey::new(Stage::Interpret, result.provenance.kb_version.clone(), &material);
                let interpreter = &self.interpreter;
                let result = &result;
                let op = move || interpreter.interpret(result, size);
                match self.execute::<RenderedArtifact, _, _>(run_id, Stage::Interpret, key, token, op).await? {
                    Some(env) => env,
                    None => return Ok(()),
                }
            }
        };

        let run_fingerprint = hash_value(&json!([entity_env.hash, result_env.hash, artifact_env.hash]));
        if self.record(run_id, RunEventKind::RunCompleted { run_fingerprint })? {
            info!(%run_id, "run completed");
        }
        Ok(())
    }

    fn interpretation_input(&self,
                            result_env: &Envelope,
                            request: &PipelineRequest)
                            -> Result<(CalculationResult, ArtifactSize), StageError> {
        let result = CalculationResult::from_envelope(result_env)?;
        let size = request.artifact_size(self.artifact_size)?;
        Ok((result, size))
    }

    // ---------------- etapas ----------------

    /// Registra `StageStarted` salvo que el run esté cancelado o ya terminal.
    fn start(&self, run_id: Uuid, stage: Stage, token: &CancellationToken) -> Result<bool, OrchestratorError> {
        if token.is_cancelled() {
            self.halt_cancelled(run_id, None)?;
            return Ok(false);
        }
        let started = self.record(run_id, RunEventKind::StageStarted { stage })?;
        if started {
            info!(%run_id, stage = %stage, "stage started");
        }
        Ok(started)
    }

    /// Obtiene el output de la etapa desde la caché o ejecutando `op` con
    /// timeout y reintentos. `None` si el run terminó (fallo o cancelación).
    ///
    /// El sobre devuelto se decodifica como `P` antes de entrar en la caché:
    /// un tipo, versión o hash incorrectos cuentan como fallo de esta etapa.
    async fn execute<P, F, Fut>(&self,
                             run_id: Uuid,
                             stage: Stage,
                             key: CacheKey,
                             token: &CancellationToken,
                             op: F)
                             -> Result<Option<Envelope>, OrchestratorError>
        where P: StagePayload,
              F: Fn() -> Fut,
              Fut: Future<Output = Result<Envelope, StageError>>
    {
        let op = &op;
        let checked = move || {
            async move {
                let output = op().await?;
                P::from_envelope(&output)?;
                Ok::<Envelope, StageError>(output)
            }
        };
        let computed =
            guarded(token, get_or_compute(self.cache.as_ref(), &key, || self.attempts(run_id, stage, &checked))).await;
        let (output, cached) = match computed {
            None => {
                self.halt_cancelled(run_id, Some(stage))?;
                return Ok(None);
            }
            Some(Err(reason)) => {
                self.fail(run_id, stage, reason)?;
                return Ok(None);
            }
            Some(Ok(hit)) => hit,
        };
        if token.is_cancelled() {
            self.halt_cancelled(run_id, Some(stage))?;
            return Ok(None);
        }
        let recorded = self.record(run_id,
                                   RunEventKind::StageFinished { stage,
                                                                 output: output.clone(),
                                                                 fingerprint: key.fingerprint.clone(),
                                                                 cached })?;
        if !recorded {
            return Ok(None);
        }
        info!(%run_id, stage = %stage, cached, "stage finished");
        Ok(Some(output))
    }

    /// Bucle de intentos de una etapa.
    async fn attempts<T, F, Fut>(&self, run_id: Uuid, stage: Stage, op: &F) -> Result<T, FailureReason>
        where F: Fn() -> Fut,
              Fut: Future<Output = Result<T, StageError>>
    {
        let retry = self.policy.retry;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.record_attempt_event(run_id, RunEventKind::StageAttempted { stage, attempt })?;
            // None = el intento agotó el timeout.
            let last: Option<StageError> = match tokio::time::timeout(self.policy.timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) if !err.is_retriable() => return Err(err.into()),
                Ok(Err(err)) => Some(err),
                Err(_) => None,
            };
            if !retry.should_retry(attempt) {
                return Err(match last {
                               None => FailureReason::Timeout,
                               Some(err) => FailureReason::Unavailable { detail: err.to_string() },
                           });
            }
            let delay = retry.backoff(attempt - 1);
            let error = match last {
                None => format!("timed out after {}ms", self.policy.timeout.as_millis()),
                Some(err) => err.to_string(),
            };
            let delay_ms = delay.as_millis() as u64;
            warn!(%run_id, stage = %stage, attempt, delay_ms, error = %error, "stage attempt failed, retrying");
            self.record_attempt_event(run_id,
                                      RunEventKind::StageRetryScheduled { stage,
                                                                          attempt,
                                                                          delay_ms,
                                                                          error })?;
            tokio::time::sleep(delay).await;
        }
    }

    /// Registra un evento del bucle de intentos. Si el run ya no acepta
    /// eventos, los reintentos se cortan.
    fn record_attempt_event(&self, run_id: Uuid, kind: RunEventKind) -> Result<(), FailureReason> {
        match self.record(run_id, kind) {
            Ok(true) => Ok(()),
            Ok(false) => Err(FailureReason::Unavailable { detail: "run is no longer active".into() }),
            Err(e) => {
                error!(%run_id, error = %e, "attempt event rejected by run store");
                Err(FailureReason::Unavailable { detail: e.to_string() })
            }
        }
    }

    async fn kb_version_for(&self, run_id: Uuid) -> Result<String, FailureReason> {
        if let Some(version) = self.kb_version() {
            return Ok(version);
        }
        let resolver = &self.resolver;
        let version = self.attempts(run_id, Stage::Resolve, &move || resolver.kb_version()).await?;
        let mut guard = self.kb_version.write().unwrap_or_else(|e| e.into_inner());
        Ok(guard.get_or_insert(version).clone())
    }

    fn fail(&self, run_id: Uuid, stage: Stage, reason: FailureReason) -> Result<(), OrchestratorError> {
        match reason.kind() {
            ErrorKind::Render => error!(%run_id, stage = %stage, ?reason, "render contract violated"),
            ErrorKind::Availability => warn!(%run_id, stage = %stage, code = %reason.code(), "stage unavailable"),
            _ => info!(%run_id, stage = %stage, code = %reason.code(), "stage rejected input"),
        }
        self.record(run_id, RunEventKind::StageFailed { stage, reason })?;
        Ok(())
    }

    fn halt_cancelled(&self, run_id: Uuid, stage: Option<Stage>) -> Result<(), OrchestratorError> {
        self.record(run_id, RunEventKind::RunCancelled { stage })?;
        Ok(())
    }

    /// Agrega un evento. `Ok(false)` si el run ya era terminal y el evento se
    /// descartó.
    fn record(&self, run_id: Uuid, kind: RunEventKind) -> Result<bool, OrchestratorError> {
        match self.runs.append(run_id, kind) {
            Ok(_) => Ok(true),
            Err(CoreError::InvalidTransition { .. } | CoreError::StageAlreadyRecorded(_)) if self.is_terminal(run_id) => {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn is_terminal(&self, run_id: Uuid) -> bool {
        self.runs
            .snapshot(run_id)
            .map(|run| run.state.is_terminal())
            .unwrap_or(false)
    }
}

fn calculation_request(entity_env: &Envelope, request: &PipelineRequest) -> Result<CalculationRequest, StageError> {
    let entity = ResolvedEntity::from_envelope(entity_env)?;
    Ok(CalculationRequest::new(vec![entity], request.parameters.clone())?)
}

/// Corre `fut` salvo que el token se cancele antes. `None` = cancelado.
async fn guarded<T>(token: &CancellationToken, fut: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        value = fut => Some(value),
    }
}
