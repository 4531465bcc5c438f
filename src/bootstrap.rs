//! Ensamblado de componentes a partir de `AppConfig`.
//!
//! - `local_orchestrator`: las tres etapas en proceso.
//! - `remote_orchestrator`: clientes HTTP hacia los microservicios.
//! - `service_router` + `serve`: cada servicio como proceso independiente.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tracing::{debug, info};
use wb_domain::{DomainError, InMemoryKnowledgeBase, KnowledgeBase};
use wb_pipeline::gateway::gateway_router;
use wb_pipeline::{Orchestrator, OrchestratorBuilder, OrchestratorError};
use wb_services::server::{calculation_router, interpretation_router, lexicon_router, InterpretationState};
use wb_services::{ChartInterpreter, ClientError, HttpCalculator, HttpInterpreter, HttpResolver, HttpStageClient,
                  KernelCalculator, KnowledgeBaseResolver};

use crate::config::{AppConfig, ConfigError, ServiceEndpoints};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("knowledge base: {0}")]
    KnowledgeBase(#[from] DomainError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Lexicon,
    Calculation,
    Interpretation,
    Gateway,
}

/// KB desde `WORKBENCH_KB_PATH` o la semilla incorporada.
pub fn load_knowledge_base(config: &AppConfig) -> Result<Arc<dyn KnowledgeBase>, BootstrapError> {
    let kb = match &config.kb_path {
        Some(path) => {
            let kb = InMemoryKnowledgeBase::from_path(path)?;
            info!(path = %path.display(), entries = kb.len(), version = kb.version(), "knowledge base loaded");
            kb
        }
        None => InMemoryKnowledgeBase::seed(),
    };
    Ok(Arc::new(kb))
}

fn configured(config: &AppConfig) -> OrchestratorBuilder {
    Orchestrator::builder().policy(config.stage)
                           .artifact_size(config.artifact_size)
                           .retention(config.retention)
}

pub fn local_orchestrator(config: &AppConfig, kb: Arc<dyn KnowledgeBase>) -> Result<Orchestrator, BootstrapError> {
    let kb_version = kb.version().to_string();
    let orchestrator = configured(config).resolver(Arc::new(KnowledgeBaseResolver::new(kb)))
                                         .calculator(Arc::new(KernelCalculator::molar_mass()))
                                         .interpreter(Arc::new(ChartInterpreter::new()))
                                         .kb_version(kb_version)
                                         .build()?;
    Ok(orchestrator)
}

pub fn remote_orchestrator(config: &AppConfig, endpoints: &ServiceEndpoints) -> Result<Orchestrator, BootstrapError> {
    let resolver = HttpResolver::new(HttpStageClient::new(endpoints.lexicon.clone())?);
    let calculator = HttpCalculator::new(HttpStageClient::new(endpoints.calculation.clone())?);
    let interpreter = HttpInterpreter::new(HttpStageClient::new(endpoints.interpretation.clone())?);
    info!(lexicon = %endpoints.lexicon,
          calculation = %endpoints.calculation,
          interpretation = %endpoints.interpretation,
          "remote stages configured");
    Ok(configured(config).resolver(Arc::new(resolver))
                         .calculator(Arc::new(calculator))
                         .interpreter(Arc::new(interpreter))
                         .build()?)
}

/// Orquestador remoto si hay endpoints configurados, local si no.
pub fn orchestrator(config: &AppConfig) -> Result<Orchestrator, BootstrapError> {
    match &config.endpoints {
        Some(endpoints) => remote_orchestrator(config, endpoints),
        None => local_orchestrator(config, load_knowledge_base(config)?),
    }
}

pub fn service_router(service: Service, config: &AppConfig) -> Result<Router, BootstrapError> {
    let router = match service {
        Service::Lexicon => lexicon_router(Arc::new(KnowledgeBaseResolver::new(load_knowledge_base(config)?))),
        Service::Calculation => calculation_router(Arc::new(KernelCalculator::molar_mass())),
        Service::Interpretation => {
            interpretation_router(InterpretationState { interpreter: Arc::new(ChartInterpreter::new()),
                                                        default_size: config.artifact_size })
        }
        Service::Gateway => {
            let orchestrator = Arc::new(orchestrator(config)?);
            spawn_pruner(Arc::clone(&orchestrator), Duration::from_secs(60));
            gateway_router(orchestrator)
        }
    };
    Ok(router)
}

/// Purga periódica de runs terminales fuera de la ventana de retención.
pub fn spawn_pruner(orchestrator: Arc<Orchestrator>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let pruned = orchestrator.prune_runs();
            debug!(pruned, "retention sweep");
        }
    })
}

pub async fn serve(service: Service, router: Router, port: u16) -> Result<(), BootstrapError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(?service, %addr, "listening");
    axum::serve(listener, router).await?;
    Ok(())
}
