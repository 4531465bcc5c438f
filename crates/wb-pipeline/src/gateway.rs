//! Servicio gateway: expone el orquestador por HTTP.
//!
//! - `POST /pipeline {term, parameters, width?, height?}` ejecuta un run y
//!   responde con su estado terminal. Si el cliente se desconecta antes, el
//!   run se cancela.
//! - `POST /runs` acepta el mismo cuerpo, lanza el run y responde `202` con
//!   el resumen inicial; el cliente consulta `GET /runs/:id`.
//! - `GET /runs/:id` devuelve el resumen del run.
//! - `POST /runs/:id/cancel` lo cancela.
//! - `POST /runs/:id/retry` reanuda un run fallido por disponibilidad.
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use uuid::Uuid;
use wb_core::ErrorCode;
use wb_services::wire::{ErrorBody, HealthBody};

use crate::engine::Orchestrator;
use crate::errors::OrchestratorError;
use crate::request::PipelineRequest;
use crate::summary::RunSummary;

pub struct GatewayError(StatusCode, ErrorBody);

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.0, Json(self.1)).into_response()
    }
}

impl From<JsonRejection> for GatewayError {
    fn from(e: JsonRejection) -> Self {
        GatewayError(StatusCode::BAD_REQUEST, ErrorBody::new(ErrorCode::InvalidParameter, e.body_text()))
    }
}

impl From<OrchestratorError> for GatewayError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::UnknownRun(id) => {
                GatewayError(StatusCode::NOT_FOUND, ErrorBody::new(ErrorCode::NotFound, format!("unknown run {id}")))
            }
            OrchestratorError::NotRetriable(id) => {
                GatewayError(StatusCode::CONFLICT,
                             ErrorBody::new(ErrorCode::InvalidParameter, format!("run {id} cannot be retried")))
            }
            OrchestratorError::InvalidRequest(message) => {
                GatewayError(StatusCode::BAD_REQUEST, ErrorBody::new(ErrorCode::InvalidParameter, message))
            }
            other => {
                tracing::error!(error = %other, "gateway failure");
                GatewayError(StatusCode::INTERNAL_SERVER_ERROR, ErrorBody::new(ErrorCode::Internal, "internal error"))
            }
        }
    }
}

pub fn gateway_router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new().route("/", get(|| async { Json(HealthBody::operational("Gateway Service")) }))
                 .route("/pipeline", post(run_pipeline))
                 .route("/runs", post(submit_run))
                 .route("/runs/:id", get(get_run))
                 .route("/runs/:id/cancel", post(cancel_run))
                 .route("/runs/:id/retry", post(retry_run))
                 .layer(TraceLayer::new_for_http())
                 .with_state(orchestrator)
}

async fn run_pipeline(State(orchestrator): State<Arc<Orchestrator>>,
                      body: Result<Json<PipelineRequest>, JsonRejection>)
                      -> Result<Json<RunSummary>, GatewayError> {
    let Json(request) = body?;
    let handle = orchestrator.submit(request)?;
    let guard = CancelOnDrop { orchestrator: Arc::clone(&orchestrator),
                               run_id: Some(handle.run_id()) };
    let run = handle.wait().await;
    guard.disarm();
    Ok(Json(RunSummary::from_run(&run?)))
}

async fn submit_run(State(orchestrator): State<Arc<Orchestrator>>,
                    body: Result<Json<PipelineRequest>, JsonRejection>)
                    -> Result<(StatusCode, Json<RunSummary>), GatewayError> {
    let Json(request) = body?;
    let run_id = orchestrator.submit(request)?.run_id();
    let summary = orchestrator.summary(run_id).ok_or(OrchestratorError::UnknownRun(run_id))?;
    Ok((StatusCode::ACCEPTED, Json(summary)))
}

/// Cancela el run si el handler se abandona antes de que termine.
struct CancelOnDrop {
    orchestrator: Arc<Orchestrator>,
    run_id: Option<Uuid>,
}

impl CancelOnDrop {
    fn disarm(mut self) {
        self.run_id = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(run_id) = self.run_id.take() {
            match self.orchestrator.cancel(run_id) {
                Ok(true) => tracing::info!(%run_id, "client went away, run cancelled"),
                Ok(false) => {}
                Err(e) => tracing::warn!(%run_id, error = %e, "cannot cancel abandoned run"),
            }
        }
    }
}

async fn get_run(State(orchestrator): State<Arc<Orchestrator>>,
                 Path(id): Path<Uuid>)
                 -> Result<Json<RunSummary>, GatewayError> {
    orchestrator.summary(id)
                .map(Json)
                .ok_or_else(|| OrchestratorError::UnknownRun(id).into())
}

async fn cancel_run(State(orchestrator): State<Arc<Orchestrator>>,
                    Path(id): Path<Uuid>)
                    -> Result<Json<RunSummary>, GatewayError> {
    orchestrator.cancel(id)?;
    orchestrator.summary(id)
                .map(Json)
                .ok_or_else(|| OrchestratorError::UnknownRun(id).into())
}

async fn retry_run(State(orchestrator): State<Arc<Orchestrator>>,
                   Path(id): Path<Uuid>)
                   -> Result<Json<RunSummary>, GatewayError> {
    let run = orchestrator.retry_run(id)?.wait().await?;
    Ok(Json(RunSummary::from_run(&run)))
}
