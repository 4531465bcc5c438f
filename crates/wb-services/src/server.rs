//! Routers axum de los tres microservicios.
//!
//! Códigos de estado:
//! - 200 con el `Envelope` de salida.
//! - 400 con `{"error": {...}}` para NOT_FOUND, AMBIGUOUS, INVALID_PARAMETER,
//!   COMPUTATION_ERROR, RENDER_ERROR y SCHEMA_MISMATCH.
//! - 404 para `GET /entities/:id` inexistente.
//! - 503 para fallos de disponibilidad; 500 genérico para lo inesperado.
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use wb_core::constants::WIRE_SCHEMA_VERSION;
use wb_core::{Envelope, ErrorCode, StageError, StagePayload};
use wb_domain::{ArtifactSize, CalculationRequest, CalculationResult, Definition, DomainError, KbEntry,
                ResolvedEntity, Term};

use crate::calculator::KernelCalculator;
use crate::contracts::{Calculator, Interpreter, LexiconResolver};
use crate::interpreter::{describe, ChartInterpreter};
use crate::lexicon::KnowledgeBaseResolver;
use crate::wire::{CalculateRequest, DescribeRequest, ErrorBody, HealthBody, InterpretRequest, ResolveRequest,
                  VersionBody};

#[derive(Debug)]
pub enum ApiError {
    Stage(StageError),
    /// Cuerpo o sobre que no cumple el esquema esperado.
    Contract(String),
    Missing(String),
}

impl From<StageError> for ApiError {
    fn from(e: StageError) -> Self {
        ApiError::Stage(e)
    }
}

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        ApiError::Stage(e.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::Contract(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Missing(message) => (StatusCode::NOT_FOUND, ErrorBody::new(ErrorCode::NotFound, message)),
            ApiError::Contract(message) => {
                (StatusCode::BAD_REQUEST, ErrorBody::new(ErrorCode::SchemaMismatch, message))
            }
            ApiError::Stage(err) => match err.code() {
                ErrorCode::Timeout | ErrorCode::Unavailable => {
                    (StatusCode::SERVICE_UNAVAILABLE, ErrorBody::new(err.code(), err.to_string()))
                }
                ErrorCode::Internal => {
                    tracing::error!(error = %err, "unexpected failure");
                    (StatusCode::INTERNAL_SERVER_ERROR,
                     ErrorBody::new(ErrorCode::Internal, "internal error"))
                }
                code => {
                    if code == ErrorCode::RenderError {
                        tracing::error!(error = %err, "render contract violated");
                    }
                    let message = match err {
                        StageError::Rejected { message, .. } => message,
                        other => other.to_string(),
                    };
                    (StatusCode::BAD_REQUEST, ErrorBody::new(code, message))
                }
            },
        };
        (status, Json(body)).into_response()
    }
}

fn check_schema(found: Option<u32>) -> Result<(), ApiError> {
    match found {
        Some(v) if v == WIRE_SCHEMA_VERSION => Ok(()),
        other => Err(ApiError::Stage(StageError::SchemaMismatch { expected: WIRE_SCHEMA_VERSION,
                                                                  found: other })),
    }
}

fn decode<T: StagePayload>(env: &Envelope) -> Result<T, ApiError> {
    T::from_envelope(env).map_err(|e| match e {
                             wb_core::EnvelopeError::VersionMismatch { expected, found } => {
                                 ApiError::Stage(StageError::SchemaMismatch { expected,
                                                                              found: Some(found) })
                             }
                             other => ApiError::Contract(other.to_string()),
                         })
}

// ---------------- lexicon ----------------

pub fn lexicon_router(resolver: Arc<KnowledgeBaseResolver>) -> Router {
    Router::new().route("/", get(|| async { Json(HealthBody::operational("Lexicon Service")) }))
                 .route("/version", get(lexicon_version))
                 .route("/resolve", post(lexicon_resolve))
                 .route("/entities", get(lexicon_entities))
                 .route("/entities/:id", get(lexicon_entity))
                 .layer(TraceLayer::new_for_http())
                 .with_state(resolver)
}

async fn lexicon_version(State(resolver): State<Arc<KnowledgeBaseResolver>>) -> Json<VersionBody> {
    Json(VersionBody { kb_version: resolver.version().to_string() })
}

async fn lexicon_resolve(State(resolver): State<Arc<KnowledgeBaseResolver>>,
                         body: Result<Json<ResolveRequest>, JsonRejection>)
                         -> Result<Json<Envelope>, ApiError> {
    let Json(req) = body?;
    check_schema(req.schema_version)?;
    let term = Term::new(&req.term)?;
    Ok(Json(resolver.resolve(&term).await?))
}

async fn lexicon_entities(State(resolver): State<Arc<KnowledgeBaseResolver>>) -> Json<Vec<KbEntry>> {
    Json(resolver.catalogue())
}

async fn lexicon_entity(State(resolver): State<Arc<KnowledgeBaseResolver>>,
                        Path(id): Path<String>)
                        -> Result<Json<KbEntry>, ApiError> {
    resolver.entry(&id)
            .map(Json)
            .ok_or_else(|| ApiError::Missing(format!("no entity with id '{id}'")))
}

// ---------------- calculation ----------------

pub fn calculation_router(calculator: Arc<KernelCalculator>) -> Router {
    Router::new().route("/", get(|| async { Json(HealthBody::operational("Calculation Service")) }))
                 .route("/calculate", post(calculation_calculate))
                 .layer(TraceLayer::new_for_http())
                 .with_state(calculator)
}

async fn calculation_calculate(State(calculator): State<Arc<KernelCalculator>>,
                               body: Result<Json<CalculateRequest>, JsonRejection>)
                               -> Result<Json<Envelope>, ApiError> {
    let Json(req) = body?;
    check_schema(req.schema_version)?;
    let entities = req.resolved_entities
                      .iter()
                      .map(decode::<ResolvedEntity>)
                      .collect::<Result<Vec<_>, _>>()?;
    let request = CalculationRequest::new(entities, req.parameters)?;
    Ok(Json(calculator.calculate(&request).await?))
}

// ---------------- interpretation ----------------

#[derive(Clone)]
pub struct InterpretationState {
    pub interpreter: Arc<ChartInterpreter>,
    pub default_size: ArtifactSize,
}

pub fn interpretation_router(state: InterpretationState) -> Router {
    Router::new().route("/", get(|| async { Json(HealthBody::operational("Interpretation Service")) }))
                 .route("/interpret", post(interpretation_interpret))
                 .route("/describe", post(interpretation_describe))
                 .layer(TraceLayer::new_for_http())
                 .with_state(state)
}

async fn interpretation_interpret(State(state): State<InterpretationState>,
                                  body: Result<Json<InterpretRequest>, JsonRejection>)
                                  -> Result<Json<Envelope>, ApiError> {
    let Json(req) = body?;
    check_schema(req.schema_version)?;
    let result: CalculationResult = decode(&req.calculation_result)?;
    let size = ArtifactSize::new(req.width.unwrap_or(state.default_size.width),
                                 req.height.unwrap_or(state.default_size.height))?;
    Ok(Json(state.interpreter.interpret(&result, size).await?))
}

async fn interpretation_describe(body: Result<Json<DescribeRequest>, JsonRejection>)
                                 -> Result<Json<Definition>, ApiError> {
    let Json(req) = body?;
    check_schema(req.schema_version)?;
    let entity: ResolvedEntity = decode(&req.entity)?;
    Ok(Json(describe(&entity)))
}
