//! Implementaciones HTTP de los contratos de etapa.
//!
//! Mapeo de respuestas:
//! - error de conexión -> `StageError::Transport`
//! - 200 -> `Envelope`
//! - 400 con código conocido -> `StageError::Rejected` (SCHEMA_MISMATCH ->
//!   `StageError::SchemaMismatch`)
//! - cualquier otro estado o cuerpo ilegible -> `StageError::Transport`
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use url::Url;
use wb_core::constants::WIRE_SCHEMA_VERSION;
use wb_core::{Envelope, ErrorCode, StageError, StagePayload};
use wb_domain::{ArtifactSize, CalculationRequest, CalculationResult, Term};

use crate::contracts::{Calculator, Interpreter, LexiconResolver};
use crate::wire::{CalculateRequest, ErrorBody, InterpretRequest, ResolveRequest, VersionBody};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid endpoint '{0}': must be an absolute http(s) URL")]
    InvalidEndpoint(String),
    #[error("cannot build http client: {0}")]
    Build(String),
}

#[derive(Clone)]
pub struct HttpStageClient {
    http: reqwest::Client,
    base: Url,
}

impl HttpStageClient {
    /// `base` se trata siempre como directorio: `http://gw/lexicon` y
    /// `http://gw/lexicon/` resuelven `resolve` a `http://gw/lexicon/resolve`.
    pub fn new(mut base: Url) -> Result<Self, ClientError> {
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(ClientError::InvalidEndpoint(base.to_string()));
        }
        if !base.path().ends_with('/') {
            let raw = base.to_string();
            base.path_segments_mut()
                .map_err(|_| ClientError::InvalidEndpoint(raw))?
                .push("");
        }
        let http = reqwest::Client::builder().build()
                                             .map_err(|e| ClientError::Build(e.to_string()))?;
        Ok(Self { http, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, StageError> {
        self.base
            .join(path)
            .map_err(|e| StageError::Transport(format!("bad endpoint {path}: {e}")))
    }

    pub async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<Envelope, StageError> {
        let url = self.endpoint(path)?;
        let resp = self.http
                       .post(url)
                       .json(body)
                       .send()
                       .await
                       .map_err(|e| StageError::Transport(e.to_string()))?;
        read_response(resp).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, StageError> {
        let url = self.endpoint(path)?;
        let resp = self.http
                       .get(url)
                       .send()
                       .await
                       .map_err(|e| StageError::Transport(e.to_string()))?;
        if resp.status() != StatusCode::OK {
            return Err(StageError::Transport(format!("unexpected status {}", resp.status())));
        }
        resp.json::<T>().await.map_err(|e| StageError::Transport(e.to_string()))
    }
}

async fn read_response(resp: reqwest::Response) -> Result<Envelope, StageError> {
    let status = resp.status();
    if status == StatusCode::OK {
        return resp.json::<Envelope>()
                   .await
                   .map_err(|e| StageError::Transport(format!("malformed envelope: {e}")));
    }
    if status == StatusCode::BAD_REQUEST {
        let body = resp.json::<ErrorBody>()
                       .await
                       .map_err(|e| StageError::Transport(format!("malformed error body: {e}")))?;
        return Err(match ErrorCode::from_wire(&body.error.code) {
                       Some(ErrorCode::SchemaMismatch) => StageError::SchemaMismatch { expected: WIRE_SCHEMA_VERSION,
                                                                                        found: None },
                       Some(code) => StageError::rejected(code, body.error.message),
                       None => StageError::Transport(format!("unknown error code {}", body.error.code)),
                   });
    }
    Err(StageError::Transport(format!("unexpected status {status}")))
}

#[derive(Clone)]
pub struct HttpResolver {
    client: HttpStageClient,
}

impl HttpResolver {
    pub fn new(client: HttpStageClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LexiconResolver for HttpResolver {
    fn name(&self) -> &str {
        "http-lexicon"
    }

    async fn kb_version(&self) -> Result<String, StageError> {
        let body: VersionBody = self.client.get_json("version").await?;
        Ok(body.kb_version)
    }

    async fn resolve(&self, term: &Term) -> Result<Envelope, StageError> {
        self.client.post("resolve", &ResolveRequest::new(term.raw())).await
    }
}

#[derive(Clone)]
pub struct HttpCalculator {
    client: HttpStageClient,
}

impl HttpCalculator {
    pub fn new(client: HttpStageClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Calculator for HttpCalculator {
    fn name(&self) -> &str {
        "http-calculation"
    }

    async fn calculate(&self, request: &CalculationRequest) -> Result<Envelope, StageError> {
        let entities = request.entities()
                              .iter()
                              .map(|e| e.to_envelope())
                              .collect::<Result<Vec<_>, _>>()?;
        let body = CalculateRequest::new(entities, request.parameters().clone());
        self.client.post("calculate", &body).await
    }
}

#[derive(Clone)]
pub struct HttpInterpreter {
    client: HttpStageClient,
}

impl HttpInterpreter {
    pub fn new(client: HttpStageClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Interpreter for HttpInterpreter {
    fn name(&self) -> &str {
        "http-interpretation"
    }

    async fn interpret(&self, result: &CalculationResult, size: ArtifactSize) -> Result<Envelope, StageError> {
        let body = InterpretRequest::new(result.to_envelope()?, Some(size.width), Some(size.height));
        self.client.post("interpret", &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_http_endpoints_are_accepted() {
        assert!(HttpStageClient::new(Url::parse("http://127.0.0.1:8000").unwrap()).is_ok());
        assert!(matches!(HttpStageClient::new(Url::parse("ftp://host/").unwrap()),
                         Err(ClientError::InvalidEndpoint(_))));
    }

    #[test]
    fn paths_join_onto_base() {
        let client = HttpStageClient::new(Url::parse("http://lexicon:8000/").unwrap()).unwrap();
        assert_eq!(client.endpoint("resolve").unwrap().as_str(), "http://lexicon:8000/resolve");
    }

    #[test]
    fn base_path_is_kept_when_joining() {
        let client = HttpStageClient::new(Url::parse("http://gw/lexicon").unwrap()).unwrap();
        assert_eq!(client.endpoint("resolve").unwrap().as_str(), "http://gw/lexicon/resolve");
        let client = HttpStageClient::new(Url::parse("http://gw/lexicon/").unwrap()).unwrap();
        assert_eq!(client.endpoint("version").unwrap().as_str(), "http://gw/lexicon/version");
    }
}
