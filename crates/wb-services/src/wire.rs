//! Cuerpos HTTP compartidos por los routers y los clientes.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use wb_core::constants::WIRE_SCHEMA_VERSION;
use wb_core::{Envelope, ErrorCode};

fn current_schema() -> Option<u32> {
    Some(WIRE_SCHEMA_VERSION)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    #[serde(default)]
    pub schema_version: Option<u32>,
    pub term: String,
}

impl ResolveRequest {
    pub fn new(term: impl Into<String>) -> Self {
        Self { schema_version: current_schema(),
               term: term.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculateRequest {
    #[serde(default)]
    pub schema_version: Option<u32>,
    pub resolved_entities: Vec<Envelope>,
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
}

impl CalculateRequest {
    pub fn new(resolved_entities: Vec<Envelope>, parameters: BTreeMap<String, f64>) -> Self {
        Self { schema_version: current_schema(),
               resolved_entities,
               parameters }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpretRequest {
    #[serde(default)]
    pub schema_version: Option<u32>,
    pub calculation_result: Envelope,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl InterpretRequest {
    pub fn new(calculation_result: Envelope, width: Option<u32>, height: Option<u32>) -> Self {
        Self { schema_version: current_schema(),
               calculation_result,
               width,
               height }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescribeRequest {
    #[serde(default)]
    pub schema_version: Option<u32>,
    pub entity: Envelope,
}

impl DescribeRequest {
    pub fn new(entity: Envelope) -> Self {
        Self { schema_version: current_schema(),
               entity }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// `{"error": {"code": ..., "message": ...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { error: ErrorDetail { code: code.as_str().to_string(),
                                    message: message.into() } }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthBody {
    pub status: String,
}

impl HealthBody {
    pub fn operational(service: &str) -> Self {
        Self { status: format!("{service} is operational") }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionBody {
    pub kb_version: String,
}
