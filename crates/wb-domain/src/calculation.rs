//! Petición y resultado de cálculo.
//!
//! `CalculationRequest` sólo se construye validado: nombres de parámetro
//! conocidos, valores finitos, dentro del rango de cada entidad que los
//! declara y con todos los parámetros requeridos presentes. Una petición
//! inválida no llega nunca a la calculadora.
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use wb_core::hashing::hash_value;
use wb_core::{PayloadKind, StagePayload};

use crate::entity::ResolvedEntity;
use crate::DomainError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCalculationRequest")]
pub struct CalculationRequest {
    entities: Vec<ResolvedEntity>,
    parameters: BTreeMap<String, f64>,
}

#[derive(Deserialize)]
struct RawCalculationRequest {
    entities: Vec<ResolvedEntity>,
    parameters: BTreeMap<String, f64>,
}

impl TryFrom<RawCalculationRequest> for CalculationRequest {
    type Error = DomainError;

    fn try_from(raw: RawCalculationRequest) -> Result<Self, Self::Error> {
        CalculationRequest::new(raw.entities, raw.parameters)
    }
}

impl CalculationRequest {
    pub fn new(entities: Vec<ResolvedEntity>, parameters: BTreeMap<String, f64>) -> Result<Self, DomainError> {
        if entities.is_empty() {
            return Err(DomainError::invalid_parameter("entities", "at least one resolved entity is required"));
        }
        let mut ids = BTreeSet::new();
        for e in &entities {
            if !ids.insert(e.id.as_str()) {
                return Err(DomainError::invalid_parameter("entities", format!("duplicate entity '{}'", e.id)));
            }
            if e.kb_version != entities[0].kb_version {
                return Err(DomainError::invalid_parameter("entities",
                                                          "entities were resolved against different knowledge base versions"));
            }
        }
        for (name, value) in &parameters {
            let mut declared = false;
            for e in &entities {
                if let Some(spec) = e.parameter(name) {
                    declared = true;
                    spec.check(&e.id, *value)?;
                }
            }
            if !declared {
                return Err(DomainError::invalid_parameter(name, "unknown parameter"));
            }
        }
        for e in &entities {
            for spec in e.parameters.iter().filter(|p| p.required) {
                if !parameters.contains_key(&spec.name) {
                    return Err(DomainError::invalid_parameter(&spec.name,
                                                              format!("required by {} but missing", e.id)));
                }
            }
        }
        Ok(Self { entities,
                  parameters })
    }

    pub fn entities(&self) -> &[ResolvedEntity] {
        &self.entities
    }

    pub fn parameters(&self) -> &BTreeMap<String, f64> {
        &self.parameters
    }

    pub fn kb_version(&self) -> &str {
        &self.entities[0].kb_version
    }

    pub fn sorted_entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entities.iter().map(|e| e.id.clone()).collect();
        ids.sort();
        ids
    }

    /// Input canónico para la clave de caché (ids ordenados + parámetros).
    pub fn cache_material(&self) -> Value {
        json!({
            "entity_ids": self.sorted_entity_ids(),
            "parameters": parameters_value(&self.parameters),
        })
    }

    pub fn provenance(&self) -> Provenance {
        Provenance { entity_ids: self.entities.iter().map(|e| e.id.clone()).collect(),
                     kb_version: self.kb_version().to_string(),
                     parameters: self.parameters.clone(),
                     parameters_hash: hash_value(&parameters_value(&self.parameters)) }
    }
}

fn parameters_value(parameters: &BTreeMap<String, f64>) -> Value {
    let map: Map<String, Value> = parameters.iter().map(|(k, v)| (k.clone(), Value::from(*v))).collect();
    Value::Object(map)
}

// Un valor no finito se serializa como null; al leerlo vuelve a ser NaN para
// que el intérprete lo rechace como resultado malformado.
fn nullable_f64<'de, D>(de: D) -> Result<f64, D::Error>
    where D: Deserializer<'de>
{
    Ok(Option::<f64>::deserialize(de)?.unwrap_or(f64::NAN))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSeries {
    pub entity_id: String,
    pub label: String,
    pub quantity: String,
    pub unit: String,
    #[serde(deserialize_with = "nullable_f64")]
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub entity_ids: Vec<String>,
    pub kb_version: String,
    pub parameters: BTreeMap<String, f64>,
    pub parameters_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub series: Vec<ResultSeries>,
    pub provenance: Provenance,
    pub calculation_engine: String,
}

impl CalculationResult {
    /// Hash de la procedencia; el artefacto lo referencia como `source_hash`.
    pub fn provenance_hash(&self) -> String {
        hash_value(&json!({
            "entity_ids": self.provenance.entity_ids,
            "kb_version": self.provenance.kb_version,
            "parameters_hash": self.provenance.parameters_hash,
            "calculation_engine": self.calculation_engine,
        }))
    }
}

impl StagePayload for CalculationResult {
    const KIND: PayloadKind = PayloadKind::CalculationResult;
}
