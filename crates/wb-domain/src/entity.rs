use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use wb_core::{PayloadKind, StagePayload};

use crate::DomainError;

/// Parámetro numérico declarado por una entidad, con su rango válido.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub required: bool,
}

impl ParameterSpec {
    /// Verifica que `value` sea finito y esté dentro del rango declarado.
    /// Nunca recorta el valor.
    pub fn check(&self, entity_id: &str, value: f64) -> Result<(), DomainError> {
        if !value.is_finite() {
            return Err(DomainError::invalid_parameter(&self.name, "value must be finite"));
        }
        if let Some(min) = self.min {
            if value < min {
                return Err(DomainError::invalid_parameter(&self.name,
                                                          format!("{value} is below minimum {min} for {entity_id}")));
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return Err(DomainError::invalid_parameter(&self.name,
                                                          format!("{value} is above maximum {max} for {entity_id}")));
            }
        }
        Ok(())
    }
}

/// Entidad canónica resuelta contra una versión concreta de la KB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEntity {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub attributes: BTreeMap<String, f64>,
    pub parameters: Vec<ParameterSpec>,
    #[serde(default)]
    pub notes: BTreeMap<String, String>,
    pub kb_version: String,
}

impl ResolvedEntity {
    pub fn attribute(&self, name: &str) -> Option<f64> {
        self.attributes.get(name).copied()
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

impl StagePayload for ResolvedEntity {
    const KIND: PayloadKind = PayloadKind::ResolvedEntity;

    fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("entity id is empty".into());
        }
        if self.kb_version.is_empty() {
            return Err("entity has no knowledge base version".into());
        }
        Ok(())
    }
}
