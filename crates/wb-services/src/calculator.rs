//! Calculadora con kernel intercambiable.
use std::sync::Arc;

use async_trait::async_trait;
use wb_core::{Envelope, StageError, StagePayload};
use wb_domain::{CalculationRequest, CalculationResult, DomainError, ResultSeries};

use crate::contracts::Calculator;

/// Cómputo de dominio sobre una petición ya validada.
pub trait CalculationKernel: Send + Sync {
    /// Nombre que viaja como `calculation_engine` en el resultado.
    fn name(&self) -> &str;
    fn compute(&self, request: &CalculationRequest) -> Result<Vec<ResultSeries>, DomainError>;
}

/// `mass = moles × molar_mass` por entidad, en gramos.
pub struct MolarMassKernel;

impl CalculationKernel for MolarMassKernel {
    fn name(&self) -> &str {
        "molar-mass/1"
    }

    fn compute(&self, request: &CalculationRequest) -> Result<Vec<ResultSeries>, DomainError> {
        let moles = *request.parameters()
                            .get("moles")
                            .ok_or_else(|| DomainError::invalid_parameter("moles", "required by the molar mass kernel"))?;
        request.entities()
               .iter()
               .map(|entity| {
                   let molar_mass = entity.attribute("molar_mass")
                                          .filter(|m| m.is_finite() && *m > 0.0)
                                          .ok_or_else(|| {
                                              DomainError::Computation(format!("{} has no usable molar mass", entity.id))
                                          })?;
                   let mass = moles * molar_mass;
                   if !mass.is_finite() {
                       return Err(DomainError::Computation(format!("mass of {} overflows", entity.id)));
                   }
                   Ok(ResultSeries { entity_id: entity.id.clone(),
                                     label: entity.symbol.clone(),
                                     quantity: "mass".to_string(),
                                     unit: "g".to_string(),
                                     value: mass })
               })
               .collect()
    }
}

#[derive(Clone)]
pub struct KernelCalculator {
    kernel: Arc<dyn CalculationKernel>,
}

impl KernelCalculator {
    pub fn new(kernel: Arc<dyn CalculationKernel>) -> Self {
        Self { kernel }
    }

    pub fn molar_mass() -> Self {
        Self::new(Arc::new(MolarMassKernel))
    }

    pub fn compute(&self, request: &CalculationRequest) -> Result<CalculationResult, DomainError> {
        let series = self.kernel.compute(request)?;
        Ok(CalculationResult { series,
                               provenance: request.provenance(),
                               calculation_engine: self.kernel.name().to_string() })
    }
}

#[async_trait]
impl Calculator for KernelCalculator {
    fn name(&self) -> &str {
        self.kernel.name()
    }

    async fn calculate(&self, request: &CalculationRequest) -> Result<Envelope, StageError> {
        let result = self.compute(request)?;
        tracing::debug!(engine = %result.calculation_engine, series = result.series.len(), "calculation finished");
        Ok(result.to_envelope()?)
    }
}
