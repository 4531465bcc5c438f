//! Intérprete: `CalculationResult` -> gráfico de barras SVG + narrativa.
//!
//! La salida es determinista: misma entrada, mismo SVG y misma narrativa
//! byte a byte.
use std::fmt::Write;

use async_trait::async_trait;
use wb_core::{Envelope, StageError, StagePayload};
use wb_domain::{ArtifactSize, CalculationResult, Definition, DomainError, RenderedArtifact, ResolvedEntity};

use crate::contracts::Interpreter;

const MEDIA_TYPE: &str = "image/svg+xml";
const MARGIN: f64 = 40.0;

#[derive(Clone)]
pub struct ChartInterpreter {
    engine: String,
}

impl Default for ChartInterpreter {
    fn default() -> Self {
        Self { engine: "svg-bar-chart/1".to_string() }
    }
}

impl ChartInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&self, result: &CalculationResult, size: ArtifactSize) -> Result<RenderedArtifact, DomainError> {
        let size = ArtifactSize::new(size.width, size.height)?;
        if result.series.is_empty() {
            return Err(DomainError::Render("result has no series".into()));
        }
        for s in &result.series {
            if !s.value.is_finite() {
                return Err(DomainError::Render(format!("series '{}' has a non-finite value", s.label)));
            }
            if !result.provenance.entity_ids.contains(&s.entity_id) {
                return Err(DomainError::Render(format!("series '{}' references entity '{}' outside its provenance",
                                                       s.label, s.entity_id)));
            }
        }
        let payload = bar_chart(result, size).map_err(|e| DomainError::Render(e.to_string()))?;
        Ok(RenderedArtifact { width: size.width,
                              height: size.height,
                              media_type: MEDIA_TYPE.to_string(),
                              payload,
                              narrative: narrative(result),
                              series_labels: result.series.iter().map(|s| s.label.clone()).collect(),
                              source_hash: result.provenance_hash(),
                              interpretive_engine: self.engine.clone() })
    }
}

#[async_trait]
impl Interpreter for ChartInterpreter {
    fn name(&self) -> &str {
        &self.engine
    }

    async fn interpret(&self, result: &CalculationResult, size: ArtifactSize) -> Result<Envelope, StageError> {
        let artifact = self.render(result, size)?;
        Ok(artifact.to_envelope()?)
    }
}

/// "Inputs: moles = 2. Na mass: 45.98 g."
fn narrative(result: &CalculationResult) -> String {
    let mut parts = Vec::new();
    if !result.provenance.parameters.is_empty() {
        let inputs: Vec<String> = result.provenance
                                        .parameters
                                        .iter()
                                        .map(|(k, v)| format!("{k} = {v}"))
                                        .collect();
        parts.push(format!("Inputs: {}.", inputs.join(", ")));
    }
    for s in &result.series {
        parts.push(format!("{} {}: {:.2} {}.", s.label, s.quantity, s.value, s.unit));
    }
    parts.join(" ")
}

fn bar_chart(result: &CalculationResult, size: ArtifactSize) -> Result<String, std::fmt::Error> {
    let (w, h) = (size.width as f64, size.height as f64);
    let plot_w = (w - 2.0 * MARGIN).max(1.0);
    let plot_h = (h - 2.0 * MARGIN).max(1.0);
    let max = result.series.iter().map(|s| s.value.abs()).fold(0.0_f64, f64::max);
    let scale = if max > 0.0 { plot_h / max } else { 0.0 };
    let slot = plot_w / result.series.len() as f64;
    let bar_w = slot * 0.6;

    let mut svg = String::new();
    write!(svg,
           r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">"#,
           size.width, size.height, size.width, size.height)?;
    write!(svg,
           r#"<line x1="{MARGIN:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="black"/>"#,
           h - MARGIN,
           w - MARGIN,
           h - MARGIN)?;
    for (i, s) in result.series.iter().enumerate() {
        let bar_h = s.value.max(0.0) * scale;
        let x = MARGIN + slot * i as f64 + (slot - bar_w) / 2.0;
        let y = h - MARGIN - bar_h;
        let label = escape(&s.label);
        write!(svg,
               r#"<rect x="{x:.1}" y="{y:.1}" width="{bar_w:.1}" height="{bar_h:.1}" fill="steelblue"><title>{label}</title></rect>"#)?;
        write!(svg,
               r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">{label}</text>"#,
               x + bar_w / 2.0,
               h - MARGIN / 2.0)?;
        write!(svg,
               r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">{:.2} {}</text>"#,
               x + bar_w / 2.0,
               (y - 4.0).max(12.0),
               s.value,
               escape(&s.unit))?;
    }
    svg.push_str("</svg>");
    Ok(svg)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Frase de definición a partir de las notas de la entidad.
pub fn describe(entity: &ResolvedEntity) -> Definition {
    let category = entity.notes.get("category");
    let summary = entity.notes.get("summary");
    let definition_text = match (category, summary) {
        (None, None) => format!("Definition for {} not available.", entity.id),
        (Some(c), None) => format!("{} ({}) is {} {}.", entity.name, entity.symbol, article(c), c),
        (None, Some(s)) => format!("{} ({}). {}", entity.name, entity.symbol, s),
        (Some(c), Some(s)) => format!("{} ({}) is {} {}. {}", entity.name, entity.symbol, article(c), c, s),
    };
    Definition { entity_id: entity.id.clone(),
                 definition_text }
}

fn article(word: &str) -> &'static str {
    match word.chars().next().map(|c| c.to_ascii_lowercase()) {
        Some('a' | 'e' | 'i' | 'o' | 'u') => "an",
        _ => "a",
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use wb_domain::{Provenance, ResultSeries};

    fn result(values: &[(&str, f64)]) -> CalculationResult {
        let mut parameters = BTreeMap::new();
        parameters.insert("moles".to_string(), 2.0);
        CalculationResult { series: values.iter()
                                          .map(|(id, v)| ResultSeries { entity_id: id.to_string(),
                                                                        label: id.to_uppercase(),
                                                                        quantity: "mass".into(),
                                                                        unit: "g".into(),
                                                                        value: *v })
                                          .collect(),
                            provenance: Provenance { entity_ids: values.iter().map(|(id, _)| id.to_string()).collect(),
                                                     kb_version: "v1".into(),
                                                     parameters,
                                                     parameters_hash: "p".into() },
                            calculation_engine: "test".into() }
    }

    #[test]
    fn narrative_uses_two_decimals() {
        let art = ChartInterpreter::new().render(&result(&[("na", 45.98)]), ArtifactSize::default())
                                         .unwrap();
        assert_eq!(art.narrative, "Inputs: moles = 2. NA mass: 45.98 g.");
        assert_eq!((art.width, art.height), (640, 360));
        assert!(art.payload.starts_with(r#"<svg xmlns="http://www.w3.org/2000/svg" width="640" height="360""#));
        assert_eq!(art.media_type, "image/svg+xml");
    }

    #[test]
    fn rendering_is_deterministic() {
        let r = result(&[("na", 45.98), ("cl", 70.9)]);
        let a = ChartInterpreter::new().render(&r, ArtifactSize::default()).unwrap();
        let b = ChartInterpreter::new().render(&r, ArtifactSize::default()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.series_labels, vec!["NA".to_string(), "CL".to_string()]);
    }

    #[test]
    fn malformed_results_are_render_errors() {
        let interp = ChartInterpreter::new();
        assert!(matches!(interp.render(&result(&[]), ArtifactSize::default()), Err(DomainError::Render(_))));
        assert!(matches!(interp.render(&result(&[("na", f64::NAN)]), ArtifactSize::default()),
                         Err(DomainError::Render(_))));
        let mut mismatched = result(&[("na", 1.0)]);
        mismatched.provenance.entity_ids = vec!["cl".into()];
        assert!(matches!(interp.render(&mismatched, ArtifactSize::default()), Err(DomainError::Render(_))));
    }

    #[test]
    fn labels_are_escaped() {
        let mut r = result(&[("na", 1.0)]);
        r.series[0].label = "<b>&".into();
        let art = ChartInterpreter::new().render(&r, ArtifactSize::default()).unwrap();
        assert!(art.payload.contains("&lt;b&gt;&amp;"));
        assert!(!art.payload.contains("<b>"));
    }

    #[test]
    fn describe_falls_back_without_notes() {
        let mut entity = ResolvedEntity { id: "na".into(),
                                          name: "Sodium".into(),
                                          symbol: "Na".into(),
                                          attributes: BTreeMap::new(),
                                          parameters: vec![],
                                          notes: BTreeMap::new(),
                                          kb_version: "v1".into() };
        assert_eq!(describe(&entity).definition_text, "Definition for na not available.");
        entity.notes.insert("category".into(), "alkali metal".into());
        assert_eq!(describe(&entity).definition_text, "Sodium (Na) is an alkali metal.");
    }
}
