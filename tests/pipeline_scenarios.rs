//! Escenarios completos con las etapas locales.
use std::sync::Arc;

use tokio_test::assert_ok;
use wb_core::{ErrorCode, FailureReason, RunEventKind, RunState, Stage, StagePayload};
use wb_domain::{CalculationResult, RenderedArtifact, ResolvedEntity};
use wb_pipeline::{PipelineRequest, RunSummary};
use workbench_rust::bootstrap;
use workbench_rust::AppConfig;

fn local() -> wb_pipeline::Orchestrator {
    let config = assert_ok!(AppConfig::from_lookup(|_| None));
    let kb = assert_ok!(bootstrap::load_knowledge_base(&config));
    assert_ok!(bootstrap::local_orchestrator(&config, kb))
}

#[tokio::test]
async fn sodium_two_moles() {
    let orch = local();
    let run = assert_ok!(orch.run(PipelineRequest::new("sodium").with_param("moles", 2.0)).await);
    assert_eq!(run.state, RunState::Completed);

    let entity = ResolvedEntity::from_envelope(run.output(Stage::Resolve).unwrap()).unwrap();
    let result = CalculationResult::from_envelope(run.output(Stage::Calculate).unwrap()).unwrap();
    let artifact = RenderedArtifact::from_envelope(run.output(Stage::Interpret).unwrap()).unwrap();
    assert_eq!(entity.symbol, "Na");
    assert_eq!(entity.attribute("atomic_number"), Some(11.0));
    assert!((result.series[0].value - 45.98).abs() < 1e-9);
    assert_eq!(result.series[0].label, "Na");
    assert_eq!(artifact.series_labels, vec!["Na"]);
    assert!(artifact.narrative.contains("45.98"));
    assert!(artifact.payload.contains("width=\"640\""));
}

#[tokio::test]
async fn aliases_and_case_resolve_to_the_same_entity() {
    let orch = local();
    let a = assert_ok!(orch.run(PipelineRequest::new("  NATRIUM ").with_param("moles", 1.0)).await);
    let b = assert_ok!(orch.run(PipelineRequest::new("Sodium").with_param("moles", 1.0)).await);
    assert_eq!(a.output(Stage::Resolve), b.output(Stage::Resolve));
    assert_eq!(a.output(Stage::Interpret), b.output(Stage::Interpret));
}

#[tokio::test]
async fn empty_term_never_reaches_calculation() {
    let orch = local();
    let run = assert_ok!(orch.run(PipelineRequest::new("").with_param("moles", 1.0)).await);
    assert!(matches!(&run.state,
                     RunState::Failed { stage: Stage::Resolve,
                                        reason: FailureReason::Rejected { code: ErrorCode::NotFound, .. }, }));
    let reached_calculation = orch.run_events(run.id)
                                  .iter()
                                  .any(|e| matches!(e.kind, RunEventKind::StageStarted { stage: Stage::Calculate }));
    assert!(!reached_calculation);

    let summary = RunSummary::from_run(&run);
    let failure = summary.failure.unwrap();
    assert_eq!(failure.code, ErrorCode::NotFound);
    assert!(!failure.retriable);
}

#[tokio::test]
async fn missing_required_parameter_is_a_validation_failure() {
    let orch = local();
    let run = assert_ok!(orch.run(PipelineRequest::new("iron")).await);
    match run.state {
        RunState::Failed { stage, reason } => {
            assert_eq!(stage, Stage::Calculate);
            assert_eq!(reason.code(), ErrorCode::InvalidParameter);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_runs_are_deterministic() {
    let orch = Arc::new(local());
    let handles: Vec<_> = (0..8).map(|_| {
                                    orch.submit(PipelineRequest::new("chlorine").with_param("moles", 3.0))
                                        .unwrap()
                                })
                                .collect();
    let mut fingerprints = Vec::new();
    for handle in handles {
        let run = assert_ok!(handle.wait().await);
        assert_eq!(run.state, RunState::Completed);
        fingerprints.push(run.run_fingerprint.unwrap());
    }
    fingerprints.dedup();
    assert_eq!(fingerprints.len(), 1);
    assert_eq!(orch.cache().len(), 3);
}
