mod support;

use std::sync::Arc;
use std::time::Duration;

use support::{CountingResolver, Fault, FaultyCalculator, MislabelingInterpreter, Rig, VersionSkewResolver};
use wb_core::{ErrorCode, FailureReason, RunEventKind, RunState, Stage, StagePayload};
use wb_domain::{CalculationResult, RenderedArtifact, ResolvedEntity};
use wb_pipeline::{Orchestrator, OrchestratorError, PipelineRequest, RunSummary, StagePolicy};
use wb_services::LexiconResolver;

fn sodium() -> PipelineRequest {
    PipelineRequest::new("sodium").with_param("moles", 2.0)
}

#[tokio::test]
async fn sodium_run_completes_with_consistent_outputs() {
    let rig = Rig::new(FaultyCalculator::new(Fault::None));
    let orch = rig.orchestrator();
    let run = orch.run(sodium()).await.unwrap();

    assert_eq!(run.state, RunState::Completed);
    assert!(run.run_fingerprint.is_some());
    let entity = ResolvedEntity::from_envelope(run.output(Stage::Resolve).unwrap()).unwrap();
    let result = CalculationResult::from_envelope(run.output(Stage::Calculate).unwrap()).unwrap();
    let artifact = RenderedArtifact::from_envelope(run.output(Stage::Interpret).unwrap()).unwrap();

    assert_eq!(entity.symbol, "Na");
    assert_eq!(entity.attribute("atomic_number"), Some(11.0));
    assert_eq!(result.provenance.entity_ids, vec![entity.id.clone()]);
    assert!((result.series[0].value - 45.98).abs() < 1e-9);
    assert_eq!(artifact.series_labels, vec!["Na".to_string()]);
    assert!(artifact.narrative.contains("45.98"));
    assert_eq!(artifact.source_hash, result.provenance_hash());
    assert_eq!((artifact.width, artifact.height), (640, 360));
    assert_eq!(orch.kb_version().as_deref(), Some(wb_domain::SEED_VERSION));
}

#[tokio::test]
async fn empty_term_fails_at_resolve_without_calculating() {
    let rig = Rig::new(FaultyCalculator::new(Fault::None));
    let orch = rig.orchestrator();
    let run = orch.run(PipelineRequest::new("   ").with_param("moles", 1.0)).await.unwrap();

    match &run.state {
        RunState::Failed { stage: Stage::Resolve,
                           reason: FailureReason::Rejected { code, .. }, } => assert_eq!(*code, ErrorCode::NotFound),
        other => panic!("unexpected state {other:?}"),
    }
    let events = orch.run_events(run.id);
    assert!(!events.iter().any(|e| matches!(e.kind, RunEventKind::StageStarted { stage: Stage::Calculate })));
    assert_eq!(rig.resolver.calls(), 0);
    assert_eq!(rig.calculator.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn unreachable_calculator_exhausts_retries() {
    let rig = Rig::new(FaultyCalculator::new(Fault::Down));
    let orch = rig.orchestrator();
    let run = orch.run(sodium()).await.unwrap();

    assert!(matches!(run.state,
                     RunState::Failed { stage: Stage::Calculate,
                                        reason: FailureReason::Unavailable { .. }, }));
    assert_eq!(rig.calculator.calls(), 3);
    assert_eq!(rig.interpreter.calls(), 0);
    assert_eq!(run.record(Stage::Calculate).attempts, 3);
    let delays: Vec<u64> = orch.run_events(run.id)
                               .iter()
                               .filter_map(|e| match e.kind {
                                   RunEventKind::StageRetryScheduled { delay_ms, .. } => Some(delay_ms),
                                   _ => None,
                               })
                               .collect();
    assert_eq!(delays, vec![200, 400]);
    // sólo la resolución quedó en caché; los fallos no se cachean
    assert_eq!(orch.cache().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn hanging_calculator_times_out() {
    let rig = Rig::new(FaultyCalculator::new(Fault::Hang));
    let run = rig.orchestrator().run(sodium()).await.unwrap();
    assert_eq!(run.state,
               RunState::Failed { stage: Stage::Calculate,
                                  reason: FailureReason::Timeout });
    assert_eq!(rig.calculator.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_is_retried() {
    let rig = Rig::new(FaultyCalculator::failing(Fault::Down, 1));
    let run = rig.orchestrator().run(sodium()).await.unwrap();
    assert_eq!(run.state, RunState::Completed);
    assert_eq!(run.record(Stage::Calculate).attempts, 2);
}

#[tokio::test]
async fn computation_errors_are_not_retried() {
    let rig = Rig::new(FaultyCalculator::new(Fault::Reject));
    let run = rig.orchestrator().run(sodium()).await.unwrap();
    match &run.state {
        RunState::Failed { stage: Stage::Calculate,
                           reason, } => {
            assert_eq!(reason.code(), ErrorCode::ComputationError);
            assert!(!reason.is_retriable());
        }
        other => panic!("unexpected state {other:?}"),
    }
    assert_eq!(rig.calculator.calls(), 1);
}

#[tokio::test]
async fn invalid_parameters_never_reach_the_calculator() {
    let rig = Rig::new(FaultyCalculator::new(Fault::None));
    let run = rig.orchestrator()
                 .run(PipelineRequest::new("sodium").with_param("moles", -4.0))
                 .await
                 .unwrap();
    assert!(matches!(&run.state,
                     RunState::Failed { stage: Stage::Calculate,
                                        reason: FailureReason::Rejected { code: ErrorCode::InvalidParameter, .. }, }));
    assert_eq!(rig.calculator.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_runs_share_one_resolution() {
    let rig = Rig::with_resolver(CountingResolver::new(Duration::from_millis(50)),
                                 FaultyCalculator::new(Fault::None));
    let orch = rig.orchestrator();
    let a = orch.submit(sodium()).unwrap();
    let b = orch.submit(sodium()).unwrap();
    let (a, b) = (a.wait().await.unwrap(), b.wait().await.unwrap());

    assert_eq!(a.state, RunState::Completed);
    assert_eq!(b.state, RunState::Completed);
    assert_eq!(rig.resolver.calls(), 1);
    assert_eq!(a.output(Stage::Resolve), b.output(Stage::Resolve));
    assert_eq!(rig.calculator.calls(), 1);
    assert_eq!(orch.cache().len(), 3);
}

#[tokio::test]
async fn second_run_is_served_from_cache() {
    let rig = Rig::new(FaultyCalculator::new(Fault::None));
    let orch = rig.orchestrator();
    let first = orch.run(sodium()).await.unwrap();
    let second = orch.run(sodium()).await.unwrap();

    assert_eq!(second.state, RunState::Completed);
    assert!(second.stages.iter().all(|r| r.cached));
    assert_eq!(first.output(Stage::Interpret), second.output(Stage::Interpret));
    assert_eq!(first.run_fingerprint, second.run_fingerprint);
    assert_eq!((rig.resolver.calls(), rig.calculator.calls(), rig.interpreter.calls()), (1, 1, 1));
}

#[tokio::test]
async fn cancel_abandons_in_flight_stage() {
    let rig = Rig::new(FaultyCalculator::new(Fault::Block));
    let orch = rig.orchestrator();
    let handle = orch.submit(sodium()).unwrap();
    let run_id = handle.run_id();

    rig.calculator.entered.notified().await;
    assert_eq!(orch.run_snapshot(run_id).unwrap().state, RunState::Calculating);
    assert!(orch.cancel(run_id).unwrap());
    let run = handle.wait().await.unwrap();

    assert_eq!(run.state, RunState::Cancelled { stage: Some(Stage::Calculate) });
    assert_eq!(rig.interpreter.calls(), 0);
    assert!(!orch.is_active(run_id));
    assert!(!orch.cancel(run_id).unwrap());
}

#[tokio::test(start_paused = true)]
async fn retry_resumes_after_last_recorded_stage() {
    let rig = Rig::new(FaultyCalculator::new(Fault::Down));
    let orch = rig.orchestrator();
    let failed = orch.run(sodium()).await.unwrap();
    assert!(matches!(failed.state, RunState::Failed { stage: Stage::Calculate, .. }));

    rig.calculator.down.store(false, std::sync::atomic::Ordering::SeqCst);
    let resumed = orch.retry_run(failed.id).unwrap().wait().await.unwrap();

    assert_eq!(resumed.state, RunState::Completed);
    assert_eq!(resumed.output(Stage::Resolve), failed.output(Stage::Resolve));
    assert_eq!(rig.resolver.calls(), 1);
    assert_eq!(resumed.record(Stage::Calculate).attempts, 4);
}

#[tokio::test]
async fn validation_failures_cannot_be_retried() {
    let rig = Rig::new(FaultyCalculator::new(Fault::None));
    let orch = rig.orchestrator();
    let run = orch.run(PipelineRequest::new("phlogiston").with_param("moles", 1.0)).await.unwrap();
    assert!(matches!(orch.retry_run(run.id), Err(OrchestratorError::NotRetriable(_))));
    assert!(matches!(orch.retry_run(uuid::Uuid::new_v4()), Err(OrchestratorError::UnknownRun(_))));
}

#[tokio::test]
async fn kb_version_bump_invalidates_cache() {
    let rig = Rig::new(FaultyCalculator::new(Fault::None));
    let orch = rig.orchestrator();
    orch.run(sodium()).await.unwrap();
    assert_eq!(orch.cache().len(), 3);

    assert_eq!(orch.bump_kb_version(wb_domain::SEED_VERSION), 0);
    assert_eq!(orch.bump_kb_version("periodic-seed-2"), 3);
    assert!(orch.cache().is_empty());
    assert_eq!(orch.refresh_kb_version().await.unwrap(), rig.resolver.kb_version().await.unwrap());
}

#[tokio::test]
async fn prune_drops_terminal_runs_outside_retention() {
    let rig = Rig::new(FaultyCalculator::new(Fault::None));
    let orch = Arc::new(rig.builder().retention(Duration::ZERO).build().unwrap());
    let run = orch.run(sodium()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(orch.prune_runs(), 1);
    assert!(orch.run_snapshot(run.id).is_none());
}

#[tokio::test]
async fn invalid_artifact_size_is_refused_up_front() {
    let rig = Rig::new(FaultyCalculator::new(Fault::None));
    let err = rig.orchestrator()
                 .run(sodium().with_size(0, 100))
                 .await
                 .unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidRequest(_)));
}

#[test]
fn builder_requires_every_stage() {
    let err = Orchestrator::builder().build().err().unwrap();
    assert!(matches!(err, OrchestratorError::Missing("resolver")));
}

#[tokio::test(start_paused = true)]
async fn schema_skew_fails_the_producing_stage_and_is_not_cached() {
    let resolver = Arc::new(VersionSkewResolver::new());
    let calculator = Arc::new(FaultyCalculator::new(Fault::None));
    let orch = Arc::new(Orchestrator::builder().resolver(resolver.clone())
                                               .calculator(calculator.clone())
                                               .interpreter(Arc::new(support::CountingInterpreter::new()))
                                               .policy(StagePolicy::default())
                                               .build()
                                               .unwrap());

    let failed = orch.run(sodium()).await.unwrap();
    assert!(matches!(failed.state,
                     RunState::Failed { stage: Stage::Resolve,
                                        reason: FailureReason::Unavailable { .. }, }));
    assert!(failed.output(Stage::Resolve).is_none());
    assert_eq!(resolver.calls(), 3);
    assert_eq!(calculator.calls(), 0);
    assert!(orch.cache().is_empty());

    resolver.tampering.store(false, std::sync::atomic::Ordering::SeqCst);
    let resumed = orch.retry_run(failed.id).unwrap().wait().await.unwrap();
    assert_eq!(resumed.state, RunState::Completed);
    assert_eq!(resumed.output(Stage::Resolve).unwrap().schema_version, 1);
}

#[tokio::test(start_paused = true)]
async fn mislabeled_artifact_fails_interpret() {
    let rig = Rig::new(FaultyCalculator::new(Fault::None));
    let orch = Arc::new(rig.builder()
                           .interpreter(Arc::new(MislabelingInterpreter::new()))
                           .build()
                           .unwrap());

    let run = orch.run(sodium()).await.unwrap();
    assert!(matches!(run.state,
                     RunState::Failed { stage: Stage::Interpret,
                                        reason: FailureReason::Unavailable { .. }, }));
    assert!(run.output(Stage::Interpret).is_none());
    assert!(run.run_fingerprint.is_none());
    let summary = RunSummary::from_run(&run);
    assert_eq!(summary.failure.unwrap().stage, Stage::Interpret);
    assert_eq!(orch.cache().len(), 2);
}
