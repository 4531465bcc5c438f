mod support;

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{json, Value};
use support::{Fault, FaultyCalculator, Rig};
use wb_pipeline::gateway::gateway_router;
use wb_pipeline::{Orchestrator, RunSummary};

async fn serve(orchestrator: Arc<Orchestrator>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, gateway_router(orchestrator)).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn pipeline_endpoint_returns_completed_summary() {
    let rig = Rig::new(FaultyCalculator::new(Fault::None));
    let addr = serve(rig.orchestrator()).await;
    let http = reqwest::Client::new();

    let resp = http.post(format!("http://{addr}/pipeline"))
                   .json(&json!({"term": "Sodium", "parameters": {"moles": 2.0}}))
                   .send()
                   .await
                   .unwrap();
    assert_eq!(resp.status(), 200);
    let summary: RunSummary = resp.json().await.unwrap();
    assert!(summary.is_completed());
    assert_eq!(summary.entity_id.as_deref(), Some("na"));
    let artifact = summary.artifact.as_ref().unwrap();
    assert!(artifact.narrative.contains("45.98"));

    let fetched: RunSummary = http.get(format!("http://{addr}/runs/{}", summary.run_id))
                                  .send()
                                  .await
                                  .unwrap()
                                  .json()
                                  .await
                                  .unwrap();
    assert_eq!(fetched.run_fingerprint, summary.run_fingerprint);
}

#[tokio::test]
async fn failed_run_reports_code_without_internals() {
    let rig = Rig::new(FaultyCalculator::new(Fault::None));
    let addr = serve(rig.orchestrator()).await;
    let http = reqwest::Client::new();

    let body: Value = http.post(format!("http://{addr}/pipeline"))
                          .json(&json!({"term": "phlogiston", "parameters": {"moles": 1.0}}))
                          .send()
                          .await
                          .unwrap()
                          .json()
                          .await
                          .unwrap();
    assert_eq!(body["state"], "failed");
    assert_eq!(body["failure"]["code"], "NOT_FOUND");
    assert_eq!(body["failure"]["stage"], "resolve");
    assert_eq!(body["failure"]["retriable"], false);

    let run_id = body["run_id"].as_str().unwrap();
    let retry = http.post(format!("http://{addr}/runs/{run_id}/retry")).send().await.unwrap();
    assert_eq!(retry.status(), 409);
}

#[tokio::test]
async fn malformed_body_and_unknown_run() {
    let rig = Rig::new(FaultyCalculator::new(Fault::None));
    let addr = serve(rig.orchestrator()).await;
    let http = reqwest::Client::new();

    let resp = http.post(format!("http://{addr}/pipeline"))
                   .json(&json!({"parameters": {}}))
                   .send()
                   .await
                   .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "INVALID_PARAMETER");

    let missing = uuid::Uuid::new_v4();
    let resp = http.get(format!("http://{addr}/runs/{missing}")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let resp = http.post(format!("http://{addr}/runs/{missing}/cancel")).send().await.unwrap();
    assert_eq!(resp.status(), 404);

    let health: Value = http.get(format!("http://{addr}/")).send().await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "Gateway Service is operational");
}

#[tokio::test]
async fn in_flight_run_can_be_cancelled_over_http() {
    let rig = Rig::new(FaultyCalculator::new(Fault::Block));
    let orchestrator = rig.orchestrator();
    let addr = serve(Arc::clone(&orchestrator)).await;
    let http = reqwest::Client::new();

    let resp = http.post(format!("http://{addr}/runs"))
                   .json(&json!({"term": "sodium", "parameters": {"moles": 2.0}}))
                   .send()
                   .await
                   .unwrap();
    assert_eq!(resp.status(), 202);
    let accepted: RunSummary = resp.json().await.unwrap();
    assert!(!accepted.is_completed());

    rig.calculator.entered.notified().await;
    let cancelled: Value = http.post(format!("http://{addr}/runs/{}/cancel", accepted.run_id))
                               .send()
                               .await
                               .unwrap()
                               .json()
                               .await
                               .unwrap();
    assert_eq!(cancelled["state"], "cancelled");

    let fetched: Value = http.get(format!("http://{addr}/runs/{}", accepted.run_id))
                             .send()
                             .await
                             .unwrap()
                             .json()
                             .await
                             .unwrap();
    assert_eq!(fetched["state"], "cancelled");
    assert_eq!(rig.interpreter.calls(), 0);
}
