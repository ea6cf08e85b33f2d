//! Worker dispatch rounds: retries, timeouts, panics and the join barrier.

mod common;

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crucible::adapters::artifacts::MemoryArtifactSink;
use crucible::adapters::workers::{MockReply, MockWorker};
use crucible::domain::models::{
    Category, CheckId, ConvergencePoint, DispatchMode, DispatcherConfig, DrillVerdict, Region, RegionKey,
    TargetGraph, TargetRef, ValidationResult, WorkerResponse, WorkerStatus,
};
use crucible::domain::ports::Worker;
use crucible::services::{DispatchContext, FindingStore, WorkerDispatcher};

use common::{finding, spanned_finding};

fn context() -> DispatchContext {
    DispatchContext {
        engagement_id: Uuid::new_v4(),
        target: Arc::new(TargetGraph::empty(TargetRef::new("vault", "memory"))),
        round: 1,
    }
}

fn dispatcher(workers: &[Arc<MockWorker>]) -> WorkerDispatcher {
    let registry: Vec<Arc<dyn Worker>> = workers
        .iter()
        .map(|w| Arc::clone(w) as Arc<dyn Worker>)
        .collect();
    WorkerDispatcher::new(registry, &DispatcherConfig::default())
        .unwrap()
        .with_attempt_timeout(Duration::from_millis(100))
}

fn vault_findings() -> WorkerResponse {
    WorkerResponse::findings(vec![finding("Vault.sol", Category::Ordering, 7)])
}

fn point(unit: &str, drillers: &[&str]) -> ConvergencePoint {
    ConvergencePoint {
        region_key: RegionKey::from_region(&Region::with_span(unit, 10, 40)),
        contributing_producers: drillers.iter().map(|d| d.to_string()).collect(),
        density: 2,
        severity_component: 7,
        novelty_component: 1.0,
        distinct_categories: vec![Category::Ordering],
        primary_category: Category::Ordering,
        composite_score: 100.0,
        rank: 1,
        finding_ids: vec![],
        recommended_drillers: drillers.iter().map(|d| d.to_string()).collect(),
    }
}

fn gate_results() -> Vec<ValidationResult> {
    vec![
        ValidationResult::support(
            CheckId::ValueComputation,
            vec!["assumed relationship observed on live values".to_string()],
        ),
        ValidationResult::support(
            CheckId::Differential,
            vec!["preview 100 vs executed 97 (divergence 3)".to_string()],
        ),
    ]
}

#[tokio::test]
async fn test_every_worker_reported_despite_failures() {
    common::setup_test_logging();

    let workers = vec![
        Arc::new(MockWorker::new("ok", "vault").on_broad(MockReply::success(vault_findings()))),
        Arc::new(
            MockWorker::new("slow", "vault")
                .on_broad(MockReply::Delay(Duration::from_secs(5), vault_findings())),
        ),
        Arc::new(MockWorker::new("boom", "vault").on_broad(MockReply::Panic("worker bug".into()))),
        Arc::new(MockWorker::new("silent", "vault")),
    ];
    let mut store = FindingStore::new();

    let report = dispatcher(&workers)
        .dispatch_broad(&context(), &mut store, &[])
        .await
        .unwrap();

    assert_eq!(report.mode, DispatchMode::Broad);
    assert_eq!(report.outcomes.len(), 4);
    assert_eq!(report.completed_count(), 1);
    assert_eq!(report.degraded().count(), 3);
    assert_eq!(store.len(), 1);
    assert_eq!(store.all()[0].producer_id, "ok");

    let slow = report.outcome("slow").unwrap();
    assert_eq!(slow.status, WorkerStatus::Degraded);
    assert_eq!(slow.attempts, 2);
    assert!(slow.gap.as_deref().unwrap().contains("timed out"));

    let boom = report.outcome("boom").unwrap();
    assert!(boom.is_degraded());
    assert!(boom.gap.is_some());

    let silent = report.outcome("silent").unwrap();
    assert_eq!(silent.attempt_errors.len(), 2);
}

#[tokio::test]
async fn test_timeout_then_success_on_retry() {
    let worker = Arc::new(
        MockWorker::new("flaky", "vault")
            .on_broad(MockReply::Delay(Duration::from_secs(5), vault_findings()))
            .on_broad(MockReply::success(vault_findings())),
    );
    let mut store = FindingStore::new();

    let report = dispatcher(&[worker.clone()])
        .dispatch_broad(&context(), &mut store, &[])
        .await
        .unwrap();

    let outcome = report.outcome("flaky").unwrap();
    assert_eq!(outcome.status, WorkerStatus::Completed);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.attempt_errors.len(), 1);
    assert_eq!(worker.call_count().await, 2);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_contract_violation_retried_then_degraded() {
    // Findings that miss the mission topic entirely.
    let off_topic = WorkerResponse::findings(vec![finding("Pool.sol", Category::Ordering, 4)]);
    let worker = Arc::new(
        MockWorker::new("drifter", "vault").on_broad(MockReply::success(off_topic)),
    );
    let mut store = FindingStore::new();

    let report = dispatcher(&[worker.clone()])
        .dispatch_broad(&context(), &mut store, &[])
        .await
        .unwrap();

    let outcome = report.outcome("drifter").unwrap();
    assert!(outcome.is_degraded());
    assert!(outcome.gap.as_deref().unwrap().contains("vault"));
    // What the worker actually said is kept, but never ingested.
    let rejected = outcome.rejected_response.as_ref().expect("rejected output kept");
    assert_eq!(rejected.findings[0].region.unit, "Pool.sol");
    assert_eq!(rejected.findings[0].producer_id, "drifter");
    assert_eq!(worker.call_count().await, 2);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_broad_missions_carry_focus() {
    let worker = Arc::new(MockWorker::new("w1", "vault").on_broad(MockReply::success(vault_findings())));
    let mut store = FindingStore::new();
    let focus = vec!["func:Vault.withdraw".to_string()];

    dispatcher(&[worker.clone()])
        .dispatch_broad(&context(), &mut store, &focus)
        .await
        .unwrap();

    let missions = worker.missions().await;
    assert_eq!(missions.len(), 1);
    assert_eq!(missions[0].mode, DispatchMode::Broad);
    assert_eq!(missions[0].focus, focus);
    assert!(missions[0].thesis.is_none());
}

#[tokio::test]
async fn test_narrow_round_limited_to_three_drillers() {
    let confirm = MockReply::success(WorkerResponse::verdict(DrillVerdict::Confirm, vec![]));
    let workers: Vec<Arc<MockWorker>> = ["a", "b", "c", "d", "e"]
        .iter()
        .map(|id| Arc::new(MockWorker::new(*id, "vault").on_narrow(confirm.clone())))
        .collect();
    let mut store = FindingStore::new();

    let report = dispatcher(&workers)
        .dispatch_narrow(&context(), &mut store, &point("Vault.sol", &["d", "b"]), &gate_results())
        .await
        .unwrap();

    let ids: Vec<&str> = report.outcomes.iter().map(|o| o.worker_id.as_str()).collect();
    assert_eq!(ids, vec!["d", "b", "a"]);
    assert_eq!(report.verdict_count(DrillVerdict::Confirm), 3);
    assert_eq!(workers[2].call_count().await, 0);

    let mission = workers[3].missions().await.remove(0);
    let thesis = mission.thesis.expect("narrow missions carry the thesis");
    assert_eq!(thesis.region_key.unit, "Vault.sol");
    assert_eq!(thesis.validation, gate_results());
}

#[tokio::test]
async fn test_narrow_finding_inside_thesis_region_counts_as_on_topic() {
    // Topic does not match, but the finding sits inside the thesis region.
    let refine = WorkerResponse::verdict(
        DrillVerdict::Refine,
        vec![spanned_finding("Vault.sol", 12, 20, Category::Ordering, 6)],
    );
    let worker = Arc::new(MockWorker::new("w1", "oracle").on_narrow(MockReply::success(refine)));
    let mut store = FindingStore::new();

    let report = dispatcher(&[worker])
        .dispatch_narrow(&context(), &mut store, &point("Vault.sol", &["w1"]), &[])
        .await
        .unwrap();

    assert_eq!(report.completed_count(), 1);
    assert_eq!(report.verdict_count(DrillVerdict::Refine), 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_missing_verdict_degrades_driller() {
    let worker = Arc::new(
        MockWorker::new("w1", "vault").on_narrow(MockReply::success(vault_findings())),
    );
    let mut store = FindingStore::new();

    let report = dispatcher(&[worker])
        .dispatch_narrow(&context(), &mut store, &point("Vault.sol", &["w1"]), &[])
        .await
        .unwrap();

    let outcome = report.outcome("w1").unwrap();
    assert!(outcome.is_degraded());
    assert!(outcome.gap.as_deref().unwrap().contains("verdict"));
}

#[tokio::test]
async fn test_outputs_persisted_through_sink() {
    let workers = vec![
        Arc::new(MockWorker::new("w1", "vault").on_broad(MockReply::success(vault_findings()))),
        Arc::new(MockWorker::new("w2", "vault").on_broad(MockReply::failure("nope"))),
    ];
    let sink = MemoryArtifactSink::new();
    let mut store = FindingStore::new();
    let ctx = context();

    dispatcher(&workers)
        .with_sink(Arc::new(sink.clone()))
        .dispatch_broad(&ctx, &mut store, &[])
        .await
        .unwrap();

    let outputs = sink.outputs().await;
    assert_eq!(outputs.len(), 2);
    assert!(outputs.iter().all(|o| o.engagement_id == ctx.engagement_id && o.round == 1));
    assert!(outputs.iter().any(|o| o.outcome.is_degraded()));
}
