//! Common test utilities and helpers
#![allow(dead_code)]

use std::sync::Arc;
use tempfile::TempDir;

use crucible::adapters::artifacts::MemoryArtifactSink;
use crucible::adapters::oracle::MockOracle;
use crucible::adapters::workers::{MockReply, MockWorker};
use crucible::domain::models::{
    Category, Config, DrillVerdict, Finding, Region, TargetGraph, TargetRef, WorkerResponse,
};
use crucible::domain::ports::Worker;
use crucible::services::{EngagementOrchestrator, TargetSnapshot, WorkerDispatcher};

/// Create a temporary directory for tests
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// Setup test logging
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A schema-valid finding. The producer id is stamped by the dispatcher.
pub fn finding(unit: &str, category: Category, severity: u8) -> Finding {
    Finding::new("", Region::unit(unit), category, severity)
        .with_evidence(format!("{unit}: suspicious {category} path"))
}

pub fn spanned_finding(unit: &str, start: u64, end: u64, category: Category, severity: u8) -> Finding {
    Finding::new("", Region::with_span(unit, start, end), category, severity)
        .with_evidence(format!("{unit}:{start}-{end}: suspicious {category} path"))
}

/// Worker whose broad round reports `findings` and whose drilling confirms.
pub fn confirming_worker(id: &str, topic: &str, findings: Vec<Finding>) -> MockWorker {
    MockWorker::new(id, topic)
        .on_broad(MockReply::success(WorkerResponse::findings(findings)))
        .on_narrow(MockReply::success(WorkerResponse::verdict(
            DrillVerdict::Confirm,
            vec![],
        )))
}

pub fn deny() -> MockReply {
    MockReply::success(WorkerResponse::verdict(DrillVerdict::Deny, vec![]))
}

/// An in-memory snapshot so engagements never touch the filesystem.
pub fn snapshot() -> TargetSnapshot {
    TargetSnapshot::Loaded(TargetGraph::empty(TargetRef::new("vault", "memory")))
}

/// Everything a test needs to inspect after a run.
pub struct Harness {
    pub orchestrator: EngagementOrchestrator,
    pub workers: Vec<Arc<MockWorker>>,
    pub oracle: Arc<MockOracle>,
    pub sink: MemoryArtifactSink,
}

pub fn harness(workers: Vec<MockWorker>, oracle: MockOracle) -> Harness {
    harness_with_config(workers, oracle, &Config::default())
}

pub fn harness_with_config(workers: Vec<MockWorker>, oracle: MockOracle, config: &Config) -> Harness {
    let workers: Vec<Arc<MockWorker>> = workers.into_iter().map(Arc::new).collect();
    let registry: Vec<Arc<dyn Worker>> = workers
        .iter()
        .map(|w| Arc::clone(w) as Arc<dyn Worker>)
        .collect();
    let dispatcher =
        WorkerDispatcher::new(registry, &config.dispatcher).expect("valid worker registry");
    let oracle = Arc::new(oracle);
    let sink = MemoryArtifactSink::new();

    let orchestrator = EngagementOrchestrator::new(
        dispatcher,
        oracle.clone(),
        oracle.clone(),
        Arc::new(sink.clone()),
        config,
    );

    Harness {
        orchestrator,
        workers,
        oracle,
        sink,
    }
}

impl Harness {
    pub async fn total_calls(&self) -> usize {
        let mut total = 0;
        for worker in &self.workers {
            total += worker.call_count().await;
        }
        total
    }
}
