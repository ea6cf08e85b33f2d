//! End-to-end engagement tests against scripted workers and a scripted oracle.
//!
//! Every run goes through the real dispatcher, synthesizer, gate, constructor
//! and reviewer; only the worker bodies and the target oracle are scripted.

mod common;

use std::sync::Arc;

use crucible::adapters::artifacts::FilesystemArtifactSink;
use crucible::adapters::oracle::{MockOracle, OracleScript};
use crucible::adapters::workers::{MockReply, MockWorker};
use crucible::domain::models::{
    Category, CheckOutcome, Config, DispatchMode, EngagementPhase, Outcome, TargetGraph, TargetRef,
};
use crucible::domain::ports::{ArtifactSink, Worker};
use crucible::services::{EngagementOrchestrator, TargetSnapshot, WorkerDispatcher};

use common::{confirming_worker, deny, finding, harness, harness_with_config, snapshot};

/// Three converging regions, ranked Vault.sol (three workers, severity 9),
/// Pool.sol (two workers, severity 6), Token.sol (two workers, severity 5).
/// Oracle.sol is reached by one worker only.
fn three_region_workers() -> Vec<MockWorker> {
    let topic = "accounting_mismatch";
    let cat = Category::AccountingMismatch;
    vec![
        confirming_worker("w1", topic, vec![finding("Vault.sol", cat, 9)]),
        confirming_worker("w2", topic, vec![finding("Vault.sol", cat, 9)]),
        confirming_worker("w3", topic, vec![finding("Vault.sol", cat, 8)]),
        confirming_worker("w4", topic, vec![finding("Pool.sol", cat, 6)]),
        confirming_worker("w5", topic, vec![finding("Pool.sol", cat, 5)]),
        confirming_worker("w6", topic, vec![finding("Token.sol", cat, 5)]),
        confirming_worker("w7", topic, vec![finding("Token.sol", cat, 4)]),
        confirming_worker("w8", topic, vec![finding("Oracle.sol", cat, 9)]),
    ]
}

/// Four two-worker regions with strictly decreasing severity.
fn four_region_workers() -> Vec<MockWorker> {
    let topic = "accounting_mismatch";
    let cat = Category::AccountingMismatch;
    [("Alpha.sol", 9), ("Bravo.sol", 8), ("Charlie.sol", 7), ("Delta.sol", 6)]
        .into_iter()
        .enumerate()
        .flat_map(|(idx, (unit, severity))| {
            [2 * idx + 1, 2 * idx + 2].map(|n| {
                confirming_worker(&format!("w{n}"), topic, vec![finding(unit, cat, severity)])
            })
        })
        .collect()
}

#[tokio::test]
async fn test_eight_workers_converge_and_confirm() {
    common::setup_test_logging();

    // Workers 2, 5 and 7 independently flag Vault.sol; everyone else is alone.
    let cat = Category::AccountingMismatch;
    let workers = vec![
        confirming_worker("w1", "oracle", vec![finding("Oracle.sol", Category::TrustAssumption, 5)]),
        confirming_worker("w2", "vault", vec![finding("Vault.sol", cat, 8)]),
        confirming_worker("w3", "router", vec![finding("Router.sol", Category::Ordering, 4)]),
        confirming_worker("w4", "token", vec![finding("Token.sol", Category::ValueComputation, 3)]),
        confirming_worker("w5", "vault", vec![finding("Vault.sol", cat, 6)]),
        confirming_worker(
            "w6",
            "governance",
            vec![finding("Governance.sol", Category::AccessControl, 6)],
        ),
        confirming_worker("w7", "vault", vec![finding("Vault.sol", cat, 9)]),
        MockWorker::new("w8", "bridge").on_broad(MockReply::failure("analysis crashed")),
    ];
    let h = harness(workers, MockOracle::new());

    let run = h.orchestrator.run(snapshot()).await.unwrap();
    let summary = &run.summary;

    assert_eq!(summary.outcome, Outcome::Found);
    assert_eq!(run.engagement.phase(), EngagementPhase::ConcludedFound);
    assert_eq!(summary.commits.len(), 1);
    assert!(summary.pivots.is_empty());
    assert_eq!(summary.convergence_points.len(), 1);
    assert_eq!(run.findings.len(), 7);

    let chain = summary.evidence_chain.as_ref().expect("evidence chain");
    assert_eq!(chain.point.region_key.unit, "Vault.sol");
    assert_eq!(chain.point.density, 3);
    assert_eq!(chain.point.severity_component, 9);
    assert_eq!(chain.point.rank, 1);
    assert_eq!(chain.point.recommended_drillers, vec!["w7", "w2", "w5"]);
    assert!(chain.proof.is_confirmed());
    assert!(chain.scenario.is_success());
    assert_eq!(chain.validation[0].outcome, CheckOutcome::Support);

    assert_eq!(summary.degraded_workers.len(), 1);
    assert_eq!(summary.degraded_workers[0].worker_id, "w8");
    assert_eq!(summary.degraded_workers[0].mode, DispatchMode::Broad);

    // Drillers are the three producers of the point.
    for (idx, worker) in h.workers[..7].iter().enumerate() {
        let expected = if [1, 4, 6].contains(&idx) { 2 } else { 1 };
        assert_eq!(worker.call_count().await, expected, "{}", worker.id());
    }
    assert_eq!(h.workers[7].call_count().await, 2, "failed worker is retried once");

    // Drillers see the gate's results alongside the point's evidence.
    let drill = h.workers[6].missions().await.remove(1);
    let thesis = drill.thesis.expect("narrow mission carries the thesis");
    assert_eq!(thesis.validation, chain.validation);
    assert_eq!(
        thesis.finding_evidence,
        vec!["Vault.sol: suspicious accounting_mismatch path".to_string()]
    );

    let outputs = h.sink.outputs().await;
    assert_eq!(outputs.iter().filter(|o| o.mode == DispatchMode::Broad).count(), 8);
    assert_eq!(outputs.iter().filter(|o| o.mode == DispatchMode::Narrow).count(), 3);

    assert_eq!(
        h.sink.phase_history().await,
        vec![
            EngagementPhase::Mapping,
            EngagementPhase::Analyzing,
            EngagementPhase::Converging,
            EngagementPhase::Committed,
            EngagementPhase::Validating,
            EngagementPhase::Drilling,
            EngagementPhase::Cooking,
            EngagementPhase::Proving,
            EngagementPhase::ConcludedFound,
        ]
    );
}

#[tokio::test]
async fn test_workers_sharing_a_finding_id_still_converge() {
    let cat = Category::AccountingMismatch;
    let shared = vec![finding("Vault.sol", cat, 8)];
    let workers = vec![
        confirming_worker("w1", "vault", shared.clone()).keep_ids(),
        confirming_worker("w2", "vault", shared).keep_ids(),
    ];
    let h = harness(workers, MockOracle::new());

    let run = h.orchestrator.run(snapshot()).await.unwrap();

    assert_eq!(run.summary.outcome, Outcome::Found);
    assert_eq!(run.findings.len(), 2);
    assert_ne!(run.findings.all()[0].id, run.findings.all()[1].id);
    let chain = run.summary.evidence_chain.as_ref().expect("evidence chain");
    assert_eq!(chain.point.density, 2);
}

#[tokio::test]
async fn test_contradicted_point_pivots_to_backup() {
    let oracle = MockOracle::new();
    oracle.set_script("Vault.sol", OracleScript::contradicting()).await;
    let h = harness(three_region_workers(), oracle);

    let run = h.orchestrator.run(snapshot()).await.unwrap();
    let summary = &run.summary;

    assert_eq!(summary.outcome, Outcome::Found);
    assert_eq!(run.engagement.pivot_count(), 1);
    // The backup is committed without re-running the synthesizer.
    assert_eq!(run.convergence_runs, 1);
    assert_eq!(summary.convergence_points.len(), 3);

    assert_eq!(summary.commits.len(), 2);
    assert_eq!(summary.commits[0].region_key.unit, "Vault.sol");
    assert_eq!(summary.commits[1].region_key.unit, "Pool.sol");

    assert_eq!(summary.pivots.len(), 1);
    assert_eq!(summary.pivots[0].pivot_number, 1);
    assert_eq!(summary.pivots[0].region_key.unit, "Vault.sol");
    assert_eq!(summary.pivots[0].abandoned_in, EngagementPhase::Validating);
    assert!(summary.pivots[0].reason.contains("value_computation"));

    let chain = summary.evidence_chain.as_ref().unwrap();
    assert_eq!(chain.point.region_key.unit, "Pool.sol");

    assert!(h.oracle.calls().await.contains(&"read_values:Vault.sol".to_string()));
}

#[tokio::test]
async fn test_three_abandonments_exhaust_without_fourth_commit() {
    let h = harness(
        four_region_workers(),
        MockOracle::with_default_script(OracleScript::contradicting()),
    );

    let run = h.orchestrator.run(snapshot()).await.unwrap();
    let summary = &run.summary;

    assert_eq!(summary.outcome, Outcome::Exhausted);
    assert_eq!(run.engagement.pivot_count(), 3);
    assert_eq!(summary.commits.len(), 3);
    assert_eq!(summary.pivots.len(), 3);
    assert!(summary
        .commits
        .iter()
        .all(|c| c.region_key.unit != "Delta.sol"));
    assert!(summary.evidence_chain.is_none());

    let numbers: Vec<u8> = summary.pivots.iter().map(|p| p.pivot_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);

    // Nothing survived the gate, so no narrow round ran.
    assert_eq!(h.total_calls().await, 8);
}

#[tokio::test]
async fn test_reconverges_once_when_backups_run_out() {
    let mut config = Config::default();
    config.synthesis.top_k = 1;
    let h = harness_with_config(
        four_region_workers(),
        MockOracle::with_default_script(OracleScript::contradicting()),
        &config,
    );

    let run = h.orchestrator.run(snapshot()).await.unwrap();
    let summary = &run.summary;

    assert_eq!(summary.outcome, Outcome::Exhausted);
    assert_eq!(run.convergence_runs, 2);
    assert_eq!(summary.convergence_points.len(), 2);

    let committed: Vec<&str> = summary
        .commits
        .iter()
        .map(|c| c.region_key.unit.as_str())
        .collect();
    assert_eq!(committed, vec!["Alpha.sol", "Bravo.sol"]);
    assert_eq!(run.engagement.pivot_count(), 2);

    // Re-convergence reuses the store; workers are not dispatched again.
    assert_eq!(h.total_calls().await, 8);
}

#[tokio::test]
async fn test_reconvergence_without_new_candidates_exhausts() {
    let cat = Category::AccountingMismatch;
    let workers = vec![
        confirming_worker("w1", "vault", vec![finding("Vault.sol", cat, 9)]),
        confirming_worker("w2", "vault", vec![finding("Vault.sol", cat, 9)]),
    ];
    let h = harness(
        workers,
        MockOracle::with_default_script(OracleScript::contradicting()),
    );

    let run = h.orchestrator.run(snapshot()).await.unwrap();

    assert_eq!(run.summary.outcome, Outcome::Exhausted);
    assert_eq!(run.convergence_runs, 2);
    assert_eq!(run.summary.commits.len(), 1);
    assert_eq!(run.engagement.pivot_count(), 1);
}

#[tokio::test]
async fn test_drill_denial_abandons_and_single_commitment_holds() {
    let h = harness(three_region_workers(), MockOracle::new());
    for worker in &h.workers {
        worker.set_narrow_override("Vault.sol", deny()).await;
    }

    let run = h.orchestrator.run(snapshot()).await.unwrap();
    let summary = &run.summary;

    assert_eq!(summary.outcome, Outcome::Found);
    assert_eq!(summary.pivots.len(), 1);
    assert_eq!(summary.pivots[0].abandoned_in, EngagementPhase::Drilling);
    assert!(summary.pivots[0].reason.contains("deny 3"));
    assert_eq!(
        summary.evidence_chain.as_ref().unwrap().point.region_key.unit,
        "Pool.sol"
    );

    // At most one point is committed at any time.
    let mut open = false;
    for phase in h.sink.phase_history().await {
        match phase {
            EngagementPhase::Committed => {
                assert!(!open, "second commit without abandoning the first");
                open = true;
            }
            EngagementPhase::Abandoned => open = false,
            _ => {}
        }
    }
}

#[tokio::test]
async fn test_failing_scenario_step_abandons_in_cooking() {
    let oracle = MockOracle::new();
    oracle
        .set_script(
            "Vault.sol",
            OracleScript {
                failing_step: Some(1),
                ..Default::default()
            },
        )
        .await;
    let h = harness(three_region_workers(), oracle);

    let run = h.orchestrator.run(snapshot()).await.unwrap();
    let summary = &run.summary;

    assert_eq!(summary.outcome, Outcome::Found);
    assert_eq!(summary.pivots[0].abandoned_in, EngagementPhase::Cooking);
    assert!(summary.pivots[0].reason.contains("step 1"));
}

#[tokio::test]
async fn test_thin_margin_killed_in_proof() {
    let oracle = MockOracle::new();
    oracle
        .set_script(
            "Vault.sol",
            OracleScript {
                draft: Some(OracleScript::profitable_draft(110.0, 100.0)),
                ..Default::default()
            },
        )
        .await;
    let h = harness(three_region_workers(), oracle);

    let run = h.orchestrator.run(snapshot()).await.unwrap();
    let summary = &run.summary;

    assert_eq!(summary.outcome, Outcome::Found);
    assert_eq!(summary.pivots[0].abandoned_in, EngagementPhase::Proving);
    assert!(summary.pivots[0].reason.contains("adverse"));
    assert_eq!(
        summary.evidence_chain.as_ref().unwrap().point.region_key.unit,
        "Pool.sol"
    );
}

#[tokio::test]
async fn test_invariant_category_found_without_profit() {
    let cat = Category::Availability;
    let workers = vec![
        confirming_worker("w1", "availability", vec![finding("Pause.sol", cat, 7)]),
        confirming_worker("w2", "availability", vec![finding("Pause.sol", cat, 6)]),
    ];
    let h = harness(workers, MockOracle::new());

    let run = h.orchestrator.run(snapshot()).await.unwrap();

    assert_eq!(run.summary.outcome, Outcome::Found);
    let chain = run.summary.evidence_chain.unwrap();
    assert!(chain.scenario.invariant_broken);
    assert!(chain
        .validation
        .iter()
        .all(|r| r.outcome == CheckOutcome::NotApplicable));
}

#[tokio::test]
async fn test_disjoint_findings_conclude_without_convergence() {
    let cat = Category::Ordering;
    let workers = vec![
        confirming_worker("w1", "ordering", vec![finding("Vault.sol", cat, 9)]),
        confirming_worker("w2", "ordering", vec![finding("Pool.sol", cat, 9)]),
        confirming_worker("w3", "ordering", vec![finding("Token.sol", cat, 9)]),
    ];
    let h = harness(workers, MockOracle::new());

    let run = h.orchestrator.run(snapshot()).await.unwrap();

    assert_eq!(run.summary.outcome, Outcome::NoConvergence);
    assert!(run.summary.commits.is_empty());
    assert!(run.summary.convergence_points.is_empty());
    assert!(run.summary.evidence_chain.is_none());
    assert_eq!(run.engagement.pivot_count(), 0);
    assert!(h.oracle.calls().await.is_empty());
}

#[tokio::test]
async fn test_missing_codegraph_blocks_before_dispatch() {
    let dir = common::temp_dir();
    let missing = dir.path().join("codegraph");
    let reference = TargetRef::new("vault", missing.display().to_string());
    let h = harness(three_region_workers(), MockOracle::new());

    let run = h
        .orchestrator
        .run(TargetSnapshot::Codegraph(reference))
        .await
        .unwrap();

    assert_eq!(run.summary.outcome, Outcome::Blocked);
    assert!(run.summary.blocked_reason.is_some());
    assert!(run.summary.commits.is_empty());
    assert_eq!(h.total_calls().await, 0);
}

#[tokio::test]
async fn test_graph_violating_its_schema_blocks() {
    let graph = TargetGraph::from_sources(
        TargetRef::new("vault", "memory"),
        "## Node Types\n- func\n\n## Edge Types\n- CALLS\n",
        "- func:Vault.withdraw\n",
        "- CALLS | func:Vault.withdraw -> func:Vault.missing\n",
    );
    let h = harness(three_region_workers(), MockOracle::new());

    let run = h
        .orchestrator
        .run(TargetSnapshot::Loaded(graph))
        .await
        .unwrap();

    assert_eq!(run.summary.outcome, Outcome::Blocked);
    let reason = run.summary.blocked_reason.unwrap();
    assert!(reason.contains("func:Vault.missing"), "{reason}");
    assert_eq!(h.total_calls().await, 0);
}

#[tokio::test]
async fn test_summary_persisted_to_filesystem() {
    let dir = common::temp_dir();
    let sink = Arc::new(FilesystemArtifactSink::new(dir.path()));
    let workers: Vec<Arc<dyn Worker>> = three_region_workers()
        .into_iter()
        .map(|w| Arc::new(w) as Arc<dyn Worker>)
        .collect();
    let config = Config::default();
    let dispatcher = WorkerDispatcher::new(workers, &config.dispatcher).unwrap();
    let oracle = Arc::new(MockOracle::new());
    let orchestrator =
        EngagementOrchestrator::new(dispatcher, oracle.clone(), oracle, sink.clone(), &config);

    let run = orchestrator.run(snapshot()).await.unwrap();
    let id = run.summary.engagement_id;

    let stored = sink.read_summary(id).await.unwrap().expect("summary on disk");
    assert_eq!(stored.outcome, Outcome::Found);
    assert_eq!(stored.commits.len(), 1);

    let listed = sink.list_summaries().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].engagement_id, id);

    let round_one = sink.worker_output_path(id, 1, DispatchMode::Broad, "w1");
    assert!(round_one.exists(), "{}", round_one.display());
}
