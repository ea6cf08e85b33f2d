//! Engagement Orchestrator: the commit/pivot state machine.
//!
//! The orchestrator owns the engagement and the finding store for the whole
//! run and drives the fixed phase sequence:
//!
//! ```text
//! INIT -> MAPPING -> ANALYZING -> CONVERGING -> COMMITTED -> VALIDATING
//!      -> DRILLING -> COOKING -> PROVING -> CONCLUDED_FOUND
//! ```
//!
//! Any failed step after commitment abandons the point. Abandonments count
//! against a pivot budget of three; the next backup is committed, or the
//! evidence is re-converged once, until a result is confirmed or the budget
//! runs out. The loop is iterative and every step either advances the phase
//! or concludes, so it always terminates.

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::errors::{DomainError, DomainResult, GraphError};
use crate::domain::models::{
    CommitRecord, Config, ConvergencePoint, DispatchReport, DrillVerdict, Engagement,
    EngagementPhase, EngagementSummary, EvidenceChain, Finding, GateReport, PivotRecord,
    ProofVerdict, RegionKey, TargetGraph, TargetRef, WorkerGap,
};
use crate::domain::ports::{ArtifactSink, ScenarioBackend, TargetProbe};
use crate::services::convergence_synthesizer::ConvergenceSynthesizer;
use crate::services::finding_store::FindingStore;
use crate::services::graph_triage::{triage, TriageOptions};
use crate::services::proof_review::ProofReviewer;
use crate::services::scenario_constructor::ScenarioConstructor;
use crate::services::validation_gate::ValidationGate;
use crate::services::worker_dispatcher::{DispatchContext, WorkerDispatcher};

/// Where the target snapshot comes from.
#[derive(Debug, Clone)]
pub enum TargetSnapshot {
    /// Already loaded by the caller.
    Loaded(TargetGraph),
    /// Codegraph directory at the reference's location, loaded during mapping.
    Codegraph(TargetRef),
}

impl TargetSnapshot {
    pub fn reference(&self) -> &TargetRef {
        match self {
            Self::Loaded(graph) => &graph.reference,
            Self::Codegraph(reference) => reference,
        }
    }
}

/// Tunables the state machine reads.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub belief_log_capacity: usize,
    pub reconverge: bool,
    pub focus_limit: usize,
}

impl From<&Config> for OrchestratorConfig {
    fn from(config: &Config) -> Self {
        Self {
            belief_log_capacity: config.engagement.belief_log_capacity,
            reconverge: config.engagement.reconverge,
            focus_limit: config.dispatcher.focus_limit,
        }
    }
}

/// Everything a finished engagement leaves behind.
#[derive(Debug)]
pub struct EngagementRun {
    pub engagement: Engagement,
    pub summary: EngagementSummary,
    pub findings: FindingStore,
    /// How many times the synthesizer ran.
    pub convergence_runs: u32,
}

/// Mutable bookkeeping for one run, owned by the orchestrator task.
#[derive(Default)]
struct RunState {
    store: FindingStore,
    graph: Option<Arc<TargetGraph>>,
    round: u32,
    convergence_runs: u32,
    reconverged: bool,
    ranked_points: Vec<ConvergencePoint>,
    backups: VecDeque<ConvergencePoint>,
    abandoned: Vec<RegionKey>,
    commits: Vec<CommitRecord>,
    pivots: Vec<PivotRecord>,
    degraded: Vec<WorkerGap>,
    gate_report: Option<GateReport>,
    drill_findings: Vec<Finding>,
    proof: Option<ProofVerdict>,
    blocked_reason: Option<String>,
}

impl RunState {
    fn record_gaps(&mut self, report: &DispatchReport) {
        for outcome in report.degraded() {
            self.degraded.push(WorkerGap {
                worker_id: outcome.worker_id.clone(),
                mode: report.mode,
                gap: outcome
                    .gap
                    .clone()
                    .unwrap_or_else(|| "no output".to_string()),
            });
        }
    }

    fn next_round(&mut self) -> u32 {
        self.round += 1;
        self.round
    }
}

/// Drives one engagement end to end.
pub struct EngagementOrchestrator {
    dispatcher: WorkerDispatcher,
    synthesizer: ConvergenceSynthesizer,
    gate: ValidationGate,
    constructor: ScenarioConstructor,
    reviewer: ProofReviewer,
    sink: Arc<dyn ArtifactSink>,
    config: OrchestratorConfig,
}

impl EngagementOrchestrator {
    pub fn new(
        dispatcher: WorkerDispatcher,
        probe: Arc<dyn TargetProbe>,
        backend: Arc<dyn ScenarioBackend>,
        sink: Arc<dyn ArtifactSink>,
        config: &Config,
    ) -> Self {
        Self {
            dispatcher: dispatcher.with_sink(Arc::clone(&sink)),
            synthesizer: ConvergenceSynthesizer::new(&config.synthesis),
            gate: ValidationGate::new(probe, &config.gate),
            constructor: ScenarioConstructor::new(Arc::clone(&backend)),
            reviewer: ProofReviewer::new(backend, &config.proof),
            sink,
            config: OrchestratorConfig::from(config),
        }
    }

    /// Run an engagement to its single terminal state.
    pub async fn run(&self, snapshot: TargetSnapshot) -> DomainResult<EngagementRun> {
        let mut engagement =
            Engagement::new(snapshot.reference().clone(), self.config.belief_log_capacity);
        let mut state = RunState::default();
        let mut snapshot = Some(snapshot);

        info!(
            engagement_id = %engagement.id(),
            target = %engagement.target().label,
            workers = self.dispatcher.len(),
            "Starting engagement"
        );

        self.advance(
            &mut engagement,
            EngagementPhase::Mapping,
            "map target snapshot",
            None,
        )
        .await?;

        while !engagement.is_concluded() {
            match engagement.phase() {
                EngagementPhase::Mapping => {
                    let snapshot = snapshot.take().ok_or_else(|| {
                        DomainError::ValidationFailed("target snapshot already consumed".to_string())
                    })?;
                    self.map(&mut engagement, &mut state, snapshot).await?;
                }
                EngagementPhase::Analyzing => self.analyze(&mut engagement, &mut state).await?,
                EngagementPhase::Converging => self.converge(&mut engagement, &mut state).await?,
                EngagementPhase::Committed => {
                    self.advance(
                        &mut engagement,
                        EngagementPhase::Validating,
                        "run validation gate",
                        None,
                    )
                    .await?;
                }
                EngagementPhase::Validating => self.validate(&mut engagement, &mut state).await?,
                EngagementPhase::Drilling => self.drill(&mut engagement, &mut state).await?,
                EngagementPhase::Cooking => self.cook(&mut engagement, &mut state).await?,
                EngagementPhase::Proving => self.prove(&mut engagement, &mut state).await?,
                EngagementPhase::Abandoned => self.pivot(&mut engagement, &mut state).await?,
                phase => {
                    return Err(DomainError::InvalidStateTransition {
                        from: phase.to_string(),
                        to: phase.to_string(),
                        reason: "engagement loop reached an unexpected phase".to_string(),
                    })
                }
            }
        }

        let summary = self.conclude(&engagement, &mut state).await?;
        Ok(EngagementRun {
            engagement,
            summary,
            findings: state.store,
            convergence_runs: state.convergence_runs,
        })
    }

    // ========================================================================
    // Phases
    // ========================================================================

    async fn map(
        &self,
        engagement: &mut Engagement,
        state: &mut RunState,
        snapshot: TargetSnapshot,
    ) -> DomainResult<()> {
        let loaded = match snapshot {
            TargetSnapshot::Loaded(graph) => Ok(graph),
            TargetSnapshot::Codegraph(reference) => {
                let location = reference.location.clone();
                TargetGraph::load(location, reference)
            }
        };

        let problem = match loaded {
            Err(e) => e,
            Ok(graph) => {
                let errors = graph.validate();
                if errors.is_empty() {
                    let summary = format!(
                        "snapshot mapped: {} nodes, {} edges",
                        graph.nodes.len(),
                        graph.edges.len()
                    );
                    state.graph = Some(Arc::new(graph));
                    return self
                        .advance(engagement, EngagementPhase::Analyzing, summary, None)
                        .await;
                }
                GraphError::Invalid(errors)
            }
        };

        let reason = problem.to_string();
        warn!(engagement_id = %engagement.id(), reason = %reason, "Target snapshot unusable");
        state.blocked_reason = Some(reason.clone());
        self.advance(
            engagement,
            EngagementPhase::ConcludedBlocked,
            "target snapshot unusable",
            Some(reason),
        )
        .await
    }

    async fn analyze(&self, engagement: &mut Engagement, state: &mut RunState) -> DomainResult<()> {
        let graph = self.graph(state)?;
        let focus: Vec<String> = triage(
            &graph,
            &TriageOptions {
                limit: self.config.focus_limit,
                ..Default::default()
            },
        )
        .into_iter()
        .map(|score| score.func)
        .collect();

        let ctx = DispatchContext {
            engagement_id: engagement.id(),
            target: graph,
            round: state.next_round(),
        };
        let report = self
            .dispatcher
            .dispatch_broad(&ctx, &mut state.store, &focus)
            .await?;
        state.record_gaps(&report);

        let decision = format!(
            "broad analysis: {} findings from {} workers ({} degraded)",
            report.accepted_findings(),
            report.completed_count(),
            report.degraded().count()
        );
        self.advance(
            engagement,
            EngagementPhase::Converging,
            decision,
            Some(format!("dispatch round {}", ctx.round)),
        )
        .await
    }

    async fn converge(&self, engagement: &mut Engagement, state: &mut RunState) -> DomainResult<()> {
        let points = self
            .synthesizer
            .synthesize_excluding(state.store.all(), &state.abandoned);
        state.convergence_runs += 1;
        state.ranked_points.extend(points.iter().cloned());

        info!(
            engagement_id = %engagement.id(),
            run = state.convergence_runs,
            points = points.len(),
            findings = state.store.len(),
            "Convergence synthesized"
        );

        let mut points = VecDeque::from(points);
        let Some(top) = points.pop_front() else {
            if state.reconverged {
                return self
                    .advance(
                        engagement,
                        EngagementPhase::ConcludedExhausted,
                        "re-convergence produced no new candidates",
                        None,
                    )
                    .await;
            }
            return self
                .advance(
                    engagement,
                    EngagementPhase::ConcludedNoConvergence,
                    "no region reached by two or more workers",
                    None,
                )
                .await;
        };

        state.backups = points;
        self.commit(engagement, state, top, "top-ranked convergence point")
            .await
    }

    async fn validate(&self, engagement: &mut Engagement, state: &mut RunState) -> DomainResult<()> {
        let point = self.committed(engagement)?;
        let report = self.gate.run(&point).await;

        if let Some(contradiction) = report.first_contradiction() {
            let reason = format!("validation check {} contradicted the thesis", contradiction.check_id);
            let evidence = contradiction.evidence.join("; ");
            state.gate_report = Some(report);
            return self.abandon(engagement, state, reason, evidence).await;
        }

        let decision = format!(
            "validation passed ({} supporting of {} checks)",
            report.supporting(),
            report.results.len()
        );
        state.gate_report = Some(report);
        self.advance(engagement, EngagementPhase::Drilling, decision, None)
            .await
    }

    async fn drill(&self, engagement: &mut Engagement, state: &mut RunState) -> DomainResult<()> {
        let point = self.committed(engagement)?;
        let ctx = DispatchContext {
            engagement_id: engagement.id(),
            target: self.graph(state)?,
            round: state.next_round(),
        };
        let validation = state
            .gate_report
            .as_ref()
            .map(|r| r.results.clone())
            .unwrap_or_default();
        let report = self
            .dispatcher
            .dispatch_narrow(&ctx, &mut state.store, &point, &validation)
            .await?;
        state.record_gaps(&report);

        let confirm = report.verdict_count(DrillVerdict::Confirm);
        let refine = report.verdict_count(DrillVerdict::Refine);
        let deny = report.verdict_count(DrillVerdict::Deny);
        let supporting = confirm + refine;
        let tally = format!("confirm {confirm}, refine {refine}, deny {deny}");

        if supporting == 0 || deny > supporting {
            return self
                .abandon(
                    engagement,
                    state,
                    "drillers did not support the thesis".to_string(),
                    tally,
                )
                .await;
        }

        state.drill_findings = report
            .outcomes
            .iter()
            .filter(|o| !o.is_degraded())
            .flat_map(|o| o.findings.iter().cloned())
            .collect();
        self.advance(
            engagement,
            EngagementPhase::Cooking,
            format!("drilling supports the thesis ({tally})"),
            Some(format!("dispatch round {}", ctx.round)),
        )
        .await
    }

    async fn cook(&self, engagement: &mut Engagement, state: &mut RunState) -> DomainResult<()> {
        let point = self.committed(engagement)?;
        let validation = state
            .gate_report
            .as_ref()
            .map(|r| r.results.clone())
            .unwrap_or_default();

        let scenario = self
            .constructor
            .construct(engagement.id(), &point, &validation, &state.drill_findings)
            .await;
        let success = scenario.is_success();
        let failure = scenario
            .failure
            .as_ref()
            .map(|f| f.reason.clone())
            .unwrap_or_default();
        let net_value = scenario.net_value;
        engagement.set_scenario(scenario)?;

        if !success {
            return self
                .abandon(
                    engagement,
                    state,
                    "scenario construction failed".to_string(),
                    failure,
                )
                .await;
        }

        self.advance(
            engagement,
            EngagementPhase::Proving,
            format!("scenario succeeded with net value {net_value}"),
            None,
        )
        .await
    }

    async fn prove(&self, engagement: &mut Engagement, state: &mut RunState) -> DomainResult<()> {
        let point = self.committed(engagement)?;
        let scenario = engagement.scenario().cloned().ok_or_else(|| {
            DomainError::ValidationFailed("no scenario to prove".to_string())
        })?;

        let verdict = self.reviewer.review(&point, &scenario).await;
        if let ProofVerdict::Killed { falsified } = &verdict {
            let falsified = falsified.clone();
            return self
                .abandon(engagement, state, "proof killed the scenario".to_string(), falsified)
                .await;
        }

        state.proof = Some(verdict);
        self.advance(
            engagement,
            EngagementPhase::ConcludedFound,
            "proof confirmed the scenario",
            Some(format!("region {}", point.region_key)),
        )
        .await
    }

    /// Abandonment protocol: exhaust, commit the next backup, or re-converge once.
    async fn pivot(&self, engagement: &mut Engagement, state: &mut RunState) -> DomainResult<()> {
        if engagement.pivots_exhausted() {
            return self
                .advance(
                    engagement,
                    EngagementPhase::ConcludedExhausted,
                    format!("pivot budget exhausted after {} abandonments", engagement.pivot_count()),
                    None,
                )
                .await;
        }

        if let Some(next) = state.backups.pop_front() {
            let rationale = format!(
                "pivot {}: next backup (rank {})",
                engagement.pivot_count(),
                next.rank
            );
            return self.commit(engagement, state, next, &rationale).await;
        }

        if self.config.reconverge && !state.reconverged {
            state.reconverged = true;
            return self
                .advance(
                    engagement,
                    EngagementPhase::Converging,
                    "backups exhausted; re-converge excluding abandoned regions",
                    None,
                )
                .await;
        }

        self.advance(
            engagement,
            EngagementPhase::ConcludedExhausted,
            "no candidates left",
            None,
        )
        .await
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn commit(
        &self,
        engagement: &mut Engagement,
        state: &mut RunState,
        point: ConvergencePoint,
        rationale: &str,
    ) -> DomainResult<()> {
        let record = CommitRecord {
            region_key: point.region_key.clone(),
            rank: point.rank,
            composite_score: point.composite_score,
            rationale: format!(
                "{rationale}: {} (score {:.2})",
                point.thesis(),
                point.composite_score
            ),
        };
        info!(
            engagement_id = %engagement.id(),
            region = %point.region_key,
            rank = point.rank,
            score = point.composite_score,
            "Committing to convergence point"
        );

        engagement.commit(point, record.rationale.clone())?;
        state.commits.push(record);
        state.gate_report = None;
        state.drill_findings.clear();
        state.proof = None;
        self.persist(engagement).await
    }

    async fn abandon(
        &self,
        engagement: &mut Engagement,
        state: &mut RunState,
        reason: String,
        evidence: String,
    ) -> DomainResult<()> {
        let abandoned_in = engagement.phase();
        let detail = format!("{reason}: {evidence}");
        let point = engagement.abandon(reason, Some(evidence))?;

        if let Some(point) = point {
            warn!(
                engagement_id = %engagement.id(),
                region = %point.region_key,
                phase = %abandoned_in,
                pivots = engagement.pivot_count(),
                reason = %detail,
                "Abandoning committed point"
            );
            state.pivots.push(PivotRecord {
                pivot_number: engagement.pivot_count(),
                region_key: point.region_key.clone(),
                abandoned_in,
                reason: detail,
            });
            state.abandoned.push(point.region_key);
        }
        self.persist(engagement).await
    }

    async fn advance(
        &self,
        engagement: &mut Engagement,
        next: EngagementPhase,
        decision: impl Into<String>,
        evidence: Option<String>,
    ) -> DomainResult<()> {
        let decision = decision.into();
        info!(
            engagement_id = %engagement.id(),
            from = %engagement.phase(),
            phase = %next,
            decision = %decision,
            "Engagement transition"
        );
        engagement.transition(next, decision, evidence)?;
        self.persist(engagement).await
    }

    async fn persist(&self, engagement: &Engagement) -> DomainResult<()> {
        self.sink.write_engagement_state(engagement).await
    }

    fn graph(&self, state: &RunState) -> DomainResult<Arc<TargetGraph>> {
        state
            .graph
            .clone()
            .ok_or_else(|| DomainError::ValidationFailed("target graph not mapped".to_string()))
    }

    fn committed(&self, engagement: &Engagement) -> DomainResult<ConvergencePoint> {
        engagement.committed_point().cloned().ok_or_else(|| {
            DomainError::ValidationFailed(format!(
                "no committed point in phase {}",
                engagement.phase()
            ))
        })
    }

    async fn conclude(
        &self,
        engagement: &Engagement,
        state: &mut RunState,
    ) -> DomainResult<EngagementSummary> {
        let outcome = engagement.phase().outcome().ok_or_else(|| {
            DomainError::ValidationFailed(format!(
                "engagement ended in non-terminal phase {}",
                engagement.phase()
            ))
        })?;

        let evidence_chain = match (
            engagement.committed_point(),
            engagement.scenario(),
            state.proof.take(),
        ) {
            (Some(point), Some(scenario), Some(proof)) if proof.is_confirmed() => {
                Some(EvidenceChain {
                    point: point.clone(),
                    validation: state
                        .gate_report
                        .as_ref()
                        .map(|r| r.results.clone())
                        .unwrap_or_default(),
                    scenario: scenario.clone(),
                    proof,
                })
            }
            _ => None,
        };

        let summary = EngagementSummary {
            engagement_id: engagement.id(),
            target: engagement.target().clone(),
            convergence_points: std::mem::take(&mut state.ranked_points),
            commits: std::mem::take(&mut state.commits),
            pivots: std::mem::take(&mut state.pivots),
            outcome,
            evidence_chain,
            degraded_workers: std::mem::take(&mut state.degraded),
            blocked_reason: state.blocked_reason.take(),
            concluded_at: Utc::now(),
        };

        self.sink.write_summary(&summary).await?;
        info!(
            engagement_id = %engagement.id(),
            outcome = %summary.outcome,
            pivots = engagement.pivot_count(),
            commits = summary.commits.len(),
            "Engagement concluded"
        );
        Ok(summary)
    }
}
