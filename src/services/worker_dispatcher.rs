//! Worker Dispatcher service for concurrent fan-out/fan-in worker rounds.
//!
//! Every registered worker runs in its own task, bounded by a semaphore. Each
//! attempt has a hard timeout; a timeout, an explicit failure or a contract
//! violation earns exactly one retry, after which the worker is recorded as
//! degraded. The dispatcher returns only once every worker has a final outcome,
//! and accepted findings are written to the store before it returns.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ConvergencePoint, DispatchMode, DispatchReport, DispatcherConfig, Finding, Mission,
    TargetGraph, Thesis, ValidationResult, WorkerOutcome, WorkerRequest, WorkerResponse,
    WorkerStatus,
};
use crate::domain::ports::{ArtifactSink, Worker};
use crate::services::finding_store::FindingStore;

/// Attempts per worker per round (the first try plus one retry).
pub const MAX_ATTEMPTS: u32 = 2;

/// Upper bound on drillers in a narrow round.
pub const MAX_NARROW_WORKERS: usize = 3;

/// Shared read-only context of one dispatch round.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub engagement_id: Uuid,
    pub target: Arc<TargetGraph>,
    /// Sequence number of this round within the engagement.
    pub round: u32,
}

/// Runs the worker registry against a shared snapshot.
pub struct WorkerDispatcher {
    workers: Vec<Arc<dyn Worker>>,
    max_concurrency: usize,
    narrow_workers: usize,
    attempt_timeout: Duration,
    sink: Option<Arc<dyn ArtifactSink>>,
}

impl WorkerDispatcher {
    /// Create a dispatcher over a fixed registry.
    ///
    /// Worker ids must be unique and non-empty.
    pub fn new(workers: Vec<Arc<dyn Worker>>, config: &DispatcherConfig) -> DomainResult<Self> {
        let mut seen = HashSet::new();
        for worker in &workers {
            if worker.id().trim().is_empty() {
                return Err(DomainError::ValidationFailed(
                    "worker id cannot be empty".to_string(),
                ));
            }
            if !seen.insert(worker.id().to_string()) {
                return Err(DomainError::ValidationFailed(format!(
                    "worker id registered twice: {}",
                    worker.id()
                )));
            }
        }

        Ok(Self {
            workers,
            max_concurrency: config.max_concurrency.max(1),
            narrow_workers: config.narrow_workers.clamp(1, MAX_NARROW_WORKERS),
            attempt_timeout: Duration::from_secs(config.worker_timeout_secs),
            sink: None,
        })
    }

    /// Persist every worker's raw output through `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Override the per-attempt timeout.
    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Run the full registry over the target (analysis phase).
    pub async fn dispatch_broad(
        &self,
        ctx: &DispatchContext,
        store: &mut FindingStore,
        focus: &[String],
    ) -> DomainResult<DispatchReport> {
        let assignments = self
            .workers
            .iter()
            .map(|worker| {
                let mission = Mission {
                    topic: worker.topic().to_string(),
                    mode: DispatchMode::Broad,
                    focus: focus.to_vec(),
                    thesis: None,
                };
                (Arc::clone(worker), mission)
            })
            .collect();

        self.run(ctx, store, DispatchMode::Broad, assignments).await
    }

    /// Ask up to three drillers to confirm, deny or refine the committed thesis.
    ///
    /// `validation` is the gate's full result set for the point; drillers
    /// receive it on the thesis.
    pub async fn dispatch_narrow(
        &self,
        ctx: &DispatchContext,
        store: &mut FindingStore,
        point: &ConvergencePoint,
        validation: &[ValidationResult],
    ) -> DomainResult<DispatchReport> {
        let mut finding_evidence: Vec<String> = Vec::new();
        for finding in point.finding_ids.iter().filter_map(|id| store.get(*id)) {
            for evidence in &finding.evidence {
                if !finding_evidence.contains(evidence) {
                    finding_evidence.push(evidence.clone());
                }
            }
        }
        let thesis = Thesis {
            region_key: point.region_key.clone(),
            statement: point.thesis(),
            finding_evidence,
            validation: validation.to_vec(),
        };

        let assignments = self
            .select_drillers(point)
            .into_iter()
            .map(|worker| {
                let mission = Mission {
                    topic: worker.topic().to_string(),
                    mode: DispatchMode::Narrow,
                    focus: vec![point.region_key.to_string()],
                    thesis: Some(thesis.clone()),
                };
                (worker, mission)
            })
            .collect();

        self.run(ctx, store, DispatchMode::Narrow, assignments).await
    }

    /// Drillers for a point: its recommended producers that are registered,
    /// topped up from the rest of the registry in registry order.
    pub fn select_drillers(&self, point: &ConvergencePoint) -> Vec<Arc<dyn Worker>> {
        let mut selected: Vec<Arc<dyn Worker>> = Vec::new();

        for id in &point.recommended_drillers {
            if selected.len() >= self.narrow_workers {
                break;
            }
            if let Some(worker) = self.workers.iter().find(|w| w.id() == id) {
                selected.push(Arc::clone(worker));
            }
        }

        for worker in &self.workers {
            if selected.len() >= self.narrow_workers {
                break;
            }
            if !selected.iter().any(|s| s.id() == worker.id()) {
                selected.push(Arc::clone(worker));
            }
        }

        selected
    }

    async fn run(
        &self,
        ctx: &DispatchContext,
        store: &mut FindingStore,
        mode: DispatchMode,
        assignments: Vec<(Arc<dyn Worker>, Mission)>,
    ) -> DomainResult<DispatchReport> {
        info!(
            engagement_id = %ctx.engagement_id,
            round = ctx.round,
            mode = %mode,
            workers = assignments.len(),
            "Dispatching workers"
        );

        let prior_context = store.snapshot();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut handles = Vec::with_capacity(assignments.len());

        for (worker, mission) in assignments {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| DomainError::ValidationFailed("Semaphore error".to_string()))?;

            let worker_id = worker.id().to_string();
            let request = WorkerRequest {
                engagement_id: ctx.engagement_id,
                target: Arc::clone(&ctx.target),
                mission,
                prior_context: Arc::clone(&prior_context),
            };
            let attempt_timeout = self.attempt_timeout;

            let handle = tokio::spawn(async move {
                let _permit = permit;
                execute_worker(worker, request, attempt_timeout).await
            });

            handles.push((worker_id, handle));
        }

        // Join barrier: every registered worker ends up in the report.
        let (worker_ids, handles): (Vec<String>, Vec<_>) = handles.into_iter().unzip();
        let joined = join_all(handles).await;
        let mut outcomes = Vec::with_capacity(joined.len());
        for (worker_id, joined) in worker_ids.into_iter().zip(joined) {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(worker_id = %worker_id, error = %e, "Worker task aborted");
                    WorkerOutcome {
                        worker_id,
                        status: WorkerStatus::Degraded,
                        attempts: 1,
                        findings: vec![],
                        verdict: None,
                        gap: Some("worker task aborted".to_string()),
                        attempt_errors: vec![e.to_string()],
                        rejected_response: None,
                        duration_ms: 0,
                    }
                }
            };
            outcomes.push(outcome);
        }

        remint_clashing_ids(&mut outcomes);

        for outcome in &outcomes {
            if let Some(sink) = &self.sink {
                sink.write_worker_output(ctx.engagement_id, ctx.round, mode, outcome)
                    .await?;
            }
            if !outcome.is_degraded() {
                store.put_all(outcome.findings.iter().cloned())?;
            }
        }

        let report = DispatchReport { mode, outcomes };
        info!(
            engagement_id = %ctx.engagement_id,
            round = ctx.round,
            mode = %mode,
            completed = report.completed_count(),
            degraded = report.degraded().count(),
            accepted_findings = report.accepted_findings(),
            "Dispatch round complete"
        );
        Ok(report)
    }
}

/// Run one worker with timeout and a single retry.
async fn execute_worker(
    worker: Arc<dyn Worker>,
    request: WorkerRequest,
    attempt_timeout: Duration,
) -> WorkerOutcome {
    let start = Instant::now();
    let worker_id = worker.id().to_string();
    let mode = request.mission.mode;
    let prior_ids: HashSet<Uuid> = request.prior_context.iter().map(|f| f.id).collect();
    let mut attempt_errors = Vec::new();
    let mut rejected_response = None;

    for attempt in 1..=MAX_ATTEMPTS {
        if attempt > 1 {
            debug!(worker_id = %worker_id, attempt, "Retrying worker");
        }

        let error = match timeout(attempt_timeout, worker.invoke(request.clone())).await {
            Err(_) => DomainError::WorkerTimeout {
                worker_id: worker_id.clone(),
                timeout_secs: attempt_timeout.as_secs(),
            },
            Ok(Err(e)) => e,
            Ok(Ok(mut response)) => {
                for finding in &mut response.findings {
                    finding.producer_id = worker_id.clone();
                }
                match check_contract(&response, &request.mission, &prior_ids) {
                    Ok(()) => {
                        debug!(
                            worker_id = %worker_id,
                            attempt,
                            findings = response.findings.len(),
                            mode = %mode,
                            "Worker completed"
                        );
                        return WorkerOutcome {
                            worker_id,
                            status: WorkerStatus::Completed,
                            attempts: attempt,
                            findings: response.findings,
                            verdict: response.verdict,
                            gap: None,
                            attempt_errors,
                            rejected_response: None,
                            duration_ms: elapsed_ms(start),
                        };
                    }
                    Err(reason) => {
                        rejected_response = Some(response);
                        DomainError::WorkerContractViolation {
                            worker_id: worker_id.clone(),
                            reason,
                        }
                    }
                }
            }
        };

        warn!(
            worker_id = %worker_id,
            attempt,
            max_attempts = MAX_ATTEMPTS,
            error = %error,
            "Worker attempt failed"
        );
        attempt_errors.push(error.to_string());
    }

    WorkerOutcome {
        worker_id,
        status: WorkerStatus::Degraded,
        attempts: MAX_ATTEMPTS,
        findings: vec![],
        verdict: None,
        gap: attempt_errors.last().cloned(),
        attempt_errors,
        rejected_response,
        duration_ms: elapsed_ms(start),
    }
}

/// Give a fresh id to any accepted finding whose id an earlier worker in the
/// same round already returned.
///
/// Workers that derive ids from content can legitimately agree on one; each
/// copy is still an independent observation by its own producer.
fn remint_clashing_ids(outcomes: &mut [WorkerOutcome]) {
    let mut seen = HashSet::new();
    for outcome in outcomes.iter_mut().filter(|o| !o.is_degraded()) {
        for finding in &mut outcome.findings {
            if seen.insert(finding.id) {
                continue;
            }
            let fresh = Uuid::new_v4();
            warn!(
                worker_id = %outcome.worker_id,
                finding_id = %finding.id,
                reminted_id = %fresh,
                "Finding id already returned this round, re-minted"
            );
            finding.id = fresh;
            seen.insert(fresh);
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Output-quality contract for one completed attempt.
fn check_contract(
    response: &WorkerResponse,
    mission: &Mission,
    prior_ids: &HashSet<Uuid>,
) -> Result<(), String> {
    match mission.mode {
        DispatchMode::Broad => {
            if response.findings.is_empty() {
                return Err("no findings returned".to_string());
            }
        }
        DispatchMode::Narrow => {
            if response.verdict.is_none() {
                return Err("no verdict on the thesis".to_string());
            }
            if response.findings.is_empty() {
                return Ok(());
            }
        }
    }

    let mut ids = HashSet::new();
    for finding in &response.findings {
        finding.validate().map_err(|e| e.to_string())?;
        if prior_ids.contains(&finding.id) || !ids.insert(finding.id) {
            return Err(format!("finding {} is not new", finding.id));
        }
    }

    if !response
        .findings
        .iter()
        .any(|f| references_mission(f, mission))
    {
        return Err(format!(
            "no finding references the mission topic '{}'",
            mission.topic
        ));
    }

    Ok(())
}

fn references_mission(finding: &Finding, mission: &Mission) -> bool {
    finding.references_topic(&mission.topic)
        || mission
            .thesis
            .as_ref()
            .is_some_and(|t| t.region_key.contains(&finding.region))
}
