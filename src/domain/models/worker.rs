//! Worker invocation contract and dispatch reports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::convergence::RegionKey;
use super::finding::{Finding, ProducerId};
use super::target_graph::TargetGraph;
use super::validation::ValidationResult;

/// How a dispatch round is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Full registry, independent analysis.
    Broad,
    /// At most three workers asked to judge the committed thesis.
    Narrow,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broad => f.write_str("broad"),
            Self::Narrow => f.write_str("narrow"),
        }
    }
}

/// The committed thesis handed to drilling workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thesis {
    pub region_key: RegionKey,
    pub statement: String,
    /// Evidence of the point's member findings, deduplicated, in store order.
    #[serde(default)]
    pub finding_evidence: Vec<String>,
    /// Every gate result for the committed point.
    #[serde(default)]
    pub validation: Vec<ValidationResult>,
}

/// What a worker is asked to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub topic: String,
    pub mode: DispatchMode,
    /// Triage hints for broad analysis.
    #[serde(default)]
    pub focus: Vec<String>,
    /// Present in narrow mode: the thesis to CONFIRM, DENY, or REFINE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thesis: Option<Thesis>,
}

/// Request passed to every worker invocation.
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub engagement_id: Uuid,
    pub target: Arc<TargetGraph>,
    pub mission: Mission,
    pub prior_context: Arc<[Finding]>,
}

/// A drilling worker's judgement of the committed thesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrillVerdict {
    Confirm,
    Deny,
    Refine,
}

/// What a worker returns on success.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<DrillVerdict>,
}

impl WorkerResponse {
    pub fn findings(findings: Vec<Finding>) -> Self {
        Self {
            findings,
            verdict: None,
        }
    }

    pub fn verdict(verdict: DrillVerdict, findings: Vec<Finding>) -> Self {
        Self {
            findings,
            verdict: Some(verdict),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    Completed,
    Degraded,
}

/// Completion record for one worker in one dispatch round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerOutcome {
    pub worker_id: ProducerId,
    pub status: WorkerStatus,
    pub attempts: u32,
    /// Findings accepted into the store (empty when degraded).
    pub findings: Vec<Finding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<DrillVerdict>,
    /// Why the worker is degraded; never empty for degraded workers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap: Option<String>,
    /// One entry per failed attempt.
    #[serde(default)]
    pub attempt_errors: Vec<String>,
    /// Last response a degraded worker actually returned. Never ingested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_response: Option<WorkerResponse>,
    pub duration_ms: u64,
}

impl WorkerOutcome {
    pub fn is_degraded(&self) -> bool {
        self.status == WorkerStatus::Degraded
    }
}

/// Result of one dispatch round: exactly one outcome per dispatched worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub mode: DispatchMode,
    pub outcomes: Vec<WorkerOutcome>,
}

impl DispatchReport {
    pub fn accepted_findings(&self) -> usize {
        self.outcomes.iter().map(|o| o.findings.len()).sum()
    }

    pub fn degraded(&self) -> impl Iterator<Item = &WorkerOutcome> {
        self.outcomes.iter().filter(|o| o.is_degraded())
    }

    pub fn completed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_degraded()).count()
    }

    /// Count verdicts from non-degraded workers.
    pub fn verdict_count(&self, verdict: DrillVerdict) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !o.is_degraded() && o.verdict == Some(verdict))
            .count()
    }

    pub fn outcome(&self, worker_id: &str) -> Option<&WorkerOutcome> {
        self.outcomes.iter().find(|o| o.worker_id == worker_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(id: &str, status: WorkerStatus, verdict: Option<DrillVerdict>) -> WorkerOutcome {
        WorkerOutcome {
            worker_id: id.to_string(),
            status,
            attempts: 1,
            findings: vec![],
            verdict,
            gap: None,
            attempt_errors: vec![],
            rejected_response: None,
            duration_ms: 0,
        }
    }

    #[test]
    fn test_verdict_count_ignores_degraded() {
        let report = DispatchReport {
            mode: DispatchMode::Narrow,
            outcomes: vec![
                outcome("a", WorkerStatus::Completed, Some(DrillVerdict::Confirm)),
                outcome("b", WorkerStatus::Degraded, Some(DrillVerdict::Confirm)),
                outcome("c", WorkerStatus::Completed, Some(DrillVerdict::Deny)),
            ],
        };
        assert_eq!(report.verdict_count(DrillVerdict::Confirm), 1);
        assert_eq!(report.verdict_count(DrillVerdict::Deny), 1);
        assert_eq!(report.completed_count(), 2);
        assert_eq!(report.degraded().count(), 1);
    }

    #[test]
    fn test_response_deserializes_without_verdict() {
        let response: WorkerResponse = serde_json::from_str(r#"{"findings": []}"#).unwrap();
        assert!(response.verdict.is_none());
        let response: WorkerResponse =
            serde_json::from_str(r#"{"findings": [], "verdict": "refine"}"#).unwrap();
        assert_eq!(response.verdict, Some(DrillVerdict::Refine));
    }
}
