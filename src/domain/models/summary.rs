//! Final engagement summary document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::convergence::{ConvergencePoint, RegionKey};
use super::engagement::{EngagementPhase, Outcome};
use super::finding::ProducerId;
use super::scenario::{ProofVerdict, Scenario};
use super::target_graph::TargetRef;
use super::validation::ValidationResult;
use super::worker::DispatchMode;

/// Why a point was committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub region_key: RegionKey,
    pub rank: usize,
    pub composite_score: f64,
    pub rationale: String,
}

/// Why a committed point was abandoned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotRecord {
    /// Value of the pivot counter after this abandonment.
    pub pivot_number: u8,
    pub region_key: RegionKey,
    /// Phase in which the point was abandoned.
    pub abandoned_in: EngagementPhase,
    pub reason: String,
}

/// A worker that did not deliver, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerGap {
    pub worker_id: ProducerId,
    pub mode: DispatchMode,
    pub gap: String,
}

/// Evidence chain for a confirmed result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceChain {
    pub point: ConvergencePoint,
    pub validation: Vec<ValidationResult>,
    pub scenario: Scenario,
    pub proof: ProofVerdict,
}

/// The fixed-section final summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementSummary {
    pub engagement_id: Uuid,
    pub target: TargetRef,
    /// Every ranked point produced, across convergence runs.
    pub convergence_points: Vec<ConvergencePoint>,
    pub commits: Vec<CommitRecord>,
    pub pivots: Vec<PivotRecord>,
    pub outcome: Outcome,
    /// Present only when the outcome is FOUND.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_chain: Option<EvidenceChain>,
    #[serde(default)]
    pub degraded_workers: Vec<WorkerGap>,
    /// Why the engagement was blocked, for BLOCKED outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
    pub concluded_at: DateTime<Utc>,
}
