//! Validation gate results and the probe readings they are computed from.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a gate check, in battery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckId {
    ValueComputation,
    Differential,
    Ordering,
    TrustAssumption,
    PermissionlessExternalState,
    EconomicViability,
}

impl CheckId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValueComputation => "value_computation",
            Self::Differential => "differential",
            Self::Ordering => "ordering",
            Self::TrustAssumption => "trust_assumption",
            Self::PermissionlessExternalState => "permissionless_external_state",
            Self::EconomicViability => "economic_viability",
        }
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckOutcome {
    Support,
    Contradict,
    NotApplicable,
}

/// Outcome of one gate check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub check_id: CheckId,
    pub outcome: CheckOutcome,
    pub evidence: Vec<String>,
}

impl ValidationResult {
    pub fn support(check_id: CheckId, evidence: Vec<String>) -> Self {
        Self {
            check_id,
            outcome: CheckOutcome::Support,
            evidence,
        }
    }

    pub fn contradict(check_id: CheckId, evidence: Vec<String>) -> Self {
        Self {
            check_id,
            outcome: CheckOutcome::Contradict,
            evidence,
        }
    }

    pub fn not_applicable(check_id: CheckId, reason: impl Into<String>) -> Self {
        Self {
            check_id,
            outcome: CheckOutcome::NotApplicable,
            evidence: vec![reason.into()],
        }
    }

    pub fn is_contradiction(&self) -> bool {
        self.outcome == CheckOutcome::Contradict
    }
}

/// Full battery outcome handed to the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateReport {
    pub results: Vec<ValidationResult>,
}

impl GateReport {
    pub fn first_contradiction(&self) -> Option<&ValidationResult> {
        self.results.iter().find(|r| r.is_contradiction())
    }

    pub fn passed(&self) -> bool {
        self.first_contradiction().is_none()
    }

    pub fn supporting(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome == CheckOutcome::Support)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Probe readings
// ---------------------------------------------------------------------------

/// Generic yes/no/unknown answer from a probe, with its evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    /// `None` when the probe could not determine the answer.
    pub holds: Option<bool>,
    #[serde(default)]
    pub evidence: Vec<String>,
}

impl ProbeReport {
    pub fn holds(evidence: impl Into<String>) -> Self {
        Self {
            holds: Some(true),
            evidence: vec![evidence.into()],
        }
    }

    pub fn refuted(evidence: impl Into<String>) -> Self {
        Self {
            holds: Some(false),
            evidence: vec![evidence.into()],
        }
    }

    pub fn unknown(evidence: impl Into<String>) -> Self {
        Self {
            holds: None,
            evidence: vec![evidence.into()],
        }
    }
}

/// Preview-vs-execute (or accounting-vs-settlement) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferentialReading {
    pub preview: f64,
    pub executed: f64,
    #[serde(default)]
    pub evidence: Vec<String>,
}

/// One intermediate state observed while replaying an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntermediateState {
    pub label: String,
    pub consistent: bool,
}

/// Replay of a known recent operation through the region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayTrace {
    pub operation: String,
    pub states: Vec<IntermediateState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    /// Single externally-owned key.
    SingleKey,
    Multisig,
    Contract,
    Governance,
    Unknown,
}

/// Trust properties of an external dependency or privileged actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustSnapshot {
    pub staleness_secs: u64,
    pub principal: PrincipalKind,
    pub available: bool,
}

/// What the thesis assumes versus what the probe observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustReading {
    pub dependency: String,
    /// `staleness_secs` here is the minimum staleness the thesis needs.
    pub assumed: TrustSnapshot,
    pub observed: TrustSnapshot,
}

/// Simulated totals for a bounded number of extraction cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub iterations: u32,
    pub extracted: f64,
    pub cost: f64,
}

impl CycleOutcome {
    pub fn net(&self) -> f64 {
        self.extracted - self.cost
    }
}
