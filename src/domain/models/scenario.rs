//! Scenario and proof models.
//!
//! A scenario is the stepwise candidate result built for exactly one committed
//! convergence point. It is discarded whenever that point is abandoned.

use serde::{Deserialize, Serialize};

use super::finding::CostKind;

/// One step of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioStep {
    pub precondition: String,
    pub action: String,
    pub expected_postcondition: String,
    /// Filled in once the step has been executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<StepObservation>,
}

impl ScenarioStep {
    pub fn new(
        precondition: impl Into<String>,
        action: impl Into<String>,
        expected_postcondition: impl Into<String>,
    ) -> Self {
        Self {
            precondition: precondition.into(),
            action: action.into(),
            expected_postcondition: expected_postcondition.into(),
            observation: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.observation.as_ref().is_some_and(StepObservation::succeeded)
    }
}

/// What happened when a step was executed against the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepObservation {
    pub precondition_met: bool,
    pub postcondition_met: bool,
    #[serde(default)]
    pub detail: String,
}

impl StepObservation {
    pub fn passed(detail: impl Into<String>) -> Self {
        Self {
            precondition_met: true,
            postcondition_met: true,
            detail: detail.into(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.precondition_met && self.postcondition_met
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostItem {
    pub label: String,
    pub kind: CostKind,
    pub amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostModel {
    pub items: Vec<CostItem>,
}

impl CostModel {
    pub fn total(&self) -> f64 {
        self.items.iter().map(|i| i.amount).sum()
    }

    pub fn covers(&self, kind: CostKind) -> bool {
        self.items.iter().any(|i| i.kind == kind)
    }

    pub fn with(mut self, label: impl Into<String>, kind: CostKind, amount: f64) -> Self {
        self.items.push(CostItem {
            label: label.into(),
            kind,
            amount,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenefitItem {
    pub label: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenefitModel {
    pub items: Vec<BenefitItem>,
}

impl BenefitModel {
    pub fn total(&self) -> f64 {
        self.items.iter().map(|i| i.amount).sum()
    }

    pub fn with(mut self, label: impl Into<String>, amount: f64) -> Self {
        self.items.push(BenefitItem {
            label: label.into(),
            amount,
        });
        self
    }
}

/// Backend proposal before any step has been tested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDraft {
    pub steps: Vec<ScenarioStep>,
    #[serde(default)]
    pub cost_model: CostModel,
    #[serde(default)]
    pub benefit_model: BenefitModel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioStatus {
    Building,
    Success,
    Failed,
}

/// Why a scenario failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioFailure {
    /// Zero-based index of the first failing step, if a step failed.
    pub step_index: Option<usize>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub steps: Vec<ScenarioStep>,
    pub cost_model: CostModel,
    pub benefit_model: BenefitModel,
    pub net_value: f64,
    pub status: ScenarioStatus,
    /// Set for invariant categories once the violation was demonstrated.
    #[serde(default)]
    pub invariant_broken: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ScenarioFailure>,
}

impl Scenario {
    pub fn from_draft(draft: ScenarioDraft) -> Self {
        Self {
            steps: draft.steps,
            cost_model: draft.cost_model,
            benefit_model: draft.benefit_model,
            net_value: 0.0,
            status: ScenarioStatus::Building,
            invariant_broken: false,
            failure: None,
        }
    }

    pub fn fail(&mut self, step_index: Option<usize>, reason: impl Into<String>) {
        self.status = ScenarioStatus::Failed;
        self.failure = Some(ScenarioFailure {
            step_index,
            reason: reason.into(),
        });
    }

    pub fn is_success(&self) -> bool {
        self.status == ScenarioStatus::Success
    }
}

/// Outcome of the proof and review stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProofVerdict {
    Confirmed { evidence: Vec<String> },
    Killed { falsified: String },
}

impl ProofVerdict {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }
}
