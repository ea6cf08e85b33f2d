//! Scenario backend port - drafts scenarios and executes their steps.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    ConvergencePoint, Finding, ProbeReport, Scenario, ScenarioDraft, ScenarioStep,
    StepObservation, ValidationResult,
};

/// Everything the backend gets to draft a scenario from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftRequest {
    pub engagement_id: Uuid,
    pub point: ConvergencePoint,
    pub validation: Vec<ValidationResult>,
    pub drill_findings: Vec<Finding>,
}

/// Sandbox in which scenarios are built and replayed.
#[async_trait]
pub trait ScenarioBackend: Send + Sync {
    /// Draft steps plus cost and benefit models.
    async fn draft(&self, request: &DraftRequest) -> DomainResult<ScenarioDraft>;

    /// Restore the sandbox to the pinned snapshot.
    async fn reset(&self, point: &ConvergencePoint) -> DomainResult<()>;

    /// Execute one step and observe its pre- and postcondition.
    async fn execute_step(&self, index: usize, step: &ScenarioStep)
        -> DomainResult<StepObservation>;

    /// Whether the executed scenario left the target's invariant broken.
    async fn invariant_broken(
        &self,
        point: &ConvergencePoint,
        scenario: &Scenario,
    ) -> DomainResult<ProbeReport>;
}
