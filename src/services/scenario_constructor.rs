//! Scenario Constructor: drafts a stepwise scenario for the committed point and
//! self-tests it one step at a time.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::models::{
    ConvergencePoint, Finding, Scenario, ScenarioDraft, ScenarioStatus, ValidationResult,
};
use crate::domain::ports::{DraftRequest, ScenarioBackend};

/// Builds scenarios through a scenario backend.
pub struct ScenarioConstructor {
    backend: Arc<dyn ScenarioBackend>,
}

impl ScenarioConstructor {
    pub fn new(backend: Arc<dyn ScenarioBackend>) -> Self {
        Self { backend }
    }

    /// Draft and test a scenario.
    ///
    /// Never fails outright: backend errors, rejected drafts and failing steps
    /// all produce a `FAILED` scenario carrying the reason.
    pub async fn construct(
        &self,
        engagement_id: Uuid,
        point: &ConvergencePoint,
        validation: &[ValidationResult],
        drill_findings: &[Finding],
    ) -> Scenario {
        let request = DraftRequest {
            engagement_id,
            point: point.clone(),
            validation: validation.to_vec(),
            drill_findings: drill_findings.to_vec(),
        };

        let draft = match self.backend.draft(&request).await {
            Ok(draft) => draft,
            Err(e) => {
                let mut scenario = Scenario::from_draft(ScenarioDraft::default());
                scenario.fail(None, format!("draft failed: {e}"));
                return scenario;
            }
        };

        let mut scenario = Scenario::from_draft(draft);
        if let Some(reason) = reject_draft(point, &scenario) {
            warn!(region = %point.region_key, reason = %reason, "Scenario draft rejected");
            scenario.fail(None, reason);
            return scenario;
        }

        self.test_steps(point, &mut scenario).await;
        if scenario.status == ScenarioStatus::Failed {
            return scenario;
        }

        scenario.net_value = scenario.benefit_model.total() - scenario.cost_model.total();

        if point.primary_category.is_profit_motivated() {
            if scenario.net_value > 0.0 {
                scenario.status = ScenarioStatus::Success;
            } else {
                let net = scenario.net_value;
                scenario.fail(None, format!("net value {net} is not positive"));
            }
        } else {
            match self.backend.invariant_broken(point, &scenario).await {
                Ok(report) if report.holds == Some(true) => {
                    scenario.invariant_broken = true;
                    scenario.status = ScenarioStatus::Success;
                }
                Ok(report) => {
                    scenario.fail(
                        None,
                        format!("invariant not shown broken: {}", report.evidence.join("; ")),
                    );
                }
                Err(e) => scenario.fail(None, format!("invariant check failed: {e}")),
            }
        }

        info!(
            region = %point.region_key,
            status = ?scenario.status,
            net_value = scenario.net_value,
            steps = scenario.steps.len(),
            "Scenario constructed"
        );
        scenario
    }

    /// Execute steps in order, stopping at the first failure.
    async fn test_steps(&self, point: &ConvergencePoint, scenario: &mut Scenario) {
        if let Err(e) = self.backend.reset(point).await {
            scenario.fail(None, format!("sandbox reset failed: {e}"));
            return;
        }

        for idx in 0..scenario.steps.len() {
            let observation = match self.backend.execute_step(idx, &scenario.steps[idx]).await {
                Ok(observation) => observation,
                Err(e) => {
                    scenario.fail(Some(idx), format!("step {idx} errored: {e}"));
                    return;
                }
            };

            let reason = if !observation.precondition_met {
                Some(format!("step {idx} precondition not met: {}", observation.detail))
            } else if !observation.postcondition_met {
                Some(format!("step {idx} postcondition not met: {}", observation.detail))
            } else {
                None
            };

            scenario.steps[idx].observation = Some(observation);
            if let Some(reason) = reason {
                scenario.fail(Some(idx), reason);
                return;
            }
        }
    }
}

fn reject_draft(point: &ConvergencePoint, scenario: &Scenario) -> Option<String> {
    if scenario.steps.is_empty() {
        return Some("draft has no steps".to_string());
    }
    let missing: Vec<String> = point
        .primary_category
        .implied_costs()
        .into_iter()
        .filter(|kind| !scenario.cost_model.covers(*kind))
        .map(|kind| format!("{kind:?}"))
        .collect();
    if missing.is_empty() {
        None
    } else {
        Some(format!(
            "cost model omits implied cost kinds for {}: {}",
            point.primary_category,
            missing.join(", ")
        ))
    }
}
