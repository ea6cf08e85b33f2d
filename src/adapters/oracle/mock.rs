//! Scripted oracle for tests and dry runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    BenefitModel, ConvergencePoint, CostKind, CostModel, CycleOutcome, DifferentialReading,
    IntermediateState, ProbeReport, ReplayTrace, Scenario, ScenarioDraft, ScenarioStep,
    StepObservation, TrustReading,
};
use crate::domain::ports::{DraftRequest, ScenarioBackend, TargetProbe};

/// Canned answers for one region.
#[derive(Debug, Clone)]
pub struct OracleScript {
    pub values: ProbeReport,
    /// `None` makes the differential probe fail.
    pub differential: Option<DifferentialReading>,
    pub replay: Option<ReplayTrace>,
    pub trust: Vec<TrustReading>,
    pub unauthenticated: ProbeReport,
    pub external_influence: ProbeReport,
    /// Value extracted per simulated cycle.
    pub extracted_per_cycle: f64,
    pub cost_per_cycle: f64,
    /// `None` makes drafting fail.
    pub draft: Option<ScenarioDraft>,
    /// Step whose postcondition is not met.
    pub failing_step: Option<usize>,
    pub invariant_broken: bool,
}

impl Default for OracleScript {
    fn default() -> Self {
        Self {
            values: ProbeReport::holds("assumed relationship observed on live values"),
            differential: Some(DifferentialReading {
                preview: 100.0,
                executed: 97.0,
                evidence: vec![],
            }),
            replay: None,
            trust: Vec::new(),
            unauthenticated: ProbeReport::holds("entrypoint has no caller check"),
            external_influence: ProbeReport::holds("read state is externally writable"),
            extracted_per_cycle: 10.0,
            cost_per_cycle: 1.0,
            draft: Some(OracleScript::profitable_draft(1_000.0, 50.0)),
            failing_step: None,
            invariant_broken: true,
        }
    }
}

impl OracleScript {
    /// A two-step draft whose cost model covers every cost kind.
    pub fn profitable_draft(benefit: f64, cost: f64) -> ScenarioDraft {
        let share = cost / 4.0;
        ScenarioDraft {
            steps: vec![
                ScenarioStep::new("target funded", "prepare position", "position open"),
                ScenarioStep::new("position open", "trigger entrypoint", "value extracted"),
            ],
            cost_model: CostModel::default()
                .with("execution", CostKind::Execution, share)
                .with("protocol fee", CostKind::ProtocolFee, share)
                .with("capital", CostKind::Capital, share)
                .with("slippage", CostKind::Slippage, share),
            benefit_model: BenefitModel::default().with("extracted value", benefit),
        }
    }

    /// Gate evidence contradicting value, ordering, access and economic theses.
    pub fn contradicting() -> Self {
        Self {
            values: ProbeReport::refuted("live values satisfy the invariant"),
            replay: Some(ReplayTrace {
                operation: "latest deposit".to_string(),
                states: vec![IntermediateState {
                    label: "after transfer".to_string(),
                    consistent: true,
                }],
            }),
            unauthenticated: ProbeReport::refuted("caller must hold a role"),
            extracted_per_cycle: 1.0,
            cost_per_cycle: 10.0,
            ..Default::default()
        }
    }
}

/// Mock oracle answering from per-region-unit scripts.
pub struct MockOracle {
    default_script: OracleScript,
    scripts: Arc<RwLock<HashMap<String, OracleScript>>>,
    /// Script of the most recently reset sandbox, used by step execution.
    active: Arc<RwLock<Option<OracleScript>>>,
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::with_default_script(OracleScript::default())
    }

    pub fn with_default_script(script: OracleScript) -> Self {
        Self {
            default_script: script,
            scripts: Arc::new(RwLock::new(HashMap::new())),
            active: Arc::new(RwLock::new(None)),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn set_script(&self, unit: impl Into<String>, script: OracleScript) {
        self.scripts.write().await.insert(unit.into(), script);
    }

    /// Operations answered so far, as `op:unit`.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.read().await.clone()
    }

    async fn script(&self, op: &str, point: &ConvergencePoint) -> OracleScript {
        let unit = &point.region_key.unit;
        self.calls.write().await.push(format!("{op}:{unit}"));
        self.scripts
            .read()
            .await
            .get(unit)
            .cloned()
            .unwrap_or_else(|| self.default_script.clone())
    }
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TargetProbe for MockOracle {
    async fn read_values(&self, point: &ConvergencePoint) -> DomainResult<ProbeReport> {
        Ok(self.script("read_values", point).await.values)
    }

    async fn differential(&self, point: &ConvergencePoint) -> DomainResult<DifferentialReading> {
        self.script("differential", point)
            .await
            .differential
            .ok_or_else(|| DomainError::ProbeFailed("differential not scripted".to_string()))
    }

    async fn replay_recent(&self, point: &ConvergencePoint) -> DomainResult<Option<ReplayTrace>> {
        Ok(self.script("replay_recent", point).await.replay)
    }

    async fn trust_properties(&self, point: &ConvergencePoint) -> DomainResult<Vec<TrustReading>> {
        Ok(self.script("trust_properties", point).await.trust)
    }

    async fn caller_unauthenticated(&self, point: &ConvergencePoint) -> DomainResult<ProbeReport> {
        Ok(self.script("caller_unauthenticated", point).await.unauthenticated)
    }

    async fn external_state_influence(
        &self,
        point: &ConvergencePoint,
    ) -> DomainResult<ProbeReport> {
        Ok(self
            .script("external_state_influence", point)
            .await
            .external_influence)
    }

    async fn simulate_cycles(
        &self,
        point: &ConvergencePoint,
        iterations: u32,
    ) -> DomainResult<CycleOutcome> {
        let script = self.script("simulate_cycles", point).await;
        let n = f64::from(iterations);
        Ok(CycleOutcome {
            iterations,
            extracted: script.extracted_per_cycle * n,
            cost: script.cost_per_cycle * n,
        })
    }
}

#[async_trait]
impl ScenarioBackend for MockOracle {
    async fn draft(&self, request: &DraftRequest) -> DomainResult<ScenarioDraft> {
        self.script("draft", &request.point)
            .await
            .draft
            .ok_or_else(|| DomainError::BackendFailed("no scenario could be drafted".to_string()))
    }

    async fn reset(&self, point: &ConvergencePoint) -> DomainResult<()> {
        let script = self.script("reset", point).await;
        *self.active.write().await = Some(script);
        Ok(())
    }

    async fn execute_step(
        &self,
        index: usize,
        step: &ScenarioStep,
    ) -> DomainResult<StepObservation> {
        self.calls.write().await.push(format!("execute_step:{index}"));
        let active = self.active.read().await;
        let Some(script) = active.as_ref() else {
            return Err(DomainError::BackendFailed(
                "step executed before sandbox reset".to_string(),
            ));
        };
        if script.failing_step == Some(index) {
            Ok(StepObservation {
                precondition_met: true,
                postcondition_met: false,
                detail: format!("'{}' not reached", step.expected_postcondition),
            })
        } else {
            Ok(StepObservation::passed(step.expected_postcondition.clone()))
        }
    }

    async fn invariant_broken(
        &self,
        point: &ConvergencePoint,
        _scenario: &Scenario,
    ) -> DomainResult<ProbeReport> {
        let script = self.script("invariant_broken", point).await;
        Ok(if script.invariant_broken {
            ProbeReport::holds("invariant violated after the final step")
        } else {
            ProbeReport::refuted("invariant intact after the final step")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Category, Region, RegionKey};

    fn point(unit: &str) -> ConvergencePoint {
        ConvergencePoint {
            region_key: RegionKey::from_region(&Region::unit(unit)),
            contributing_producers: vec!["a".into(), "b".into()],
            density: 2,
            severity_component: 7,
            novelty_component: 1.0,
            distinct_categories: vec![Category::Ordering],
            primary_category: Category::Ordering,
            composite_score: 1.0,
            rank: 1,
            finding_ids: vec![],
            recommended_drillers: vec![],
        }
    }

    #[tokio::test]
    async fn test_per_unit_script_overrides_default() {
        let oracle = MockOracle::new();
        oracle
            .set_script("Pool.sol", OracleScript::contradicting())
            .await;

        let pool = oracle.read_values(&point("Pool.sol")).await.unwrap();
        assert_eq!(pool.holds, Some(false));
        let vault = oracle.read_values(&point("Vault.sol")).await.unwrap();
        assert_eq!(vault.holds, Some(true));
    }

    #[tokio::test]
    async fn test_steps_require_reset_and_follow_active_script() {
        let oracle = MockOracle::new();
        let step = ScenarioStep::new("a", "b", "c");
        assert!(oracle.execute_step(0, &step).await.is_err());

        oracle
            .set_script(
                "Vault.sol",
                OracleScript {
                    failing_step: Some(1),
                    ..Default::default()
                },
            )
            .await;
        oracle.reset(&point("Vault.sol")).await.unwrap();
        assert!(oracle.execute_step(0, &step).await.unwrap().succeeded());
        assert!(!oracle.execute_step(1, &step).await.unwrap().succeeded());
    }

    #[tokio::test]
    async fn test_cycles_scale_with_iterations() {
        let outcome = MockOracle::new()
            .simulate_cycles(&point("Vault.sol"), 10)
            .await
            .unwrap();
        assert!((outcome.net() - 90.0).abs() < 1e-9);
    }
}
