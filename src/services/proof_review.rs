//! Proof & Review: adversarial attempt to falsify a successful scenario.
//!
//! A scenario is confirmed only if it replays from scratch with the same
//! observations and stays profitable under adverse cost and jitter (or, for
//! invariant categories, the broken invariant is demonstrated again).

use std::sync::Arc;
use tracing::info;

use crate::domain::models::{ConvergencePoint, ProofConfig, ProofVerdict, Scenario};
use crate::domain::ports::ScenarioBackend;

/// Reviews scenarios against a scenario backend.
pub struct ProofReviewer {
    backend: Arc<dyn ScenarioBackend>,
    adverse_cost_factor: f64,
    jitter: f64,
    jitter_samples: u32,
}

impl ProofReviewer {
    pub fn new(backend: Arc<dyn ScenarioBackend>, config: &ProofConfig) -> Self {
        Self {
            backend,
            adverse_cost_factor: config.adverse_cost_factor.max(0.0),
            jitter: config.jitter.abs(),
            jitter_samples: config.jitter_samples.max(1),
        }
    }

    pub async fn review(&self, point: &ConvergencePoint, scenario: &Scenario) -> ProofVerdict {
        let verdict = self.falsify(point, scenario).await;
        info!(
            region = %point.region_key,
            confirmed = verdict.is_confirmed(),
            "Proof review complete"
        );
        verdict
    }

    async fn falsify(&self, point: &ConvergencePoint, scenario: &Scenario) -> ProofVerdict {
        if !scenario.is_success() {
            return killed("scenario did not succeed");
        }

        let mut evidence = Vec::new();

        if let Err(e) = self.backend.reset(point).await {
            return killed(format!("sandbox reset failed before replay: {e}"));
        }
        for (idx, step) in scenario.steps.iter().enumerate() {
            let mut fresh = step.clone();
            fresh.observation = None;
            let replayed = match self.backend.execute_step(idx, &fresh).await {
                Ok(observation) => observation,
                Err(e) => return killed(format!("step {idx} errored on replay: {e}")),
            };
            let Some(original) = &step.observation else {
                return killed(format!("step {idx} has no recorded observation"));
            };
            if replayed.precondition_met != original.precondition_met
                || replayed.postcondition_met != original.postcondition_met
            {
                return killed(format!(
                    "step {idx} did not replay with the same conditions: {}",
                    replayed.detail
                ));
            }
        }
        evidence.push(format!("replayed {} steps from scratch", scenario.steps.len()));

        if point.primary_category.is_profit_motivated() {
            let benefit = scenario.benefit_model.total();
            let cost = scenario.cost_model.total();

            let adverse = benefit - cost * (1.0 + self.adverse_cost_factor);
            if adverse <= 0.0 {
                return killed(format!(
                    "net value under adverse cost (+{}%) is {adverse}",
                    self.adverse_cost_factor * 100.0
                ));
            }
            evidence.push(format!(
                "net value under adverse cost (+{}%): {adverse}",
                self.adverse_cost_factor * 100.0
            ));

            let mut worst = f64::INFINITY;
            for factor in jitter_factors(self.jitter, self.jitter_samples) {
                let net = benefit * (1.0 - factor) - cost * (1.0 + factor);
                if net <= 0.0 {
                    return killed(format!("net value under jitter {factor:+.3} is {net}"));
                }
                worst = worst.min(net);
            }
            evidence.push(format!(
                "worst net value over {} jitter samples: {worst}",
                self.jitter_samples
            ));
        } else {
            match self.backend.invariant_broken(point, scenario).await {
                Ok(report) if report.holds == Some(true) => {
                    evidence.push("broken invariant demonstrated again".to_string());
                    evidence.extend(report.evidence);
                }
                Ok(report) => {
                    return killed(format!(
                        "invariant not broken on replay: {}",
                        report.evidence.join("; ")
                    ))
                }
                Err(e) => return killed(format!("invariant re-check failed: {e}")),
            }
        }

        ProofVerdict::Confirmed { evidence }
    }
}

fn killed(falsified: impl Into<String>) -> ProofVerdict {
    ProofVerdict::Killed {
        falsified: falsified.into(),
    }
}

/// `samples` evenly spaced factors in `[-jitter, +jitter]`.
pub fn jitter_factors(jitter: f64, samples: u32) -> Vec<f64> {
    if samples <= 1 {
        return vec![0.0];
    }
    let step = 2.0 * jitter / f64::from(samples - 1);
    (0..samples).map(|k| -jitter + step * f64::from(k)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::DomainResult;
    use crate::domain::models::{
        BenefitModel, Category, CostKind, CostModel, ProbeReport, Region, RegionKey,
        ScenarioDraft, ScenarioStatus, ScenarioStep, StepObservation,
    };
    use crate::domain::ports::DraftRequest;
    use async_trait::async_trait;

    struct ReplayBackend {
        replay_ok: bool,
    }

    #[async_trait]
    impl ScenarioBackend for ReplayBackend {
        async fn draft(&self, _request: &DraftRequest) -> DomainResult<ScenarioDraft> {
            Ok(ScenarioDraft::default())
        }

        async fn reset(&self, _point: &ConvergencePoint) -> DomainResult<()> {
            Ok(())
        }

        async fn execute_step(
            &self,
            _index: usize,
            _step: &ScenarioStep,
        ) -> DomainResult<StepObservation> {
            Ok(StepObservation {
                precondition_met: true,
                postcondition_met: self.replay_ok,
                detail: "replay".to_string(),
            })
        }

        async fn invariant_broken(
            &self,
            _point: &ConvergencePoint,
            _scenario: &Scenario,
        ) -> DomainResult<ProbeReport> {
            Ok(ProbeReport::holds("still paused"))
        }
    }

    fn point(category: Category) -> ConvergencePoint {
        ConvergencePoint {
            region_key: RegionKey::from_region(&Region::unit("Vault.sol")),
            contributing_producers: vec!["a".into(), "b".into()],
            density: 2,
            severity_component: 8,
            novelty_component: 1.0,
            distinct_categories: vec![category],
            primary_category: category,
            composite_score: 1.0,
            rank: 1,
            finding_ids: vec![],
            recommended_drillers: vec![],
        }
    }

    fn scenario(benefit: f64, cost: f64) -> Scenario {
        let mut step = ScenarioStep::new("funded", "withdraw", "drained");
        step.observation = Some(StepObservation::passed("ok"));
        let mut scenario = Scenario::from_draft(ScenarioDraft {
            steps: vec![step],
            cost_model: CostModel::default().with("gas", CostKind::Execution, cost),
            benefit_model: BenefitModel::default().with("gain", benefit),
        });
        scenario.net_value = benefit - cost;
        scenario.status = ScenarioStatus::Success;
        scenario
    }

    fn reviewer(replay_ok: bool) -> ProofReviewer {
        ProofReviewer::new(Arc::new(ReplayBackend { replay_ok }), &ProofConfig::default())
    }

    #[test]
    fn test_jitter_factors_are_evenly_spaced() {
        let factors = jitter_factors(0.1, 5);
        assert_eq!(factors.len(), 5);
        assert!((factors[0] + 0.1).abs() < 1e-12);
        assert!(factors[2].abs() < 1e-12);
        assert!((factors[4] - 0.1).abs() < 1e-12);
        assert_eq!(jitter_factors(0.1, 1), vec![0.0]);
    }

    #[tokio::test]
    async fn test_robust_scenario_confirmed() {
        let verdict = reviewer(true)
            .review(&point(Category::Ordering), &scenario(200.0, 10.0))
            .await;
        assert!(verdict.is_confirmed());
    }

    #[tokio::test]
    async fn test_thin_margin_killed_by_adverse_cost() {
        // Positive net, but gone once cost rises by a quarter.
        let verdict = reviewer(true)
            .review(&point(Category::Ordering), &scenario(110.0, 100.0))
            .await;
        match verdict {
            ProofVerdict::Killed { falsified } => assert!(falsified.contains("adverse")),
            other => panic!("expected kill, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_margin_killed_by_jitter() {
        let config = ProofConfig {
            adverse_cost_factor: 0.0,
            jitter: 0.1,
            jitter_samples: 5,
        };
        let reviewer = ProofReviewer::new(Arc::new(ReplayBackend { replay_ok: true }), &config);
        // 0.9 * 105 - 1.1 * 100 < 0
        let verdict = reviewer
            .review(&point(Category::Ordering), &scenario(105.0, 100.0))
            .await;
        match verdict {
            ProofVerdict::Killed { falsified } => assert!(falsified.contains("jitter")),
            other => panic!("expected kill, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_replay_divergence_killed() {
        let verdict = reviewer(false)
            .review(&point(Category::Ordering), &scenario(200.0, 10.0))
            .await;
        assert!(!verdict.is_confirmed());
    }

    #[tokio::test]
    async fn test_invariant_category_redemonstrated() {
        let verdict = reviewer(true)
            .review(&point(Category::Availability), &scenario(0.0, 10.0))
            .await;
        assert!(verdict.is_confirmed());
    }
}
