//! Validation Gate: a fixed, ordered battery of cheap checks on the committed point.

use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    Category, CheckId, CheckOutcome, ConvergencePoint, GateConfig, GateReport, ProbeReport,
    ValidationResult,
};
use crate::domain::ports::TargetProbe;

/// Battery order.
pub const CHECKS: [CheckId; 6] = [
    CheckId::ValueComputation,
    CheckId::Differential,
    CheckId::Ordering,
    CheckId::TrustAssumption,
    CheckId::PermissionlessExternalState,
    CheckId::EconomicViability,
];

/// Categories a check applies to.
pub fn applicable_categories(check: CheckId) -> &'static [Category] {
    match check {
        CheckId::ValueComputation => &[
            Category::ValueComputation,
            Category::AccountingMismatch,
            Category::CyclicExtraction,
        ],
        CheckId::Differential => &[Category::AccountingMismatch],
        CheckId::Ordering => &[Category::Ordering],
        CheckId::TrustAssumption => &[Category::TrustAssumption],
        CheckId::PermissionlessExternalState => {
            &[Category::AccessControl, Category::ExternalState]
        }
        CheckId::EconomicViability => &[Category::CyclicExtraction],
    }
}

/// Runs the battery against a target probe.
pub struct ValidationGate {
    probe: Arc<dyn TargetProbe>,
    differential_tolerance: f64,
    economic_iterations: Vec<u32>,
}

impl ValidationGate {
    pub fn new(probe: Arc<dyn TargetProbe>, config: &GateConfig) -> Self {
        Self {
            probe,
            differential_tolerance: config.differential_tolerance.abs(),
            economic_iterations: config.economic_iterations.clone(),
        }
    }

    /// Run every check in order, stopping at the first contradiction.
    pub async fn run(&self, point: &ConvergencePoint) -> GateReport {
        let mut report = GateReport::default();

        for check in CHECKS {
            let applies = applicable_categories(check)
                .iter()
                .any(|c| point.has_category(*c));

            let result = if applies {
                match self.evaluate(check, point).await {
                    Ok(result) => result,
                    Err(e) => ValidationResult::not_applicable(check, format!("probe error: {e}")),
                }
            } else {
                ValidationResult::not_applicable(check, "no matching category")
            };

            debug!(
                region = %point.region_key,
                check = %check,
                outcome = ?result.outcome,
                "Validation check evaluated"
            );

            let contradicted = result.is_contradiction();
            report.results.push(result);
            if contradicted {
                break;
            }
        }

        info!(
            region = %point.region_key,
            passed = report.passed(),
            supporting = report.supporting(),
            "Validation gate complete"
        );
        report
    }

    async fn evaluate(
        &self,
        check: CheckId,
        point: &ConvergencePoint,
    ) -> DomainResult<ValidationResult> {
        match check {
            CheckId::ValueComputation => {
                let report = self.probe.read_values(point).await?;
                Ok(from_probe(check, report))
            }
            CheckId::Differential => self.differential(point).await,
            CheckId::Ordering => self.ordering(point).await,
            CheckId::TrustAssumption => self.trust(point).await,
            CheckId::PermissionlessExternalState => self.permissionless(point).await,
            CheckId::EconomicViability => self.economic(point).await,
        }
    }

    async fn differential(&self, point: &ConvergencePoint) -> DomainResult<ValidationResult> {
        let check = CheckId::Differential;
        let reading = self.probe.differential(point).await?;
        let scale = reading.preview.abs().max(reading.executed.abs()).max(1.0);
        let divergence = (reading.preview - reading.executed).abs();

        let mut evidence = vec![format!(
            "preview {} vs executed {} (divergence {divergence})",
            reading.preview, reading.executed
        )];
        evidence.extend(reading.evidence);

        if divergence > self.differential_tolerance * scale {
            Ok(ValidationResult::support(check, evidence))
        } else {
            Ok(ValidationResult::contradict(check, evidence))
        }
    }

    async fn ordering(&self, point: &ConvergencePoint) -> DomainResult<ValidationResult> {
        let check = CheckId::Ordering;
        let Some(trace) = self.probe.replay_recent(point).await? else {
            return Ok(ValidationResult::not_applicable(check, "no recent operation to replay"));
        };
        if trace.states.is_empty() {
            return Ok(ValidationResult::not_applicable(
                check,
                format!("replay of {} produced no intermediate states", trace.operation),
            ));
        }

        let inconsistent: Vec<String> = trace
            .states
            .iter()
            .filter(|s| !s.consistent)
            .map(|s| format!("{}: inconsistent intermediate state {}", trace.operation, s.label))
            .collect();

        if inconsistent.is_empty() {
            Ok(ValidationResult::contradict(
                check,
                vec![format!(
                    "{}: all {} intermediate states consistent",
                    trace.operation,
                    trace.states.len()
                )],
            ))
        } else {
            Ok(ValidationResult::support(check, inconsistent))
        }
    }

    async fn trust(&self, point: &ConvergencePoint) -> DomainResult<ValidationResult> {
        let check = CheckId::TrustAssumption;
        let readings = self.probe.trust_properties(point).await?;
        if readings.is_empty() {
            return Ok(ValidationResult::not_applicable(check, "no external dependencies"));
        }

        let mut mismatches = Vec::new();
        let mut held = Vec::new();
        for r in &readings {
            // The assumed staleness must actually be reachable.
            if r.observed.staleness_secs < r.assumed.staleness_secs {
                mismatches.push(format!(
                    "{}: freshness (assumed staleness {}s, observed {}s)",
                    r.dependency, r.assumed.staleness_secs, r.observed.staleness_secs
                ));
            }
            if r.observed.principal != r.assumed.principal {
                mismatches.push(format!(
                    "{}: principal type (assumed {:?}, observed {:?})",
                    r.dependency, r.assumed.principal, r.observed.principal
                ));
            }
            if r.observed.available != r.assumed.available {
                mismatches.push(format!(
                    "{}: availability (assumed {}, observed {})",
                    r.dependency, r.assumed.available, r.observed.available
                ));
            }
            held.push(format!("{}: trust properties hold", r.dependency));
        }

        if mismatches.is_empty() {
            Ok(ValidationResult::support(check, held))
        } else {
            Ok(ValidationResult::contradict(check, mismatches))
        }
    }

    async fn permissionless(&self, point: &ConvergencePoint) -> DomainResult<ValidationResult> {
        let check = CheckId::PermissionlessExternalState;
        let caller = self.probe.caller_unauthenticated(point).await?;
        let external = self.probe.external_state_influence(point).await?;

        let mut evidence = caller.evidence.clone();
        evidence.extend(external.evidence.iter().cloned());

        Ok(match (caller.holds, external.holds) {
            (Some(false), _) | (_, Some(false)) => ValidationResult::contradict(check, evidence),
            (Some(true), Some(true)) => ValidationResult::support(check, evidence),
            _ => ValidationResult {
                check_id: check,
                outcome: CheckOutcome::NotApplicable,
                evidence,
            },
        })
    }

    async fn economic(&self, point: &ConvergencePoint) -> DomainResult<ValidationResult> {
        let check = CheckId::EconomicViability;
        if self.economic_iterations.is_empty() {
            return Ok(ValidationResult::not_applicable(check, "no iteration counts configured"));
        }

        let mut evidence = Vec::new();
        let mut profitable = false;
        for &iterations in &self.economic_iterations {
            let outcome = self.probe.simulate_cycles(point, iterations).await?;
            evidence.push(format!(
                "{} iterations: extracted {}, cost {}, net {}",
                outcome.iterations,
                outcome.extracted,
                outcome.cost,
                outcome.net()
            ));
            if outcome.cost < outcome.extracted {
                profitable = true;
            }
        }

        if profitable {
            Ok(ValidationResult::support(check, evidence))
        } else {
            Ok(ValidationResult::contradict(check, evidence))
        }
    }
}

fn from_probe(check: CheckId, report: ProbeReport) -> ValidationResult {
    match report.holds {
        Some(true) => ValidationResult::support(check, report.evidence),
        Some(false) => ValidationResult::contradict(check, report.evidence),
        None => ValidationResult {
            check_id: check,
            outcome: CheckOutcome::NotApplicable,
            evidence: report.evidence,
        },
    }
}
