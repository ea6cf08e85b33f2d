//! Target probe port - cheap read-only checks against the live target.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    ConvergencePoint, CycleOutcome, DifferentialReading, ProbeReport, ReplayTrace, TrustReading,
};

/// Read-only observations used by the validation gate.
///
/// Every method is scoped to the committed convergence point. An `Err` means
/// the probe could not observe anything; the gate records it as not applicable.
#[async_trait]
pub trait TargetProbe: Send + Sync {
    /// Read the live values behind the point and report whether the assumed
    /// relationship between them holds.
    async fn read_values(&self, point: &ConvergencePoint) -> DomainResult<ProbeReport>;

    /// Preview an operation and execute it in simulation.
    async fn differential(&self, point: &ConvergencePoint) -> DomainResult<DifferentialReading>;

    /// Replay the most recent operation touching the region, if there is one.
    async fn replay_recent(&self, point: &ConvergencePoint) -> DomainResult<Option<ReplayTrace>>;

    /// Assumed and observed trust properties of every external dependency.
    async fn trust_properties(&self, point: &ConvergencePoint) -> DomainResult<Vec<TrustReading>>;

    /// Whether the entrypoint can be called without authentication.
    async fn caller_unauthenticated(&self, point: &ConvergencePoint) -> DomainResult<ProbeReport>;

    /// Whether state the entrypoint reads can be influenced from outside.
    async fn external_state_influence(
        &self,
        point: &ConvergencePoint,
    ) -> DomainResult<ProbeReport>;

    /// Simulate `iterations` repetitions of the extraction cycle.
    async fn simulate_cycles(
        &self,
        point: &ConvergencePoint,
        iterations: u32,
    ) -> DomainResult<CycleOutcome>;
}
