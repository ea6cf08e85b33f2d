//! Oracle backed by an external command.
//!
//! Every probe or scenario request is one invocation of the configured
//! command: a JSON object tagged by `op` on stdin, the answer as JSON on
//! stdout.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::adapters::command::{CommandError, JsonCommand};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ConvergencePoint, CycleOutcome, DifferentialReading, OracleConfig, ProbeReport, ReplayTrace,
    Scenario, ScenarioDraft, ScenarioStep, StepObservation, TrustReading,
};
use crate::domain::ports::{DraftRequest, ScenarioBackend, TargetProbe};

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum OracleRequest<'a> {
    ReadValues {
        point: &'a ConvergencePoint,
    },
    Differential {
        point: &'a ConvergencePoint,
    },
    ReplayRecent {
        point: &'a ConvergencePoint,
    },
    TrustProperties {
        point: &'a ConvergencePoint,
    },
    CallerUnauthenticated {
        point: &'a ConvergencePoint,
    },
    ExternalStateInfluence {
        point: &'a ConvergencePoint,
    },
    SimulateCycles {
        point: &'a ConvergencePoint,
        iterations: u32,
    },
    Draft {
        request: &'a DraftRequest,
    },
    Reset {
        point: &'a ConvergencePoint,
    },
    ExecuteStep {
        index: usize,
        step: &'a ScenarioStep,
    },
    InvariantBroken {
        point: &'a ConvergencePoint,
        scenario: &'a Scenario,
    },
}

impl OracleRequest<'_> {
    fn op(&self) -> &'static str {
        match self {
            Self::ReadValues { .. } => "read_values",
            Self::Differential { .. } => "differential",
            Self::ReplayRecent { .. } => "replay_recent",
            Self::TrustProperties { .. } => "trust_properties",
            Self::CallerUnauthenticated { .. } => "caller_unauthenticated",
            Self::ExternalStateInfluence { .. } => "external_state_influence",
            Self::SimulateCycles { .. } => "simulate_cycles",
            Self::Draft { .. } => "draft",
            Self::Reset { .. } => "reset",
            Self::ExecuteStep { .. } => "execute_step",
            Self::InvariantBroken { .. } => "invariant_broken",
        }
    }
}

/// Which port a failure is reported against.
#[derive(Clone, Copy)]
enum Side {
    Probe,
    Backend,
}

impl Side {
    fn error(self, message: String) -> DomainError {
        match self {
            Self::Probe => DomainError::ProbeFailed(message),
            Self::Backend => DomainError::BackendFailed(message),
        }
    }
}

pub struct ProcessOracle {
    command: JsonCommand,
    timeout: Duration,
}

impl ProcessOracle {
    pub fn new(command: JsonCommand, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    pub fn from_config(config: &OracleConfig) -> Self {
        Self::new(
            JsonCommand::new(config.command.clone(), config.args.clone()),
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn ask<T: DeserializeOwned>(
        &self,
        side: Side,
        request: OracleRequest<'_>,
    ) -> DomainResult<T> {
        let op = request.op();
        debug!(op, program = %self.command.program(), "Oracle request");

        match tokio::time::timeout(self.timeout, self.command.call::<_, T>(&request)).await {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(CommandError::Decode { source, .. })) => {
                Err(side.error(format!("{op}: malformed answer: {source}")))
            }
            Ok(Err(e)) => Err(side.error(format!("{op}: {e}"))),
            Err(_) => Err(side.error(format!(
                "{op}: no answer within {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl TargetProbe for ProcessOracle {
    async fn read_values(&self, point: &ConvergencePoint) -> DomainResult<ProbeReport> {
        self.ask(Side::Probe, OracleRequest::ReadValues { point }).await
    }

    async fn differential(&self, point: &ConvergencePoint) -> DomainResult<DifferentialReading> {
        self.ask(Side::Probe, OracleRequest::Differential { point }).await
    }

    async fn replay_recent(&self, point: &ConvergencePoint) -> DomainResult<Option<ReplayTrace>> {
        self.ask(Side::Probe, OracleRequest::ReplayRecent { point }).await
    }

    async fn trust_properties(&self, point: &ConvergencePoint) -> DomainResult<Vec<TrustReading>> {
        self.ask(Side::Probe, OracleRequest::TrustProperties { point })
            .await
    }

    async fn caller_unauthenticated(&self, point: &ConvergencePoint) -> DomainResult<ProbeReport> {
        self.ask(Side::Probe, OracleRequest::CallerUnauthenticated { point })
            .await
    }

    async fn external_state_influence(
        &self,
        point: &ConvergencePoint,
    ) -> DomainResult<ProbeReport> {
        self.ask(Side::Probe, OracleRequest::ExternalStateInfluence { point })
            .await
    }

    async fn simulate_cycles(
        &self,
        point: &ConvergencePoint,
        iterations: u32,
    ) -> DomainResult<CycleOutcome> {
        self.ask(
            Side::Probe,
            OracleRequest::SimulateCycles { point, iterations },
        )
        .await
    }
}

#[async_trait]
impl ScenarioBackend for ProcessOracle {
    async fn draft(&self, request: &DraftRequest) -> DomainResult<ScenarioDraft> {
        self.ask(Side::Backend, OracleRequest::Draft { request }).await
    }

    async fn reset(&self, point: &ConvergencePoint) -> DomainResult<()> {
        let _: serde_json::Value = self.ask(Side::Backend, OracleRequest::Reset { point }).await?;
        Ok(())
    }

    async fn execute_step(
        &self,
        index: usize,
        step: &ScenarioStep,
    ) -> DomainResult<StepObservation> {
        self.ask(Side::Backend, OracleRequest::ExecuteStep { index, step })
            .await
    }

    async fn invariant_broken(
        &self,
        point: &ConvergencePoint,
        scenario: &Scenario,
    ) -> DomainResult<ProbeReport> {
        self.ask(
            Side::Backend,
            OracleRequest::InvariantBroken { point, scenario },
        )
        .await
    }
}
