pub mod config;
pub mod convergence;
pub mod engagement;
pub mod finding;
pub mod scenario;
pub mod summary;
pub mod target_graph;
pub mod validation;
pub mod worker;

pub use config::{
    ArtifactsConfig, Config, DispatcherConfig, EngagementConfig, GateConfig, LoggingConfig,
    OracleConfig, ProofConfig, SynthesisConfig, WorkerConfig,
};
pub use convergence::{ConvergencePoint, RegionKey, ScoringWeights};
pub use engagement::{
    BeliefEntry, BeliefLog, Engagement, EngagementPhase, Outcome, MAX_PIVOTS,
};
pub use finding::{Category, Confidence, CostKind, Finding, ProducerId, Region, Span};
pub use scenario::{
    BenefitModel, CostModel, ProofVerdict, Scenario, ScenarioDraft, ScenarioFailure,
    ScenarioStatus, ScenarioStep, StepObservation,
};
pub use summary::{CommitRecord, EngagementSummary, EvidenceChain, PivotRecord, WorkerGap};
pub use target_graph::{GraphEdge, GraphSchema, TargetGraph, TargetRef};
pub use validation::{
    CheckId, CheckOutcome, CycleOutcome, DifferentialReading, GateReport, IntermediateState,
    PrincipalKind, ProbeReport, ReplayTrace, TrustReading, TrustSnapshot, ValidationResult,
};
pub use worker::{
    DispatchMode, DispatchReport, DrillVerdict, Mission, Thesis, WorkerOutcome, WorkerRequest,
    WorkerResponse, WorkerStatus,
};
