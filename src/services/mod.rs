pub mod convergence_synthesizer;
pub mod engagement_orchestrator;
pub mod finding_store;
pub mod graph_triage;
pub mod proof_review;
pub mod scenario_constructor;
pub mod validation_gate;
pub mod worker_dispatcher;

pub use convergence_synthesizer::ConvergenceSynthesizer;
pub use engagement_orchestrator::{
    EngagementOrchestrator, EngagementRun, OrchestratorConfig, TargetSnapshot,
};
pub use finding_store::FindingStore;
pub use graph_triage::{triage, EntrypointScore, TriageOptions};
pub use proof_review::ProofReviewer;
pub use scenario_constructor::ScenarioConstructor;
pub use validation_gate::ValidationGate;
pub use worker_dispatcher::{DispatchContext, WorkerDispatcher};
