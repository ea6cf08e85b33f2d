//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the async trait interfaces that adapters implement:
//! - Worker: one black-box analysis worker
//! - TargetProbe: cheap read-only checks against the live target
//! - ScenarioBackend: drafts and executes scenario steps
//! - ArtifactSink: persists worker outputs, engagement state and summaries
//!
//! These traits keep the orchestrator independent of how workers run and
//! where artifacts land.

pub mod artifact_sink;
pub mod scenario_backend;
pub mod target_probe;
pub mod worker;

pub use artifact_sink::ArtifactSink;
pub use scenario_backend::{DraftRequest, ScenarioBackend};
pub use target_probe::TargetProbe;
pub use worker::Worker;
