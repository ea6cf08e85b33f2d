//! Crucible - convergence-driven multi-worker analysis engine
//!
//! Crucible fans a read-only target snapshot out to many independent analysis
//! workers, looks for regions that several of them flagged on their own,
//! commits to the strongest convergence point and then tries hard to kill it:
//! a validation gate, narrow drilling, a self-tested scenario and an
//! adversarial proof review. Every failure after commitment is a pivot, and
//! the pivot budget is bounded.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, errors and port traits
//! - **Service Layer** (`services`): the engagement pipeline
//! - **Adapters** (`adapters`): process and scripted workers, the target
//!   oracle, artifact sinks
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::models::{
    Category, Config, ConvergencePoint, Engagement, EngagementPhase, EngagementSummary, Finding,
    Outcome, Region, TargetGraph, TargetRef,
};
pub use domain::ports::{ArtifactSink, ScenarioBackend, TargetProbe, Worker};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{EngagementOrchestrator, EngagementRun, TargetSnapshot, WorkerDispatcher};
