//! Domain errors for the crucible engagement pipeline.

use thiserror::Error;
use uuid::Uuid;

/// Reasons a finding is rejected at ingestion.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Finding {0} has an empty producer id")]
    MissingProducer(Uuid),

    #[error("Finding {0} has an empty region unit")]
    MissingRegionUnit(Uuid),

    #[error("Finding {id} has severity {severity} (must be 1-10)")]
    SeverityOutOfRange { id: Uuid, severity: u8 },

    #[error("Finding {id} has an inverted span {start}..{end}")]
    InvertedSpan { id: Uuid, start: u64, end: u64 },

    #[error("Finding {0} carries no evidence")]
    MissingEvidence(Uuid),

    #[error("Finding {id} has a blank evidence entry at position {index}")]
    BlankEvidence { id: Uuid, index: usize },

    #[error("Finding {0} was already ingested")]
    DuplicateFinding(Uuid),
}

/// Errors raised while loading or validating a target snapshot.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Target snapshot unavailable: {path}: {reason}")]
    Unavailable { path: String, reason: String },

    #[error("Target graph failed validation with {} error(s): {}", .0.len(), .0.join("; "))]
    Invalid(Vec<String>),
}

/// Domain-level errors that can occur in an engagement.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    #[error("Worker {worker_id} timed out after {timeout_secs}s")]
    WorkerTimeout { worker_id: String, timeout_secs: u64 },

    #[error("Worker {worker_id} violated its output contract: {reason}")]
    WorkerContractViolation { worker_id: String, reason: String },

    #[error("Worker {worker_id} failed: {reason}")]
    WorkerFailed { worker_id: String, reason: String },

    #[error("Probe failed: {0}")]
    ProbeFailed(String),

    #[error("Scenario backend failed: {0}")]
    BackendFailed(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Artifact(err.to_string())
    }
}
