//! Worker port - interface for analysis workers.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{WorkerRequest, WorkerResponse};

/// A single read-only analysis worker.
///
/// Workers are black boxes: they receive a shared snapshot of the target and
/// the findings so far, and return structured findings (plus a verdict when
/// drilling a thesis). They never touch orchestrator state.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Registry identifier; stamped on every finding the worker returns.
    fn id(&self) -> &str;

    /// Mission topic the worker's findings are expected to reference.
    fn topic(&self) -> &str;

    /// Run one attempt.
    ///
    /// An `Err` is an explicit failure and counts against the retry budget.
    async fn invoke(&self, request: WorkerRequest) -> DomainResult<WorkerResponse>;
}
