//! Artifact sink port - persistence of engagement artifacts.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{DispatchMode, Engagement, EngagementSummary, WorkerOutcome};

/// Where worker outputs, engagement state and summaries are persisted.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Persist one worker's raw output for one dispatch round.
    async fn write_worker_output(
        &self,
        engagement_id: Uuid,
        round: u32,
        mode: DispatchMode,
        outcome: &WorkerOutcome,
    ) -> DomainResult<()>;

    /// Overwrite the engagement-state document.
    async fn write_engagement_state(&self, engagement: &Engagement) -> DomainResult<()>;

    /// Persist the final summary.
    async fn write_summary(&self, summary: &EngagementSummary) -> DomainResult<()>;

    /// Read back a persisted summary.
    async fn read_summary(&self, engagement_id: Uuid) -> DomainResult<Option<EngagementSummary>>;
}
