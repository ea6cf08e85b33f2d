//! In-memory artifact sink for tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    DispatchMode, Engagement, EngagementPhase, EngagementSummary, WorkerOutcome,
};
use crate::domain::ports::ArtifactSink;

/// One recorded worker output.
#[derive(Debug, Clone)]
pub struct RecordedOutput {
    pub engagement_id: Uuid,
    pub round: u32,
    pub mode: DispatchMode,
    pub outcome: WorkerOutcome,
}

/// Keeps everything written, including every engagement-state snapshot.
#[derive(Debug, Default, Clone)]
pub struct MemoryArtifactSink {
    outputs: Arc<RwLock<Vec<RecordedOutput>>>,
    states: Arc<RwLock<Vec<Engagement>>>,
    summaries: Arc<RwLock<HashMap<Uuid, EngagementSummary>>>,
}

impl MemoryArtifactSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn outputs(&self) -> Vec<RecordedOutput> {
        self.outputs.read().await.clone()
    }

    /// Phases of the persisted engagement-state snapshots, in write order.
    pub async fn phase_history(&self) -> Vec<EngagementPhase> {
        self.states.read().await.iter().map(Engagement::phase).collect()
    }

    pub async fn latest_state(&self) -> Option<Engagement> {
        self.states.read().await.last().cloned()
    }
}

#[async_trait]
impl ArtifactSink for MemoryArtifactSink {
    async fn write_worker_output(
        &self,
        engagement_id: Uuid,
        round: u32,
        mode: DispatchMode,
        outcome: &WorkerOutcome,
    ) -> DomainResult<()> {
        self.outputs.write().await.push(RecordedOutput {
            engagement_id,
            round,
            mode,
            outcome: outcome.clone(),
        });
        Ok(())
    }

    async fn write_engagement_state(&self, engagement: &Engagement) -> DomainResult<()> {
        self.states.write().await.push(engagement.clone());
        Ok(())
    }

    async fn write_summary(&self, summary: &EngagementSummary) -> DomainResult<()> {
        self.summaries
            .write()
            .await
            .insert(summary.engagement_id, summary.clone());
        Ok(())
    }

    async fn read_summary(&self, engagement_id: Uuid) -> DomainResult<Option<EngagementSummary>> {
        Ok(self.summaries.read().await.get(&engagement_id).cloned())
    }
}
