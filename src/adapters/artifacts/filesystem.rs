//! Artifact sink writing JSON documents under an engagements directory.
//!
//! Layout, per engagement:
//!
//! ```text
//! <root>/<engagement-id>/state.json
//! <root>/<engagement-id>/summary.json
//! <root>/<engagement-id>/workers/round-<n>-<mode>-<worker>.json
//! ```

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{DispatchMode, Engagement, EngagementSummary, WorkerOutcome};
use crate::domain::ports::ArtifactSink;

pub const STATE_FILE: &str = "state.json";
pub const SUMMARY_FILE: &str = "summary.json";
pub const WORKERS_DIR: &str = "workers";

#[derive(Debug, Clone)]
pub struct FilesystemArtifactSink {
    root: PathBuf,
}

impl FilesystemArtifactSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn engagement_dir(&self, engagement_id: Uuid) -> PathBuf {
        self.root.join(engagement_id.to_string())
    }

    pub fn worker_output_path(
        &self,
        engagement_id: Uuid,
        round: u32,
        mode: DispatchMode,
        worker_id: &str,
    ) -> PathBuf {
        self.engagement_dir(engagement_id)
            .join(WORKERS_DIR)
            .join(format!("round-{round}-{mode}-{}.json", file_safe(worker_id)))
    }

    /// Every persisted summary, most recently concluded first.
    pub async fn list_summaries(&self) -> DomainResult<Vec<EngagementSummary>> {
        let mut summaries = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(summaries),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let Ok(id) = entry.file_name().to_string_lossy().parse::<Uuid>() else {
                continue;
            };
            if let Some(summary) = self.read_summary(id).await? {
                summaries.push(summary);
            }
        }

        summaries.sort_by(|a, b| b.concluded_at.cmp(&a.concluded_at));
        Ok(summaries)
    }
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Write through a temporary sibling so readers never see a partial document.
async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> DomainResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| {
        DomainError::Artifact(format!("failed to write {}: {e}", path.display()))
    })?;
    debug!(path = %path.display(), "Artifact written");
    Ok(())
}

#[async_trait]
impl ArtifactSink for FilesystemArtifactSink {
    async fn write_worker_output(
        &self,
        engagement_id: Uuid,
        round: u32,
        mode: DispatchMode,
        outcome: &WorkerOutcome,
    ) -> DomainResult<()> {
        let path = self.worker_output_path(engagement_id, round, mode, &outcome.worker_id);
        write_json(&path, outcome).await
    }

    async fn write_engagement_state(&self, engagement: &Engagement) -> DomainResult<()> {
        let path = self.engagement_dir(engagement.id()).join(STATE_FILE);
        write_json(&path, engagement).await
    }

    async fn write_summary(&self, summary: &EngagementSummary) -> DomainResult<()> {
        let path = self.engagement_dir(summary.engagement_id).join(SUMMARY_FILE);
        write_json(&path, summary).await
    }

    async fn read_summary(&self, engagement_id: Uuid) -> DomainResult<Option<EngagementSummary>> {
        let path = self.engagement_dir(engagement_id).join(SUMMARY_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
