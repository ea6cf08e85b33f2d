//! Worker backed by an external command speaking JSON on stdin/stdout.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::adapters::command::JsonCommand;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Finding, Mission, TargetRef, WorkerConfig, WorkerRequest, WorkerResponse,
};
use crate::domain::ports::Worker;

/// What the child process receives.
///
/// The graph itself is not serialized; the child reads it from
/// `target.location`.
#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    engagement_id: Uuid,
    worker_id: &'a str,
    target: &'a TargetRef,
    mission: &'a Mission,
    prior_context: &'a [Finding],
}

pub struct ProcessWorker {
    id: String,
    topic: String,
    command: JsonCommand,
}

impl ProcessWorker {
    pub fn new(id: impl Into<String>, topic: impl Into<String>, command: JsonCommand) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            command,
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        let command = JsonCommand::new(config.command.clone(), config.args.clone())
            .with_env(config.env.clone());
        Self::new(config.id.clone(), config.topic.clone(), command)
    }
}

#[async_trait]
impl Worker for ProcessWorker {
    fn id(&self) -> &str {
        &self.id
    }

    fn topic(&self) -> &str {
        &self.topic
    }

    async fn invoke(&self, request: WorkerRequest) -> DomainResult<WorkerResponse> {
        let wire = WireRequest {
            engagement_id: request.engagement_id,
            worker_id: &self.id,
            target: &request.target.reference,
            mission: &request.mission,
            prior_context: &request.prior_context,
        };

        debug!(
            worker_id = %self.id,
            program = %self.command.program(),
            mode = %request.mission.mode,
            "Invoking worker process"
        );

        self.command
            .call(&wire)
            .await
            .map_err(|e| DomainError::WorkerFailed {
                worker_id: self.id.clone(),
                reason: e.to_string(),
            })
    }
}
