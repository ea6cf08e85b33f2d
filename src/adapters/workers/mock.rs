//! Scripted worker for tests and dry runs.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{DispatchMode, Mission, WorkerRequest, WorkerResponse};
use crate::domain::ports::Worker;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Respond(WorkerResponse),
    /// Return an explicit failure.
    Fail(String),
    /// Sleep, then respond. Used to trip the attempt timeout.
    Delay(Duration, WorkerResponse),
    /// Panic inside the worker task.
    Panic(String),
}

impl MockReply {
    pub fn success(response: WorkerResponse) -> Self {
        Self::Respond(response)
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}

/// Replies are consumed in order; the last one repeats.
#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<MockReply>,
}

impl Script {
    fn next(&mut self) -> Option<MockReply> {
        if self.replies.len() > 1 {
            self.replies.pop_front()
        } else {
            self.replies.front().cloned()
        }
    }
}

/// Mock worker with per-mode scripts.
///
/// Narrow replies can be overridden per thesis region unit so one worker can
/// deny one thesis and confirm the next.
pub struct MockWorker {
    id: String,
    topic: String,
    broad: Mutex<Script>,
    narrow: Mutex<Script>,
    narrow_overrides: Arc<RwLock<HashMap<String, MockReply>>>,
    missions: Arc<RwLock<Vec<Mission>>>,
    keep_ids: bool,
}

impl MockWorker {
    pub fn new(id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            broad: Mutex::new(Script::default()),
            narrow: Mutex::new(Script::default()),
            narrow_overrides: Arc::new(RwLock::new(HashMap::new())),
            missions: Arc::new(RwLock::new(Vec::new())),
            keep_ids: false,
        }
    }

    /// Return scripted finding ids unchanged, like a worker that derives ids
    /// from what it found.
    pub fn keep_ids(mut self) -> Self {
        self.keep_ids = true;
        self
    }

    /// Append a reply to the broad-mode script.
    pub fn on_broad(mut self, reply: MockReply) -> Self {
        self.broad.get_mut().replies.push_back(reply);
        self
    }

    /// Append a reply to the narrow-mode script.
    pub fn on_narrow(mut self, reply: MockReply) -> Self {
        self.narrow.get_mut().replies.push_back(reply);
        self
    }

    /// Reply this way whenever the thesis sits in `unit`.
    pub async fn set_narrow_override(&self, unit: impl Into<String>, reply: MockReply) {
        self.narrow_overrides.write().await.insert(unit.into(), reply);
    }

    /// Missions received so far, in call order.
    pub async fn missions(&self) -> Vec<Mission> {
        self.missions.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.missions.read().await.len()
    }

    async fn next_reply(&self, mission: &Mission) -> Option<MockReply> {
        match mission.mode {
            DispatchMode::Broad => self.broad.lock().await.next(),
            DispatchMode::Narrow => {
                let unit = mission.thesis.as_ref().map(|t| t.region_key.unit.clone());
                if let Some(unit) = unit {
                    if let Some(reply) = self.narrow_overrides.read().await.get(&unit) {
                        return Some(reply.clone());
                    }
                }
                self.narrow.lock().await.next()
            }
        }
    }
}

/// Fresh ids on every reply, so a repeated script never echoes earlier findings.
fn remint(mut response: WorkerResponse, keep_ids: bool) -> WorkerResponse {
    if !keep_ids {
        for finding in &mut response.findings {
            finding.id = Uuid::new_v4();
        }
    }
    response
}

#[async_trait]
impl Worker for MockWorker {
    fn id(&self) -> &str {
        &self.id
    }

    fn topic(&self) -> &str {
        &self.topic
    }

    async fn invoke(&self, request: WorkerRequest) -> DomainResult<WorkerResponse> {
        self.missions.write().await.push(request.mission.clone());

        match self.next_reply(&request.mission).await {
            Some(MockReply::Respond(response)) => Ok(remint(response, self.keep_ids)),
            Some(MockReply::Fail(reason)) => Err(DomainError::WorkerFailed {
                worker_id: self.id.clone(),
                reason,
            }),
            Some(MockReply::Delay(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(remint(response, self.keep_ids))
            }
            Some(MockReply::Panic(message)) => panic!("{message}"),
            None => Err(DomainError::WorkerFailed {
                worker_id: self.id.clone(),
                reason: format!("no scripted {} reply", request.mission.mode),
            }),
        }
    }
}
