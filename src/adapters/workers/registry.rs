//! Builds the worker registry from configuration.

use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::WorkerConfig;
use crate::domain::ports::Worker;

use super::process::ProcessWorker;

/// Registry of configured workers, in configuration order.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: Vec<Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One process worker per configured entry.
    pub fn from_config(configs: &[WorkerConfig]) -> DomainResult<Self> {
        let mut registry = Self::new();
        for config in configs {
            registry = registry.with_worker(Arc::new(ProcessWorker::from_config(config)))?;
        }
        Ok(registry)
    }

    /// Add a worker; ids must be unique.
    pub fn with_worker(mut self, worker: Arc<dyn Worker>) -> DomainResult<Self> {
        if worker.id().trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "worker id must not be empty".to_string(),
            ));
        }
        if self.workers.iter().any(|w| w.id() == worker.id()) {
            return Err(DomainError::ValidationFailed(format!(
                "duplicate worker id: {}",
                worker.id()
            )));
        }
        self.workers.push(worker);
        Ok(self)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.workers.iter().map(|w| w.id()).collect()
    }

    pub fn topics(&self) -> HashSet<&str> {
        self.workers.iter().map(|w| w.topic()).collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn into_workers(self) -> Vec<Arc<dyn Worker>> {
        self.workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::workers::MockWorker;
    use std::collections::HashMap;

    fn config(id: &str) -> WorkerConfig {
        WorkerConfig {
            id: id.to_string(),
            topic: "ordering".to_string(),
            command: "crucible-worker".to_string(),
            args: vec![],
            env: HashMap::new(),
        }
    }

    #[test]
    fn test_from_config_keeps_order() {
        let registry = WorkerRegistry::from_config(&[config("b"), config("a")]).unwrap();
        assert_eq!(registry.ids(), vec!["b", "a"]);
        assert_eq!(registry.topics().len(), 1);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let result = WorkerRegistry::new()
            .with_worker(Arc::new(MockWorker::new("w", "t")))
            .and_then(|r| r.with_worker(Arc::new(MockWorker::new("w", "u"))));
        assert!(result.is_err());
    }
}
