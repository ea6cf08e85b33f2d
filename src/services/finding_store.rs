//! Append-only store of ingested findings.
//!
//! The store has exactly one writer (the orchestrator holds the only `&mut`);
//! workers see it through immutable snapshots.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::SchemaError;
use crate::domain::models::{Finding, RegionKey};

/// Insertion-ordered, append-only repository of findings.
#[derive(Debug, Default)]
pub struct FindingStore {
    findings: Vec<Finding>,
    by_id: HashMap<Uuid, usize>,
    by_producer: HashMap<String, Vec<usize>>,
}

impl FindingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest a finding.
    ///
    /// Rejects findings that fail the schema and findings whose id is already
    /// stored. Nothing is ever updated in place.
    pub fn put(&mut self, finding: Finding) -> Result<Uuid, SchemaError> {
        finding.validate()?;
        if self.by_id.contains_key(&finding.id) {
            return Err(SchemaError::DuplicateFinding(finding.id));
        }

        let idx = self.findings.len();
        let id = finding.id;
        self.by_id.insert(id, idx);
        self.by_producer
            .entry(finding.producer_id.clone())
            .or_default()
            .push(idx);
        self.findings.push(finding);
        Ok(id)
    }

    /// Ingest a batch atomically: either every finding is stored or none is.
    pub fn put_all(&mut self, findings: impl IntoIterator<Item = Finding>) -> Result<usize, SchemaError> {
        let findings: Vec<Finding> = findings.into_iter().collect();
        let mut batch_ids = HashSet::with_capacity(findings.len());
        for finding in &findings {
            finding.validate()?;
            if self.by_id.contains_key(&finding.id) || !batch_ids.insert(finding.id) {
                return Err(SchemaError::DuplicateFinding(finding.id));
            }
        }

        let count = findings.len();
        for finding in findings {
            self.put(finding)?;
        }
        Ok(count)
    }

    pub fn all(&self) -> &[Finding] {
        &self.findings
    }

    pub fn get(&self, id: Uuid) -> Option<&Finding> {
        self.by_id.get(&id).map(|&idx| &self.findings[idx])
    }

    /// Findings whose region falls in `key` under region equality.
    pub fn by_region(&self, key: &RegionKey) -> Vec<&Finding> {
        self.findings
            .iter()
            .filter(|f| key.contains(&f.region))
            .collect()
    }

    pub fn by_producer(&self, producer_id: &str) -> Vec<&Finding> {
        self.by_producer
            .get(producer_id)
            .map(|idxs| idxs.iter().map(|&idx| &self.findings[idx]).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    /// Shared immutable copy handed to workers as prior context.
    pub fn snapshot(&self) -> Arc<[Finding]> {
        Arc::from(self.findings.clone())
    }
}
