//! Engagement domain model.
//!
//! The engagement is the root aggregate of one end-to-end run against one
//! target snapshot. Its fields are private: every mutation goes through
//! `transition` (or a method built on it), which validates the move, bumps the
//! version and appends exactly one belief-log entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

use super::convergence::ConvergencePoint;
use super::scenario::Scenario;
use super::target_graph::TargetRef;

/// Hard cap on abandonments before the search budget is exhausted.
pub const MAX_PIVOTS: u8 = 3;

/// Evidence pointers a summary entry keeps: the oldest half and the newest half.
pub const MAX_FOLDED_POINTERS: usize = 8;

/// Smallest belief log that can still hold a summary plus fresh entries.
pub const MIN_BELIEF_LOG_CAPACITY: usize = 4;

/// Phase of an engagement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngagementPhase {
    Init,
    Mapping,
    Analyzing,
    Converging,
    Committed,
    Validating,
    Drilling,
    Cooking,
    Proving,
    Abandoned,
    ConcludedFound,
    ConcludedExhausted,
    ConcludedNoConvergence,
    ConcludedBlocked,
}

impl Default for EngagementPhase {
    fn default() -> Self {
        Self::Init
    }
}

impl EngagementPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Mapping => "MAPPING",
            Self::Analyzing => "ANALYZING",
            Self::Converging => "CONVERGING",
            Self::Committed => "COMMITTED",
            Self::Validating => "VALIDATING",
            Self::Drilling => "DRILLING",
            Self::Cooking => "COOKING",
            Self::Proving => "PROVING",
            Self::Abandoned => "ABANDONED",
            Self::ConcludedFound => "CONCLUDED_FOUND",
            Self::ConcludedExhausted => "CONCLUDED_EXHAUSTED",
            Self::ConcludedNoConvergence => "CONCLUDED_NO_CONVERGENCE",
            Self::ConcludedBlocked => "CONCLUDED_BLOCKED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome().is_some()
    }

    /// Final outcome for terminal phases.
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Self::ConcludedFound => Some(Outcome::Found),
            Self::ConcludedExhausted => Some(Outcome::Exhausted),
            Self::ConcludedNoConvergence => Some(Outcome::NoConvergence),
            Self::ConcludedBlocked => Some(Outcome::Blocked),
            _ => None,
        }
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(&self) -> Vec<EngagementPhase> {
        match self {
            Self::Init => vec![Self::Mapping],
            Self::Mapping => vec![Self::Analyzing, Self::ConcludedBlocked],
            Self::Analyzing => vec![Self::Converging],
            Self::Converging => vec![
                Self::Committed,
                Self::ConcludedNoConvergence,
                Self::ConcludedExhausted,
            ],
            Self::Committed => vec![Self::Validating],
            Self::Validating => vec![Self::Drilling, Self::Abandoned],
            Self::Drilling => vec![Self::Cooking, Self::Abandoned],
            Self::Cooking => vec![Self::Proving, Self::Abandoned],
            Self::Proving => vec![Self::ConcludedFound, Self::Abandoned],
            Self::Abandoned => vec![
                Self::Committed,
                Self::Converging,
                Self::ConcludedExhausted,
            ],
            Self::ConcludedFound
            | Self::ConcludedExhausted
            | Self::ConcludedNoConvergence
            | Self::ConcludedBlocked => vec![],
        }
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl fmt::Display for EngagementPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome reported in the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Found,
    Exhausted,
    NoConvergence,
    Blocked,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Found => "FOUND",
            Self::Exhausted => "EXHAUSTED",
            Self::NoConvergence => "NO_CONVERGENCE",
            Self::Blocked => "BLOCKED",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Belief log
// ============================================================================

/// One decision recorded by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeliefEntry {
    pub seq: u64,
    pub at: DateTime<Utc>,
    /// Phase entered by the transition.
    pub phase: EngagementPhase,
    pub decision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    /// Number of original entries folded into this one (0 for a plain entry).
    #[serde(default)]
    pub collapsed: usize,
    /// Evidence pointers kept by a summary entry, at most `MAX_FOLDED_POINTERS`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pointers: Vec<String>,
}

impl BeliefEntry {
    /// How many original decisions this entry stands for.
    pub fn weight(&self) -> usize {
        self.collapsed.max(1)
    }
}

/// Bounded, ordered decision log.
///
/// When full, the oldest half is folded into a single summary entry at the
/// front, so no decision is ever dropped without trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeliefLog {
    capacity: usize,
    entries: Vec<BeliefEntry>,
    next_seq: u64,
}

impl BeliefLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(MIN_BELIEF_LOG_CAPACITY),
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn entries(&self) -> &[BeliefEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total decisions ever recorded, including folded ones.
    pub fn total_recorded(&self) -> usize {
        self.entries.iter().map(BeliefEntry::weight).sum()
    }

    pub fn last(&self) -> Option<&BeliefEntry> {
        self.entries.last()
    }

    fn push(&mut self, phase: EngagementPhase, decision: String, evidence: Option<String>) {
        if self.entries.len() >= self.capacity {
            self.collapse_oldest();
        }
        self.entries.push(BeliefEntry {
            seq: self.next_seq,
            at: Utc::now(),
            phase,
            decision,
            evidence,
            collapsed: 0,
            pointers: Vec::new(),
        });
        self.next_seq += 1;
    }

    fn collapse_oldest(&mut self) {
        let n = (self.capacity / 2).max(2).min(self.entries.len());
        let folded: Vec<BeliefEntry> = self.entries.drain(..n).collect();
        let (Some(first), Some(last)) = (folded.first(), folded.last()) else {
            return;
        };

        let total: usize = folded.iter().map(BeliefEntry::weight).sum();
        let mut pointers: Vec<String> = Vec::new();
        for entry in &folded {
            let candidates: Vec<&String> = if entry.collapsed > 0 {
                entry.pointers.iter().collect()
            } else {
                entry.evidence.iter().collect()
            };
            for pointer in candidates {
                if !pointers.contains(pointer) {
                    pointers.push(pointer.clone());
                }
            }
        }
        if pointers.len() > MAX_FOLDED_POINTERS {
            let keep_head = MAX_FOLDED_POINTERS / 2;
            let tail_start = pointers.len() - (MAX_FOLDED_POINTERS - keep_head);
            pointers.drain(keep_head..tail_start);
        }

        // `last` is never a summary: only index 0 can be one, and n >= 2.
        let summary = BeliefEntry {
            seq: first.seq,
            at: last.at,
            phase: last.phase,
            decision: format!(
                "collapsed {total} earlier decisions (seq {}..={}), last \"{}\"",
                first.seq, last.seq, last.decision
            ),
            evidence: (!pointers.is_empty()).then(|| pointers.join("; ")),
            collapsed: total,
            pointers,
        };
        self.entries.insert(0, summary);
    }
}

// ============================================================================
// Engagement
// ============================================================================

/// Root aggregate for one run of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Engagement {
    id: Uuid,
    target: TargetRef,
    phase: EngagementPhase,
    pivot_count: u8,
    committed_point: Option<ConvergencePoint>,
    scenario: Option<Scenario>,
    belief_log: BeliefLog,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Engagement {
    pub fn new(target: TargetRef, belief_log_capacity: usize) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            target,
            phase: EngagementPhase::Init,
            pivot_count: 0,
            committed_point: None,
            scenario: None,
            belief_log: BeliefLog::new(belief_log_capacity),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn target(&self) -> &TargetRef {
        &self.target
    }

    pub fn phase(&self) -> EngagementPhase {
        self.phase
    }

    pub fn pivot_count(&self) -> u8 {
        self.pivot_count
    }

    pub fn committed_point(&self) -> Option<&ConvergencePoint> {
        self.committed_point.as_ref()
    }

    pub fn scenario(&self) -> Option<&Scenario> {
        self.scenario.as_ref()
    }

    pub fn belief_log(&self) -> &BeliefLog {
        &self.belief_log
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_concluded(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn pivots_exhausted(&self) -> bool {
        self.pivot_count >= MAX_PIVOTS
    }

    /// Move to `next`, recording the decision.
    pub fn transition(
        &mut self,
        next: EngagementPhase,
        decision: impl Into<String>,
        evidence: Option<String>,
    ) -> DomainResult<()> {
        if !self.phase.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
                reason: "not a valid engagement transition".to_string(),
            });
        }
        if next == EngagementPhase::Committed && self.committed_point.is_none() {
            return Err(DomainError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
                reason: "use commit() to enter COMMITTED".to_string(),
            });
        }

        self.phase = next;
        self.version += 1;
        self.updated_at = Utc::now();
        self.belief_log.push(next, decision.into(), evidence);
        Ok(())
    }

    /// Commit to a convergence point, discarding any in-flight scenario.
    pub fn commit(
        &mut self,
        point: ConvergencePoint,
        decision: impl Into<String>,
    ) -> DomainResult<()> {
        if !point.is_eligible() {
            return Err(DomainError::ValidationFailed(format!(
                "convergence point {} has density {} (needs at least 2)",
                point.region_key, point.density
            )));
        }
        if !self.phase.can_transition_to(EngagementPhase::Committed) {
            return Err(DomainError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: EngagementPhase::Committed.to_string(),
                reason: "cannot commit from this phase".to_string(),
            });
        }

        let evidence = Some(format!("region {}", point.region_key));
        let previous = self.committed_point.replace(point);
        self.scenario = None;
        if let Err(e) = self.transition(EngagementPhase::Committed, decision, evidence) {
            self.committed_point = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Abandon the committed point; the abandonment counts against the pivot budget.
    ///
    /// Returns the abandoned point.
    pub fn abandon(
        &mut self,
        reason: impl Into<String>,
        evidence: Option<String>,
    ) -> DomainResult<Option<ConvergencePoint>> {
        self.transition(EngagementPhase::Abandoned, reason, evidence)?;
        self.pivot_count = (self.pivot_count + 1).min(MAX_PIVOTS);
        self.scenario = None;
        Ok(self.committed_point.take())
    }

    /// Attach the scenario under construction for the committed point.
    pub fn set_scenario(&mut self, scenario: Scenario) -> DomainResult<()> {
        if !matches!(self.phase, EngagementPhase::Cooking | EngagementPhase::Proving) {
            return Err(DomainError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: self.phase.to_string(),
                reason: "scenarios exist only while cooking or proving".to_string(),
            });
        }
        self.scenario = Some(scenario);
        self.updated_at = Utc::now();
        Ok(())
    }
}
