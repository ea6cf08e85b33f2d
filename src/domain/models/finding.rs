//! Finding domain model.
//!
//! A finding is one structured, evidenced observation produced by exactly one
//! worker. Findings are immutable once ingested into the finding store.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::errors::SchemaError;

/// Identifier of the worker that produced a finding.
pub type ProducerId = String;

/// Line/offset range inside a target unit.
///
/// Overlap is an open-interval test, so ranges that only touch at an endpoint
/// are distinct. A zero-width span `[p, p]` stands for the single position `p`
/// and behaves as `[p, p + 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: u64,
    pub end: u64,
}

impl Span {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.effective_end() && other.start < self.effective_end()
    }

    fn effective_end(&self) -> u64 {
        self.end.max(self.start.saturating_add(1))
    }

    /// Smallest span covering both.
    pub fn hull(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Location in the target a finding refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    /// Target-unit identifier (file, contract, module, codegraph node).
    pub unit: String,
    /// Optional range inside the unit. `None` means the whole unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl Region {
    pub fn unit(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            span: None,
        }
    }

    pub fn with_span(unit: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            unit: unit.into(),
            span: Some(Span::new(start, end)),
        }
    }

    /// Region-equality rule used for grouping.
    ///
    /// Same unit, and either both spanless or both spanned with overlapping
    /// ranges.
    pub fn matches(&self, other: &Region) -> bool {
        if self.unit != other.unit {
            return false;
        }
        match (&self.span, &other.span) {
            (None, None) => true,
            (Some(a), Some(b)) => a.overlaps(b),
            _ => false,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.span {
            Some(span) => write!(f, "{}:{}", self.unit, span),
            None => write!(f, "{}", self.unit),
        }
    }
}

/// Closed set of finding categories.
///
/// Variant order is the canonical tie-break order wherever categories are
/// compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ValueComputation,
    AccountingMismatch,
    Ordering,
    TrustAssumption,
    AccessControl,
    ExternalState,
    CyclicExtraction,
    Availability,
    Consistency,
    Other,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Self::ValueComputation,
        Self::AccountingMismatch,
        Self::Ordering,
        Self::TrustAssumption,
        Self::AccessControl,
        Self::ExternalState,
        Self::CyclicExtraction,
        Self::Availability,
        Self::Consistency,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValueComputation => "value_computation",
            Self::AccountingMismatch => "accounting_mismatch",
            Self::Ordering => "ordering",
            Self::TrustAssumption => "trust_assumption",
            Self::AccessControl => "access_control",
            Self::ExternalState => "external_state",
            Self::CyclicExtraction => "cyclic_extraction",
            Self::Availability => "availability",
            Self::Consistency => "consistency",
            Self::Other => "other",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == normalized)
    }

    /// Availability and consistency violations do not need to pay for
    /// themselves; everything else is judged on net value.
    pub fn is_profit_motivated(&self) -> bool {
        !matches!(self, Self::Availability | Self::Consistency)
    }

    /// Cost kinds any cost model for this category must account for.
    pub fn implied_costs(&self) -> Vec<CostKind> {
        if !self.is_profit_motivated() {
            return vec![];
        }
        let mut kinds = vec![CostKind::Execution];
        if matches!(self, Self::AccountingMismatch | Self::CyclicExtraction) {
            kinds.push(CostKind::ProtocolFee);
        }
        if matches!(self, Self::CyclicExtraction | Self::TrustAssumption) {
            kinds.push(CostKind::Capital);
        }
        kinds
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of resource a scenario consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostKind {
    /// Gas, compute, or transaction fees paid to execute.
    Execution,
    /// Fees charged by the target itself (swap, flash-loan, withdrawal).
    ProtocolFee,
    /// Cost of capital locked or borrowed for the duration.
    Capital,
    /// Price impact and slippage.
    Slippage,
    Other,
}

/// Confidence a worker attaches to a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Default for Confidence {
    fn default() -> Self {
        Self::Medium
    }
}

/// A single evidenced observation from one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Stamped by the dispatcher with the producing worker's id.
    #[serde(default)]
    pub producer_id: ProducerId,
    pub region: Region,
    pub category: Category,
    pub severity: u8,
    #[serde(default)]
    pub confidence: Confidence,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub cross_references: Vec<ProducerId>,
}

impl Finding {
    pub fn new(
        producer_id: impl Into<ProducerId>,
        region: Region,
        category: Category,
        severity: u8,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            producer_id: producer_id.into(),
            region,
            category,
            severity,
            confidence: Confidence::default(),
            evidence: Vec::new(),
            cross_references: Vec::new(),
        }
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence.push(evidence.into());
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_cross_reference(mut self, producer: impl Into<ProducerId>) -> Self {
        self.cross_references.push(producer.into());
        self
    }

    /// Check the ingestion schema.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.producer_id.trim().is_empty() {
            return Err(SchemaError::MissingProducer(self.id));
        }
        if self.region.unit.trim().is_empty() {
            return Err(SchemaError::MissingRegionUnit(self.id));
        }
        if !(1..=10).contains(&self.severity) {
            return Err(SchemaError::SeverityOutOfRange {
                id: self.id,
                severity: self.severity,
            });
        }
        if let Some(span) = self.region.span {
            if span.start > span.end {
                return Err(SchemaError::InvertedSpan {
                    id: self.id,
                    start: span.start,
                    end: span.end,
                });
            }
        }
        if self.evidence.is_empty() {
            return Err(SchemaError::MissingEvidence(self.id));
        }
        if let Some(index) = self.evidence.iter().position(|e| e.trim().is_empty()) {
            return Err(SchemaError::BlankEvidence { id: self.id, index });
        }
        Ok(())
    }

    /// Whether this finding references a mission topic.
    pub fn references_topic(&self, topic: &str) -> bool {
        let topic = topic.trim().to_lowercase();
        if topic.is_empty() {
            return false;
        }
        self.region.unit.to_lowercase().contains(&topic)
            || Category::from_str(&topic) == Some(self.category)
    }
}
