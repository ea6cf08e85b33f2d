//! Convergence point model.
//!
//! Convergence points are derived data: recomputed on every synthesizer run
//! and never persisted independently of the run that produced them.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::finding::{Category, ProducerId, Region, Span};

/// Canonical key for a group of overlapping regions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionKey {
    pub unit: String,
    /// Hull of all member spans; `None` for unit-level groups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl RegionKey {
    pub fn from_region(region: &Region) -> Self {
        Self {
            unit: region.unit.clone(),
            span: region.span,
        }
    }

    pub fn as_region(&self) -> Region {
        Region {
            unit: self.unit.clone(),
            span: self.span,
        }
    }

    /// Whether a region belongs to this key under the region-equality rule.
    pub fn contains(&self, region: &Region) -> bool {
        self.as_region().matches(region)
    }

    /// Whether two keys describe overlapping regions.
    pub fn overlaps(&self, other: &RegionKey) -> bool {
        self.as_region().matches(&other.as_region())
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_region().fmt(f)
    }
}

/// Weights for the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_density_weight")]
    pub density: f64,
    #[serde(default = "default_severity_weight")]
    pub severity: f64,
    #[serde(default = "default_novelty_weight")]
    pub novelty: f64,
    #[serde(default = "default_category_weight")]
    pub categories: f64,
}

const fn default_density_weight() -> f64 {
    40.0
}

const fn default_severity_weight() -> f64 {
    10.0
}

const fn default_novelty_weight() -> f64 {
    15.0
}

const fn default_category_weight() -> f64 {
    10.0
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            density: default_density_weight(),
            severity: default_severity_weight(),
            novelty: default_novelty_weight(),
            categories: default_category_weight(),
        }
    }
}

/// A target region independently flagged by at least two workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergencePoint {
    pub region_key: RegionKey,
    /// Distinct producers in discovery order.
    pub contributing_producers: Vec<ProducerId>,
    pub density: usize,
    pub severity_component: u8,
    pub novelty_component: f64,
    pub distinct_categories: Vec<Category>,
    /// The group's most distinctive category; the thesis category.
    pub primary_category: Category,
    pub composite_score: f64,
    /// 1-based rank in the run that produced this point.
    pub rank: usize,
    pub finding_ids: Vec<Uuid>,
    /// Producers best placed to drill the thesis, at most three.
    pub recommended_drillers: Vec<ProducerId>,
}

impl ConvergencePoint {
    /// Only points with at least two distinct producers may be committed.
    pub fn is_eligible(&self) -> bool {
        self.density >= 2
    }

    pub fn has_category(&self, category: Category) -> bool {
        self.distinct_categories.contains(&category)
    }

    /// One-line statement of what the workers converged on.
    pub fn thesis(&self) -> String {
        format!(
            "{} workers converge on {} ({}; max severity {})",
            self.density,
            self.region_key,
            self.distinct_categories
                .iter()
                .map(Category::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            self.severity_component,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights() {
        let w = ScoringWeights::default();
        assert_eq!(w.density, 40.0);
        assert_eq!(w.severity, 10.0);
        assert_eq!(w.novelty, 15.0);
        assert_eq!(w.categories, 10.0);
    }

    #[test]
    fn test_region_key_contains() {
        let key = RegionKey::from_region(&Region::with_span("Vault.sol", 10, 40));
        assert!(key.contains(&Region::with_span("Vault.sol", 35, 50)));
        assert!(!key.contains(&Region::unit("Vault.sol")));
        assert_eq!(key.to_string(), "Vault.sol:10-40");
    }
}
