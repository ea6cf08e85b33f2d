//! Convergence Synthesizer.
//!
//! Groups findings by normalized region, keeps the groups that at least two
//! independent producers reached, and ranks them with a weighted composite
//! score. The output is deterministic for a given input order.

use std::collections::{BTreeSet, HashMap};

use crate::domain::models::{
    Category, ConvergencePoint, Finding, ProducerId, RegionKey, ScoringWeights, Span,
    SynthesisConfig,
};

/// Maximum drillers recommended per point.
pub const MAX_DRILLERS: usize = 3;

/// Findings that share one normalized region.
#[derive(Debug, Clone)]
struct RegionGroup {
    unit: String,
    span: Option<Span>,
    /// Indices into the input slice, ascending.
    members: Vec<usize>,
}

impl RegionGroup {
    fn accepts(&self, finding: &Finding) -> bool {
        if self.unit != finding.region.unit {
            return false;
        }
        match (&self.span, &finding.region.span) {
            (None, None) => true,
            (Some(hull), Some(span)) => hull.overlaps(span),
            _ => false,
        }
    }

    fn absorb(&mut self, other: RegionGroup) {
        self.span = match (self.span, other.span) {
            (Some(a), Some(b)) => Some(a.hull(&b)),
            (a, b) => a.or(b),
        };
        self.members.extend(other.members);
        self.members.sort_unstable();
    }

    fn key(&self) -> RegionKey {
        RegionKey {
            unit: self.unit.clone(),
            span: self.span,
        }
    }
}

/// Scores and ranks convergence points.
#[derive(Debug, Clone)]
pub struct ConvergenceSynthesizer {
    weights: ScoringWeights,
    top_k: usize,
}

impl Default for ConvergenceSynthesizer {
    fn default() -> Self {
        Self::new(&SynthesisConfig::default())
    }
}

impl ConvergenceSynthesizer {
    pub fn new(config: &SynthesisConfig) -> Self {
        Self {
            weights: config.weights,
            top_k: config.top_k.max(1),
        }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Rank the top-K convergence points over `findings`.
    ///
    /// Rank 1 is the commit candidate; the rest are backups. An empty result
    /// means nothing converged.
    pub fn synthesize(&self, findings: &[Finding]) -> Vec<ConvergencePoint> {
        self.synthesize_excluding(findings, &[])
    }

    /// Like [`synthesize`](Self::synthesize), but drops every point whose
    /// region overlaps one of `excluded` (regions already abandoned).
    pub fn synthesize_excluding(
        &self,
        findings: &[Finding],
        excluded: &[RegionKey],
    ) -> Vec<ConvergencePoint> {
        let category_counts = corpus_counts(findings);
        let total = findings.len();

        let mut scored: Vec<(usize, ConvergencePoint)> = group_regions(findings)
            .into_iter()
            .filter_map(|group| {
                let discovery = *group.members.first()?;
                let point = self.score(&group, findings, &category_counts, total)?;
                Some((discovery, point))
            })
            .filter(|(_, point)| !excluded.iter().any(|key| key.overlaps(&point.region_key)))
            .collect();

        scored.sort_by(|(da, a), (db, b)| {
            b.composite_score
                .total_cmp(&a.composite_score)
                .then_with(|| b.severity_component.cmp(&a.severity_component))
                .then_with(|| da.cmp(db))
        });

        scored
            .into_iter()
            .take(self.top_k)
            .enumerate()
            .map(|(idx, (_, mut point))| {
                point.rank = idx + 1;
                point
            })
            .collect()
    }

    fn score(
        &self,
        group: &RegionGroup,
        findings: &[Finding],
        category_counts: &HashMap<Category, usize>,
        total: usize,
    ) -> Option<ConvergencePoint> {
        let members: Vec<&Finding> = group.members.iter().map(|&idx| &findings[idx]).collect();

        let mut producers: Vec<ProducerId> = Vec::new();
        let mut max_severity: HashMap<&str, u8> = HashMap::new();
        for f in &members {
            if !producers.contains(&f.producer_id) {
                producers.push(f.producer_id.clone());
            }
            let entry = max_severity.entry(f.producer_id.as_str()).or_insert(0);
            *entry = (*entry).max(f.severity);
        }

        let density = producers.len();
        if density < 2 {
            return None;
        }

        let severity_component = members.iter().map(|f| f.severity).max()?;
        let categories: BTreeSet<Category> = members.iter().map(|f| f.category).collect();

        // Rarest category in the whole corpus; BTreeSet order breaks ties.
        let primary_category = categories
            .iter()
            .copied()
            .min_by_key(|c| category_counts.get(c).copied().unwrap_or(0))?;
        let primary_count = category_counts.get(&primary_category).copied().unwrap_or(1).max(1);
        let novelty_component = total as f64 / primary_count as f64;

        let composite_score = self.weights.density * density as f64
            + self.weights.severity * f64::from(severity_component)
            + self.weights.novelty * novelty_component
            + self.weights.categories * categories.len() as f64;

        let mut drillers = producers.clone();
        // Stable sort keeps discovery order among equal severities.
        drillers.sort_by(|a, b| {
            let sa = max_severity.get(a.as_str()).copied().unwrap_or(0);
            let sb = max_severity.get(b.as_str()).copied().unwrap_or(0);
            sb.cmp(&sa)
        });
        drillers.truncate(MAX_DRILLERS);

        Some(ConvergencePoint {
            region_key: group.key(),
            contributing_producers: producers,
            density,
            severity_component,
            novelty_component,
            distinct_categories: categories.into_iter().collect(),
            primary_category,
            composite_score,
            rank: 0,
            finding_ids: members.iter().map(|f| f.id).collect(),
            recommended_drillers: drillers,
        })
    }
}

fn corpus_counts(findings: &[Finding]) -> HashMap<Category, usize> {
    let mut counts = HashMap::new();
    for f in findings {
        *counts.entry(f.category).or_insert(0) += 1;
    }
    counts
}

/// Partition findings into connected overlap groups, in discovery order.
fn group_regions(findings: &[Finding]) -> Vec<RegionGroup> {
    let mut groups: Vec<RegionGroup> = Vec::new();

    for (idx, finding) in findings.iter().enumerate() {
        let matching: Vec<usize> = groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.accepts(finding))
            .map(|(gi, _)| gi)
            .collect();

        let seed = RegionGroup {
            unit: finding.region.unit.clone(),
            span: finding.region.span,
            members: vec![idx],
        };

        match matching.split_first() {
            None => groups.push(seed),
            Some((&first, rest)) => {
                // Later groups fold into the earliest one; remove back to front.
                for &gi in rest.iter().rev() {
                    let other = groups.remove(gi);
                    groups[first].absorb(other);
                }
                groups[first].absorb(seed);
            }
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Region;

    fn finding(producer: &str, region: Region, category: Category, severity: u8) -> Finding {
        Finding::new(producer, region, category, severity).with_evidence("observed")
    }

    fn noise(producer: &str, idx: u64) -> Finding {
        finding(
            producer,
            Region::with_span(format!("Unit{idx}.sol"), 1, 5),
            Category::Other,
            3,
        )
    }

    #[test]
    fn test_three_workers_on_one_region() {
        let r = || Region::with_span("Vault.sol", 100, 140);
        let findings = vec![
            noise("w1", 1),
            finding("w2", r(), Category::AccountingMismatch, 8),
            noise("w3", 3),
            noise("w4", 4),
            finding("w5", r(), Category::AccountingMismatch, 6),
            noise("w6", 6),
            finding("w7", r(), Category::CyclicExtraction, 9),
            noise("w8", 8),
        ];

        let points = ConvergenceSynthesizer::default().synthesize(&findings);
        assert_eq!(points.len(), 1);
        let p = &points[0];
        assert_eq!(p.rank, 1);
        assert_eq!(p.density, 3);
        assert_eq!(p.severity_component, 9);
        assert_eq!(p.region_key, RegionKey::from_region(&r()));
        assert_eq!(p.contributing_producers, vec!["w2", "w5", "w7"]);
        assert_eq!(p.recommended_drillers, vec!["w7", "w2", "w5"]);
        assert_eq!(p.primary_category, Category::CyclicExtraction);
        assert!((p.novelty_component - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_single_producer_groups_are_discarded() {
        let findings = vec![
            finding("w1", Region::with_span("A.sol", 1, 10), Category::Ordering, 9),
            finding("w1", Region::with_span("A.sol", 5, 12), Category::Ordering, 9),
        ];
        assert!(ConvergenceSynthesizer::default().synthesize(&findings).is_empty());
    }

    #[test]
    fn test_transitive_merge_uses_hull() {
        let findings = vec![
            finding("w1", Region::with_span("A.sol", 1, 3), Category::Ordering, 4),
            finding("w2", Region::with_span("A.sol", 10, 12), Category::Ordering, 4),
            finding("w3", Region::with_span("A.sol", 2, 11), Category::Ordering, 4),
        ];
        let points = ConvergenceSynthesizer::default().synthesize(&findings);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].density, 3);
        assert_eq!(points[0].region_key.span, Some(Span::new(1, 12)));
        assert_eq!(points[0].finding_ids.len(), 3);
    }

    #[test]
    fn test_touching_spans_do_not_converge() {
        let findings = vec![
            finding("w1", Region::with_span("Vault.sol", 10, 20), Category::Ordering, 7),
            finding("w2", Region::with_span("Vault.sol", 20, 30), Category::Ordering, 7),
        ];
        assert!(ConvergenceSynthesizer::default().synthesize(&findings).is_empty());
    }

    #[test]
    fn test_spanless_regions_only_match_spanless() {
        let findings = vec![
            finding("w1", Region::unit("A.sol"), Category::Ordering, 4),
            finding("w2", Region::with_span("A.sol", 1, 100), Category::Ordering, 4),
        ];
        assert!(ConvergenceSynthesizer::default().synthesize(&findings).is_empty());

        let findings = vec![
            finding("w1", Region::unit("A.sol"), Category::Ordering, 4),
            finding("w2", Region::unit("A.sol"), Category::Ordering, 4),
        ];
        let points = ConvergenceSynthesizer::default().synthesize(&findings);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].region_key.span, None);
    }

    #[test]
    fn test_ranking_and_top_k() {
        let mut findings = Vec::new();
        for (unit, producers) in [("A.sol", 2), ("B.sol", 4), ("C.sol", 3), ("D.sol", 2)] {
            for p in 0..producers {
                findings.push(finding(
                    &format!("w{p}"),
                    Region::unit(unit),
                    Category::Ordering,
                    5,
                ));
            }
        }
        let points = ConvergenceSynthesizer::default().synthesize(&findings);
        assert_eq!(points.len(), 3);
        let units: Vec<&str> = points.iter().map(|p| p.region_key.unit.as_str()).collect();
        assert_eq!(units, vec!["B.sol", "C.sol", "A.sol"]);
        let ranks: Vec<usize> = points.iter().map(|p| p.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_ties_break_on_severity_then_discovery() {
        let findings = vec![
            finding("w1", Region::unit("A.sol"), Category::Ordering, 5),
            finding("w2", Region::unit("A.sol"), Category::Ordering, 5),
            finding("w1", Region::unit("B.sol"), Category::Ordering, 5),
            finding("w2", Region::unit("B.sol"), Category::Ordering, 5),
        ];
        let points = ConvergenceSynthesizer::default().synthesize(&findings);
        assert_eq!(points[0].region_key.unit, "A.sol");
        assert_eq!(points[1].region_key.unit, "B.sol");
    }

    #[test]
    fn test_excluded_regions_are_skipped() {
        let findings = vec![
            finding("w1", Region::unit("A.sol"), Category::Ordering, 5),
            finding("w2", Region::unit("A.sol"), Category::Ordering, 5),
            finding("w1", Region::unit("B.sol"), Category::Ordering, 5),
            finding("w2", Region::unit("B.sol"), Category::Ordering, 5),
        ];
        let excluded = vec![RegionKey::from_region(&Region::unit("A.sol"))];
        let points = ConvergenceSynthesizer::default().synthesize_excluding(&findings, &excluded);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].region_key.unit, "B.sol");
        assert_eq!(points[0].rank, 1);
    }

    #[test]
    fn test_custom_weights() {
        let config = SynthesisConfig {
            weights: ScoringWeights {
                density: 1.0,
                severity: 0.0,
                novelty: 0.0,
                categories: 0.0,
            },
            top_k: 1,
        };
        let findings = vec![
            finding("w1", Region::unit("A.sol"), Category::Ordering, 9),
            finding("w2", Region::unit("A.sol"), Category::Ordering, 9),
        ];
        let points = ConvergenceSynthesizer::new(&config).synthesize(&findings);
        assert!((points[0].composite_score - 2.0).abs() < f64::EPSILON);
    }
}
