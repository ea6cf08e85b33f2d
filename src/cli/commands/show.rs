//! `crucible show`: render a persisted engagement summary.

use anyhow::{anyhow, Context, Result};
use clap::Args;
use uuid::Uuid;

use crate::adapters::artifacts::FilesystemArtifactSink;
use crate::cli::output::{output, truncate, CommandOutput};
use crate::cli::table::{list_table, render_list};
use crate::domain::models::{EngagementSummary, Outcome, ProofVerdict};
use crate::domain::ports::ArtifactSink;
use crate::infrastructure::config::ConfigLoader;

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Engagement ID (defaults to the most recently concluded engagement)
    pub engagement_id: Option<Uuid>,
}

/// Human and JSON rendering of a summary; shared with `crucible run`.
#[derive(Debug, serde::Serialize)]
#[serde(transparent)]
pub struct SummaryOutput {
    pub summary: EngagementSummary,
}

fn styled_outcome(outcome: Outcome) -> String {
    let text = outcome.to_string();
    match outcome {
        Outcome::Found => console::style(text).green().bold().to_string(),
        Outcome::Blocked => console::style(text).red().bold().to_string(),
        Outcome::Exhausted | Outcome::NoConvergence => {
            console::style(text).yellow().bold().to_string()
        }
    }
}

impl CommandOutput for SummaryOutput {
    fn to_human(&self) -> String {
        let s = &self.summary;
        let mut lines = vec![
            format!("Engagement: {}", s.engagement_id),
            format!("Target: {} ({})", s.target.label, s.target.location),
            format!("Outcome: {}", styled_outcome(s.outcome)),
            format!("Concluded: {}", s.concluded_at.to_rfc3339()),
        ];
        if let Some(reason) = &s.blocked_reason {
            lines.push(format!("Blocked: {reason}"));
        }

        let mut points = list_table(&["rank", "region", "density", "severity", "primary", "score"]);
        for point in &s.convergence_points {
            points.add_row(vec![
                point.rank.to_string(),
                truncate(&point.region_key.to_string(), 48),
                point.density.to_string(),
                point.severity_component.to_string(),
                point.primary_category.to_string(),
                format!("{:.2}", point.composite_score),
            ]);
        }
        lines.push(String::new());
        lines.push(render_list(
            "convergence point",
            &points,
            s.convergence_points.len(),
        ));

        if !s.commits.is_empty() {
            lines.push("\nCommits:".to_string());
            for commit in &s.commits {
                lines.push(format!(
                    "  - {} (rank {}, score {:.2}): {}",
                    commit.region_key, commit.rank, commit.composite_score, commit.rationale
                ));
            }
        }

        if !s.pivots.is_empty() {
            let mut pivots = list_table(&["pivot", "region", "phase", "reason"]);
            for pivot in &s.pivots {
                pivots.add_row(vec![
                    pivot.pivot_number.to_string(),
                    truncate(&pivot.region_key.to_string(), 40),
                    pivot.abandoned_in.to_string(),
                    truncate(&pivot.reason, 60),
                ]);
            }
            lines.push(String::new());
            lines.push(render_list("pivot", &pivots, s.pivots.len()));
        }

        if !s.degraded_workers.is_empty() {
            lines.push("\nDegraded workers:".to_string());
            for gap in &s.degraded_workers {
                lines.push(format!("  - {} ({}): {}", gap.worker_id, gap.mode, gap.gap));
            }
        }

        if let Some(chain) = &s.evidence_chain {
            lines.push(format!("\nEvidence chain for {}:", chain.point.region_key));
            lines.push(format!("  Thesis: {}", chain.point.thesis()));
            for result in &chain.validation {
                lines.push(format!(
                    "  Gate {}: {:?} {}",
                    result.check_id,
                    result.outcome,
                    result.evidence.join("; ")
                ));
            }
            for (idx, step) in chain.scenario.steps.iter().enumerate() {
                lines.push(format!(
                    "  Step {}: {} => {}",
                    idx + 1,
                    step.action,
                    step.expected_postcondition
                ));
            }
            lines.push(format!("  Net value: {}", chain.scenario.net_value));
            if let ProofVerdict::Confirmed { evidence } = &chain.proof {
                for line in evidence {
                    lines.push(format!("  Proof: {line}"));
                }
            }
        }

        lines.join("\n")
    }
}

pub async fn execute(args: ShowArgs, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load().context("Failed to load configuration")?;
    let sink = FilesystemArtifactSink::new(&config.artifacts.dir);

    let summary = match args.engagement_id {
        Some(id) => sink
            .read_summary(id)
            .await?
            .ok_or_else(|| anyhow!("No summary found for engagement {id}"))?,
        None => sink
            .list_summaries()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No concluded engagements in {}", config.artifacts.dir))?,
    };

    output(&SummaryOutput { summary }, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{EngagementPhase, PivotRecord, Region, RegionKey, TargetRef};
    use chrono::Utc;

    #[test]
    fn test_human_summary_sections() {
        let summary = EngagementSummary {
            engagement_id: Uuid::new_v4(),
            target: TargetRef::new("vault", "codegraph"),
            convergence_points: vec![],
            commits: vec![],
            pivots: vec![PivotRecord {
                pivot_number: 1,
                region_key: RegionKey::from_region(&Region::unit("Pool.sol")),
                abandoned_in: EngagementPhase::Validating,
                reason: "differential contradicted".to_string(),
            }],
            outcome: Outcome::Exhausted,
            evidence_chain: None,
            degraded_workers: vec![],
            blocked_reason: None,
            concluded_at: Utc::now(),
        };
        let out = SummaryOutput { summary };
        let human = out.to_human();
        assert!(human.contains("EXHAUSTED"));
        assert!(human.contains("No convergence points found."));
        assert!(human.contains("Pool.sol"));

        let json = out.to_json();
        assert_eq!(json["outcome"], "EXHAUSTED");
        assert_eq!(json["pivots"][0]["pivot_number"], 1);
    }
}
