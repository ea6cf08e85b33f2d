//! Codegraph CLI commands.

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

use crate::cli::output::{output, truncate, CommandOutput};
use crate::cli::table::{list_table, render_list};
use crate::domain::models::{TargetGraph, TargetRef};
use crate::services::{triage, EntrypointScore, TriageOptions};

#[derive(Args, Debug)]
pub struct GraphArgs {
    #[command(subcommand)]
    pub command: GraphCommands,
}

#[derive(Subcommand, Debug)]
pub enum GraphCommands {
    /// Check a codegraph against its own schema
    Validate {
        /// Codegraph directory
        #[arg(default_value = "codegraph")]
        dir: PathBuf,
    },
    /// Rank function entrypoints by value flow and privilege
    Triage(TriageArgs),
}

#[derive(Args, Debug)]
pub struct TriageArgs {
    /// Codegraph directory
    #[arg(default_value = "codegraph")]
    pub dir: PathBuf,

    /// Maximum entrypoints to list
    #[arg(short, long, default_value = "50")]
    pub limit: usize,

    /// Only entrypoints without role requirements
    #[arg(long)]
    pub permissionless_only: bool,

    /// Function node type
    #[arg(long, default_value = "FUNC")]
    pub func_type: String,

    /// Asset node type
    #[arg(long, default_value = "ASSET")]
    pub asset_type: String,

    /// Value-moving edge type (repeatable; defaults to TRANSFERS, MINTS, BURNS, COLLECTS_FEE)
    #[arg(long)]
    pub value_edge: Vec<String>,

    /// External call edge type (repeatable; defaults to EXT_CALLS, DELEGATECALLS, STATICCALLS)
    #[arg(long)]
    pub call_edge: Vec<String>,

    /// Use edge and node labels as given, ignoring the schema label map
    #[arg(long)]
    pub ignore_label_map: bool,
}

impl TriageArgs {
    fn options(&self) -> TriageOptions {
        let defaults = TriageOptions::default();
        TriageOptions {
            limit: self.limit,
            permissionless_only: self.permissionless_only,
            func_type: self.func_type.clone(),
            asset_type: self.asset_type.clone(),
            value_edges: if self.value_edge.is_empty() {
                defaults.value_edges
            } else {
                self.value_edge.clone()
            },
            call_edges: if self.call_edge.is_empty() {
                defaults.call_edges
            } else {
                self.call_edge.clone()
            },
            ignore_label_map: self.ignore_label_map,
            ..defaults
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct GraphValidateOutput {
    pub dir: PathBuf,
    pub valid: bool,
    pub node_types: usize,
    pub edge_types: usize,
    pub nodes: usize,
    pub edges: usize,
    pub errors: Vec<String>,
}

impl CommandOutput for GraphValidateOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "{}: {} node types, {} edge types, {} nodes, {} edges",
            self.dir.display(),
            self.node_types,
            self.edge_types,
            self.nodes,
            self.edges
        )];
        if self.valid {
            lines.push("OK".to_string());
        } else {
            lines.push(format!("{} error(s):", self.errors.len()));
            for error in &self.errors {
                lines.push(format!("  - {error}"));
            }
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TriageOutput {
    pub entrypoints: Vec<EntrypointScore>,
    pub total: usize,
}

impl CommandOutput for TriageOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&[
            "entrypoint",
            "value",
            "assets",
            "calls",
            "writes",
            "reads",
            "roles",
        ]);
        for score in &self.entrypoints {
            let join = |set: &std::collections::BTreeSet<String>| {
                if set.is_empty() {
                    "-".to_string()
                } else {
                    set.iter().cloned().collect::<Vec<_>>().join(",")
                }
            };
            table.add_row(vec![
                truncate(&score.func, 48),
                score.value_edges.to_string(),
                join(&score.assets),
                score.call_edges.to_string(),
                score.writes.to_string(),
                score.reads.to_string(),
                join(&score.roles),
            ]);
        }
        render_list("entrypoint", &table, self.total)
    }
}

pub async fn execute(args: GraphArgs, json_mode: bool) -> Result<()> {
    match args.command {
        GraphCommands::Validate { dir } => {
            let out = validate(&dir)?;
            let valid = out.valid;
            output(&out, json_mode);
            if !valid {
                bail!("codegraph at {} failed validation", dir.display());
            }
        }
        GraphCommands::Triage(triage_args) => {
            let graph = load(&triage_args.dir)?;
            let entrypoints = triage(&graph, &triage_args.options());
            let out = TriageOutput {
                total: entrypoints.len(),
                entrypoints,
            };
            output(&out, json_mode);
        }
    }
    Ok(())
}

fn load(dir: &Path) -> Result<TargetGraph> {
    let label = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "codegraph".to_string());
    let reference = TargetRef::new(label, dir.display().to_string());
    Ok(TargetGraph::load(dir, reference)?)
}

pub fn validate(dir: &Path) -> Result<GraphValidateOutput> {
    let graph = load(dir)?;
    let errors = graph.validate();
    Ok(GraphValidateOutput {
        dir: dir.to_path_buf(),
        valid: errors.is_empty(),
        node_types: graph.schema.node_types.len(),
        edge_types: graph.schema.edge_types.len(),
        nodes: graph.nodes.len(),
        edges: graph.edges.len(),
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::target_graph::tests::{EDGES, NODES, SCHEMA};
    use tempfile::TempDir;

    fn write_graph(edges: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("00_schema.md"), SCHEMA).unwrap();
        std::fs::write(dir.path().join("01_nodes.md"), NODES).unwrap();
        std::fs::write(dir.path().join("02_edges.md"), edges).unwrap();
        dir
    }

    #[test]
    fn test_validate_reports_counts() {
        let dir = write_graph(EDGES);
        let out = validate(dir.path()).unwrap();
        assert!(out.valid);
        assert_eq!(out.nodes, 6);
        assert_eq!(out.edges, 6);
    }

    #[test]
    fn test_validate_reports_unknown_edge_type() {
        let dir = write_graph("- MINTS | func:Vault.deposit -> asset:USDC\n");
        let out = validate(dir.path()).unwrap();
        assert!(!out.valid);
        assert!(out.errors[0].contains("edge type not in schema: MINTS"));
        assert!(out.to_human().contains("1 error(s)"));
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(validate(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_triage_args_fall_back_to_default_edges() {
        let args = TriageArgs {
            dir: PathBuf::from("codegraph"),
            limit: 5,
            permissionless_only: false,
            func_type: "func".to_string(),
            asset_type: "asset".to_string(),
            value_edge: vec![],
            call_edge: vec!["CALLS".to_string()],
            ignore_label_map: false,
        };
        let options = args.options();
        assert_eq!(options.value_edges, TriageOptions::default().value_edges);
        assert_eq!(options.call_edges, vec!["CALLS".to_string()]);
        assert_eq!(options.reads_edge, "READS");
    }
}
