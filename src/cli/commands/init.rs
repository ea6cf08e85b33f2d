//! Implementation of the `crucible init` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::target_graph::{EDGES_FILE, NODES_FILE, SCHEMA_FILE};
use crate::domain::models::Config;
use crate::infrastructure::config::{CONFIG_DIR, CONFIG_FILE};

pub const CODEGRAPH_DIR: &str = "codegraph";
pub const ENGAGEMENTS_DIR: &str = "engagements";
pub const LAYERS_DIR: &str = "layers";
pub const DIAGRAMS_DIR: &str = "diagrams";

/// Analysis layer notes under `codegraph/layers/`, one header each.
const LAYERS: [(&str, &str); 22] = [
    ("L1_repo.md", "Repository Inventory"),
    ("L2_catalog.md", "Module Catalog"),
    ("L3_types.md", "Type System"),
    ("L4_inheritance.md", "Inheritance and Overrides"),
    ("L5_external_surface.md", "External Surface"),
    ("L6_deployment_topology.md", "Deployment and Topology"),
    ("L7_authority.md", "Authority"),
    ("L8_storage.md", "Storage"),
    ("L9_function_semantics.md", "Function Semantics"),
    ("L10_call_graph.md", "Call Graph"),
    ("L11_value_accounting.md", "Value and Accounting"),
    ("L12_external_systems.md", "External Systems and Trust Assumptions"),
    ("L13_state_machine.md", "State Machine"),
    ("L14_invariants.md", "Invariants"),
    ("L15_attack_surface.md", "Attack Surface (permissionless)"),
    ("L16_primitives.md", "Primitives"),
    ("L17_falsifiers.md", "Falsifiers and Proofs"),
    ("L18_learnings.md", "Learnings"),
    ("L19_control_plane.md", "Control Plane"),
    ("L20_approval_surface.md", "Approval Surface"),
    ("L21_ordering_model.md", "Ordering Model"),
    ("L22_cycle_mining.md", "Cycle Mining"),
];

const HYPOTHESIS_LEDGER: &str = "\
# Hypothesis Ledger

| scenario_id | target_state | preconditions | route | evidence | falsifier | status | net_value | killed_by | next_mutation |
|---|---|---|---|---|---|---|---|---|---|
";

const UNKNOWNS_LEDGER: &str = "# Unknowns\n\n";

const RESUME_PACK: &str = "\
# Resume Pack

## Snapshot

- chain:
- block:

## Live Hypotheses

## Last Falsifier Results

## Next Mutations
";

const DEPLOYMENT_SNAPSHOT: &str = "# Deployment Snapshot\n\n";

const CONFIG_HEADER: &str = "\
# Crucible configuration
#
# Overrides: .crucible/local.yaml, then CRUCIBLE_* environment variables
# (use __ for nesting, e.g. CRUCIBLE_DISPATCHER__MAX_CONCURRENCY=4).
#
# Register workers under `workers:` (id, topic, command, args) and the target
# oracle under `oracle:` (command, args, timeout_secs).

";

const SCHEMA_SKELETON: &str = "\
# Codegraph Schema

## Node Types

- func
- asset
- role
- state

## Edge Types

- CALLS
- EXT_CALLS
- DELEGATECALLS
- STATICCALLS
- TRANSFERS
- MINTS
- BURNS
- COLLECTS_FEE
- READS
- WRITES
- REQUIRES_ROLE

## Label Map

- FUNC -> func
- ASSET -> asset
";

const NODES_SKELETON: &str = "# Codegraph Nodes\n\n";
const EDGES_SKELETON: &str = "# Codegraph Edges\n\n";

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Target directory (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub message: String,
    pub initialized_path: PathBuf,
    pub directories_created: Vec<String>,
    pub files_created: Vec<String>,
    pub files_skipped: Vec<String>,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        if !self.directories_created.is_empty() {
            lines.push("\nCreated directories:".to_string());
            for dir in &self.directories_created {
                lines.push(format!("  - {dir}"));
            }
        }
        if !self.files_created.is_empty() {
            lines.push("\nCreated files:".to_string());
            for file in &self.files_created {
                lines.push(format!("  - {file}"));
            }
        }
        if !self.files_skipped.is_empty() {
            lines.push("\nKept existing files:".to_string());
            for file in &self.files_skipped {
                lines.push(format!("  - {file}"));
            }
        }
        lines.join("\n")
    }
}

pub async fn execute(args: InitArgs, json_mode: bool) -> Result<()> {
    let output_data = scaffold(&args.path).await?;
    output(&output_data, json_mode);
    Ok(())
}

/// Create the workspace layout under `path`, never overwriting existing files.
pub async fn scaffold(path: &Path) -> Result<InitOutput> {
    let target_path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to get current directory")?
            .join(path)
    };

    let crucible_dir = target_path.join(CONFIG_DIR);
    let codegraph_dir = target_path.join(CODEGRAPH_DIR);

    let mut directories_created = vec![];
    for dir in [
        crucible_dir.clone(),
        crucible_dir.join(ENGAGEMENTS_DIR),
        codegraph_dir.clone(),
        codegraph_dir.join(LAYERS_DIR),
        codegraph_dir.join(DIAGRAMS_DIR),
    ] {
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            directories_created.push(relative(&target_path, &dir));
        }
    }

    let config_body = format!(
        "{CONFIG_HEADER}{}",
        serde_yaml::to_string(&Config::default()).context("Failed to render default config")?
    );

    let mut files = vec![
        (crucible_dir.join(CONFIG_FILE), config_body),
        (codegraph_dir.join(SCHEMA_FILE), SCHEMA_SKELETON.to_string()),
        (codegraph_dir.join(NODES_FILE), NODES_SKELETON.to_string()),
        (codegraph_dir.join(EDGES_FILE), EDGES_SKELETON.to_string()),
    ];
    let layers_dir = codegraph_dir.join(LAYERS_DIR);
    files.extend(LAYERS.iter().map(|(name, title)| {
        let number = name.split('_').next().unwrap_or_default();
        (layers_dir.join(name), format!("# {number}: {title}\n"))
    }));
    files.extend([
        (target_path.join("hypothesis_ledger.md"), HYPOTHESIS_LEDGER.to_string()),
        (target_path.join("unknowns.md"), UNKNOWNS_LEDGER.to_string()),
        (target_path.join("resume_pack.md"), RESUME_PACK.to_string()),
        (target_path.join("deployment_snapshot.md"), DEPLOYMENT_SNAPSHOT.to_string()),
    ]);

    let mut files_created = vec![];
    let mut files_skipped = vec![];
    for (file, body) in files {
        if fs::try_exists(&file).await.unwrap_or(false) {
            files_skipped.push(relative(&target_path, &file));
            continue;
        }
        fs::write(&file, body)
            .await
            .with_context(|| format!("Failed to write {}", file.display()))?;
        files_created.push(relative(&target_path, &file));
    }

    let message = if files_created.is_empty() && directories_created.is_empty() {
        "Workspace already initialized.".to_string()
    } else {
        "Workspace initialized.".to_string()
    };

    Ok(InitOutput {
        success: true,
        message,
        initialized_path: target_path,
        directories_created,
        files_created,
        files_skipped,
    })
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}
