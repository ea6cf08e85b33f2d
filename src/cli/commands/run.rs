//! `crucible run`: one engagement against a codegraph snapshot.

use anyhow::{anyhow, Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::adapters::artifacts::FilesystemArtifactSink;
use crate::adapters::oracle::ProcessOracle;
use crate::adapters::workers::WorkerRegistry;
use crate::cli::commands::show::SummaryOutput;
use crate::cli::output::output;
use crate::domain::models::{Config, TargetRef};
use crate::infrastructure::config::ConfigLoader;
use crate::services::{EngagementOrchestrator, TargetSnapshot, WorkerDispatcher};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Codegraph directory describing the target
    #[arg(default_value = "codegraph")]
    pub codegraph: PathBuf,

    /// Human-readable target label (defaults to the directory name)
    #[arg(long)]
    pub label: Option<String>,

    /// Pin of the point-in-time view (commit, block number, ...)
    #[arg(long)]
    pub pin: Option<String>,
}

impl RunArgs {
    fn target(&self) -> TargetRef {
        let label = self.label.clone().unwrap_or_else(|| {
            std::fs::canonicalize(&self.codegraph)
                .ok()
                .as_deref()
                .and_then(|p| p.parent())
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "target".to_string())
        });
        let reference = TargetRef::new(label, self.codegraph.display().to_string());
        match &self.pin {
            Some(pin) => reference.with_pin(pin.clone()),
            None => reference,
        }
    }
}

/// Wire process adapters from configuration.
pub fn build_orchestrator(config: &Config) -> Result<EngagementOrchestrator> {
    if config.workers.is_empty() {
        return Err(anyhow!(
            "No workers configured. Add entries under `workers:` in .crucible/config.yaml"
        ));
    }
    let oracle_config = config.oracle.as_ref().ok_or_else(|| {
        anyhow!("No oracle configured. Add an `oracle:` section to .crucible/config.yaml")
    })?;

    let registry =
        WorkerRegistry::from_config(&config.workers).context("Failed to build worker registry")?;
    let dispatcher = WorkerDispatcher::new(registry.into_workers(), &config.dispatcher)
        .context("Failed to build worker dispatcher")?;

    let oracle = Arc::new(ProcessOracle::from_config(oracle_config));
    let sink = Arc::new(FilesystemArtifactSink::new(&config.artifacts.dir));

    Ok(EngagementOrchestrator::new(
        dispatcher,
        oracle.clone(),
        oracle,
        sink,
        config,
    ))
}

pub async fn execute(args: RunArgs, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load().context("Failed to load configuration")?;
    let orchestrator = build_orchestrator(&config)?;

    let target = args.target();
    info!(
        target = %target.label,
        codegraph = %target.location,
        workers = config.workers.len(),
        "Running engagement"
    );

    let run = orchestrator
        .run(TargetSnapshot::Codegraph(target))
        .await
        .context("Engagement aborted")?;

    output(
        &SummaryOutput {
            summary: run.summary,
        },
        json_mode,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{OracleConfig, WorkerConfig};
    use std::collections::HashMap;

    fn worker(id: &str) -> WorkerConfig {
        WorkerConfig {
            id: id.to_string(),
            topic: "ordering".to_string(),
            command: "crucible-worker".to_string(),
            args: vec![],
            env: HashMap::new(),
        }
    }

    #[test]
    fn test_requires_workers_and_oracle() {
        let err = build_orchestrator(&Config::default()).err().unwrap();
        assert!(err.to_string().contains("No workers configured"));

        let config = Config {
            workers: vec![worker("a"), worker("b")],
            ..Default::default()
        };
        let err = build_orchestrator(&config).err().unwrap();
        assert!(err.to_string().contains("No oracle configured"));

        let config = Config {
            oracle: Some(OracleConfig {
                command: "crucible-oracle".to_string(),
                args: vec![],
                timeout_secs: 5,
            }),
            ..config
        };
        assert!(build_orchestrator(&config).is_ok());
    }

    #[test]
    fn test_target_reference_from_args() {
        let args = RunArgs {
            codegraph: PathBuf::from("codegraph"),
            label: Some("vault".to_string()),
            pin: Some("block 19000000".to_string()),
        };
        let target = args.target();
        assert_eq!(target.label, "vault");
        assert_eq!(target.location, "codegraph");
        assert_eq!(target.pin.as_deref(), Some("block 19000000"));
    }
}
