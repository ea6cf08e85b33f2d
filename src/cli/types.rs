//! CLI type definitions
//!
//! Clap command structures that define the CLI surface. Per-command argument
//! structs live next to their implementations in `commands/`.

use clap::{Parser, Subcommand};

use crate::cli::commands::graph::GraphArgs;
use crate::cli::commands::init::InitArgs;
use crate::cli::commands::run::RunArgs;
use crate::cli::commands::show::ShowArgs;

#[derive(Parser, Debug)]
#[command(name = "crucible")]
#[command(about = "Crucible - convergence-driven multi-worker analysis engine", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scaffold .crucible/ configuration and an empty codegraph
    Init(InitArgs),

    /// Inspect a codegraph snapshot
    Graph(GraphArgs),

    /// Run an engagement against a codegraph snapshot
    Run(RunArgs),

    /// Show the summary of a finished engagement
    Show(ShowArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::graph::GraphCommands;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_json_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["crucible", "graph", "validate", "cg", "--json"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Graph(args) => assert!(matches!(args.command, GraphCommands::Validate { .. })),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_triage_flags_parse() {
        let cli = Cli::try_parse_from([
            "crucible",
            "graph",
            "triage",
            "--limit",
            "5",
            "--permissionless-only",
            "--value-edge",
            "TRANSFERS",
            "--value-edge",
            "MINTS",
        ])
        .unwrap();
        let Commands::Graph(args) = cli.command else {
            panic!("expected graph command");
        };
        let GraphCommands::Triage(triage) = args.command else {
            panic!("expected triage");
        };
        assert_eq!(triage.limit, 5);
        assert!(triage.permissionless_only);
        assert_eq!(triage.value_edge, vec!["TRANSFERS", "MINTS"]);
    }
}
