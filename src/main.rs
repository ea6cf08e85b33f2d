//! Crucible CLI entry point.

use clap::Parser;

use crucible::cli::{Cli, Commands};
use crucible::infrastructure::config::ConfigLoader;
use crucible::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Config errors surface again, with context, from the commands that need it.
    let log_config = ConfigLoader::load()
        .map(|config| LogConfig::from(&config.logging))
        .unwrap_or_default();
    let _logger = match LoggerImpl::init(&log_config) {
        Ok(logger) => Some(logger),
        Err(err) => {
            eprintln!("warning: logging disabled: {err:#}");
            None
        }
    };

    let result = match cli.command {
        Commands::Init(args) => crucible::cli::commands::init::execute(args, cli.json).await,
        Commands::Graph(args) => crucible::cli::commands::graph::execute(args, cli.json).await,
        Commands::Run(args) => crucible::cli::commands::run::execute(args, cli.json).await,
        Commands::Show(args) => crucible::cli::commands::show::execute(args, cli.json).await,
    };

    if let Err(err) = result {
        crucible::cli::handle_error(err, cli.json);
    }
}
