//! unblock - connectivity bypass planner CLI
//!
//! Plans bypass strategies from diagnoses, renders recommendation lines,
//! tracks strategy feedback and exercises the reactive target sync.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cli;
mod commands;
mod config;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("unblock=info".parse()?))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = config::Config::load()?;

    // Execute command
    match cli.command {
        Commands::Plan(args) => commands::plan::execute(args, &config).await,
        Commands::Annotate { text } => commands::annotate::execute(&text, &config).await,
        Commands::Recommend(args) => commands::recommend::execute(args, &config).await,
        Commands::Feedback(cmd) => commands::feedback::execute(cmd, &config).await,
        Commands::Capabilities { json } => commands::capabilities::execute(json).await,
        Commands::SimulateSync(args) => commands::simulate::execute(args, &config).await,
        Commands::Version => {
            println!("unblock {}", env!("CARGO_PKG_VERSION"));
            println!("strategy catalog v{}", unblock_core::StrategyId::CATALOG_VERSION);
            Ok(())
        }
    }
}
