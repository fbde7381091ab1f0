//! Gatehouse - authenticating reverse proxy
//!
//! Main entry point for the gatehouse CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod commands;

use commands::{check_config, serve};

/// Gatehouse - authenticating reverse proxy
#[derive(Parser)]
#[command(name = "gatehouse")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file (default: ./gatehouse.toml if present)
    #[arg(long, global = true, env = "GATEHOUSE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the proxy
    Serve(serve::ServeArgs),

    /// Validate configuration and print the resolved settings
    CheckConfig(check_config::CheckConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "gatehouse=debug,gatehouse_server=debug,gatehouse_oauth=debug,gatehouse_session=debug,gatehouse_config=debug,tower_http=debug,info"
    } else {
        "gatehouse=info,gatehouse_server=info,gatehouse_oauth=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(filter),
        )
        .init();

    let ctx = commands::Context {
        config: cli.config,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Serve(args) => serve::run(args, &ctx).await,
        Commands::CheckConfig(args) => check_config::run(args, &ctx).await,
    }
}
