// ABOUTME: Entry point for the jumplist CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use jumplist::config::{self, Config};
use jumplist::error::Result;
use jumplist::output::{Output, OutputMode};
use std::env;
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = match &cli.command {
        Commands::List { json: true } => OutputMode::Json,
        _ => OutputMode::Normal,
    };

    if let Err(e) = run(cli).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cwd = env::current_dir()?;

    match cli.command {
        Commands::Init { force } => {
            let path = match cli.config {
                Some(path) => {
                    config::init_config_at(&path, force)?;
                    path
                }
                None => config::init_config(&cwd, force)?,
            };
            println!("Created {}", path.display());
            Ok(())
        }
        Commands::List { json } => {
            let config = load_config(cli.config.as_deref(), &cwd)?;
            let output = Output::new(if json {
                OutputMode::Json
            } else {
                OutputMode::Normal
            });
            for endpoint in config.endpoints.iter() {
                output.endpoint(endpoint);
            }
            Ok(())
        }
        Commands::Serve => {
            let config = load_config(cli.config.as_deref(), &cwd)?;
            tokio::select! {
                result = jumplist::server::run(&config) => result,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupted, shutting down");
                    Ok(())
                }
            }
        }
    }
}

fn load_config(path: Option<&Path>, cwd: &Path) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::discover(cwd),
    }
}
