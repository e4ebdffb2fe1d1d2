use anyhow::Result;
use clap::Parser;
use log::info;
use wayfinder::config::HostConfig;

mod cli;

use cli::Cli;
use cli::app::Commands;
use cli::commands::{handle_routes_command, handle_run_command};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger to file (truncate on each run)
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open("wayfinder.log")?;
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();

    let cli = Cli::parse();
    info!("Starting wayfinder");

    let config = match &cli.config {
        Some(path) => HostConfig::load_from(path)?,
        None => HostConfig::load()?,
    };

    match cli.command {
        Commands::Routes(args) => handle_routes_command(args, &config),
        Commands::Run(args) => handle_run_command(args, &config).await,
    }
}
