use super::commands::{RoutesCommands, RunCommands};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "wayfinder")]
#[command(about = "Deterministic screen navigation over lifecycle-independent state")]
pub struct Cli {
    /// Path to a config file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the route table
    Routes(RoutesCommands),
    /// Replay a scripted navigation session
    Run(RunCommands),
}
