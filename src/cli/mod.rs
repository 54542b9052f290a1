//! Command-line interface

pub mod interrupt;
pub mod output;

use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

/// Provision a Hono edge worker: scaffold, publish to GitHub, deploy
#[derive(Debug, Parser, Clone)]
#[command(name = "provision")]
#[command(version)]
#[command(
    about = "Scaffold a Hono worker, push it to a new GitHub repository and deploy it",
    long_about = None
)]
pub struct Cli {
    /// Name of the project (directory, repository and worker name)
    pub project_name: String,

    /// Path to a YAML settings file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Parent directory the project is created in
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Undo this run's steps when a step fails instead of leaving them for resume
    #[arg(long)]
    pub rollback: bool,

    /// Report which steps are already satisfied without changing anything
    #[arg(long, conflicts_with = "history")]
    pub plan: bool,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,

    /// Show previous runs for the project and exit
    #[arg(long)]
    pub history: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
