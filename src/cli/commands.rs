//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: execute a plan against the backend
//! - batches: show the batches a plan would run in
//! - check: validate a plan without running it

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Forgeflow - dependency-aware parallel task runner for AI code generation
#[derive(Parser, Debug)]
#[command(name = "forgeflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute every task of a plan
    Run {
        /// Path to the YAML plan
        plan: PathBuf,

        /// Override executor.max_workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Write the execution report as JSON
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Print the batches a plan would execute in
    Batches {
        /// Path to the YAML plan
        plan: PathBuf,
    },

    /// Validate a plan: names, dependencies and cycles
    Check {
        /// Path to the YAML plan
        plan: PathBuf,
    },
}

impl Commands {
    /// Plan file the command operates on
    pub fn plan_path(&self) -> &PathBuf {
        match self {
            Commands::Run { plan, .. } | Commands::Batches { plan } | Commands::Check { plan } => plan,
        }
    }
}
