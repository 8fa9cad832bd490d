//! CLI module for forgeflow - command-line interface and subcommands.
//!
//! Every subcommand takes a YAML task plan: `run` executes it, `batches`
//! previews the dependency levels and `check` validates it.

pub mod commands;

pub use commands::Cli;
