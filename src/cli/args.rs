//! CLI argument definitions.
//!
//! This module defines all CLI arguments using clap's derive macros.
//! The main entry point is the [`Cli`] struct.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Switchback - script-driven wizard, dashboard, and workflow launcher.
#[derive(Debug, Parser)]
#[command(name = "switchback")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load a definition and walk its pages
    Run(RunArgs),

    /// Validate a definition file without running it
    Check(CheckArgs),

    /// Resume a workflow paused for a reboot
    Resume(ResumeArgs),

    /// Print the definition JSON schema
    Schema,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the `run` command.
#[derive(Debug, Clone, clap::Args)]
pub struct RunArgs {
    /// Definition file (.yml/.yaml, or a script with an embedded header)
    pub definition: PathBuf,

    /// Pre-set parameter values (name=value, repeatable)
    #[arg(long = "set", value_name = "NAME=VALUE")]
    pub set: Vec<String>,

    /// Use current values and defaults, no prompts
    #[arg(long)]
    pub non_interactive: bool,

    /// Directory for run logs (overrides the definition's log_dir)
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

/// Arguments for the `check` command.
#[derive(Debug, Clone, clap::Args)]
pub struct CheckArgs {
    /// Definition file to validate
    pub definition: PathBuf,
}

/// Arguments for the `resume` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ResumeArgs {
    /// Use current values and defaults, no prompts
    #[arg(long)]
    pub non_interactive: bool,
}

/// Arguments for the `completions` command.
#[derive(Debug, Clone, clap::Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
