use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::commands::{check::CheckArgs, ignore::IgnoreCommand, status::StatusArgs, watch::WatchArgs};

#[derive(Parser, Debug)]
#[command(
    name = "filetrack",
    version,
    about = "Track file contents and report what changed",
    long_about = "filetrack keeps a backup of every tracked file below a root directory and prints a diff whenever a file's content changes. Files can be excluded with .trackignore rule files."
)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file (defaults to <root>/filetrack.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Tracker root directory (overrides the config file; defaults to the current directory)
    #[arg(short, long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch for changes and print a diff for each one
    #[command(about = "Track paths and report content changes as they happen")]
    Watch(WatchArgs),

    /// Compare tracked files against their backups once
    #[command(about = "Report changes made since the last run, then exit")]
    Check(CheckArgs),

    /// Edit and inspect ignore rules
    #[command(subcommand)]
    Ignore(IgnoreCommand),

    /// Show what is tracked
    #[command(about = "List tracked entries and loaded rule files")]
    Status(StatusArgs),
}
