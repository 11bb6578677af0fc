use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// mise-sync - keep an editor workspace in step with mise
///
/// mise-sync asks mise which tools the workspace pins, installs the missing
/// ones (with your consent), keeps a stable symlink per tool under
/// `.vscode/vscode-mise-installs/` and points VS Code extensions at those
/// links.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Workspace root (defaults to the current directory)
    #[arg(short, long, global = true, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Install missing tools without asking
    #[arg(short, long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install, link and configure the workspace's tools once
    Sync,

    /// Sync now, then again whenever a mise config file changes
    Watch {
        /// Milliseconds to wait for changes to settle (overrides config)
        #[arg(long, value_name = "MS")]
        debounce_ms: Option<u64>,
    },

    /// Show resolved tools with their install, link and extension state
    Status,
}
