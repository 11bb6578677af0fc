// Public API
pub mod cli;
pub mod commands;

// Core domain types
pub mod config;
pub mod error;
pub mod extensions;
pub mod host;
pub mod installers;
pub mod links;
pub mod orchestrator;
pub mod toolset;
pub mod watch;
mod ui;
mod util;
mod workspace;

#[cfg(test)]
mod testing;

// Re-export main types
pub use config::Config;
pub use error::{Result, SyncError};
pub use extensions::{Bindings, ExtensionBinding, ExtensionOutcome, PathStyle};
pub use host::Ports;
pub use installers::{InstallOutcome, MiseCli, VersionManager};
pub use links::{LinkOutcome, LinkState};
pub use orchestrator::{Orchestrator, PipelineOutcome, RunSummary, ToolReport};
pub use toolset::Tool;
pub use workspace::{Workspace, WorkspacePath};
