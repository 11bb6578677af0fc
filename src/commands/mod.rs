use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::host::{ConsoleNotifier, Ports, SettingsFile, VscodeExtensions};
use crate::installers::MiseCli;
use crate::util::xdg;
use crate::{Workspace, WorkspacePath};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

mod status;
mod sync;
mod watch;

pub fn execute(cli: Cli) -> Result<()> {
    // Resolve workspace - this is the root entry point
    let workspace = Workspace::discover(cli.workspace.as_deref())?;
    let config = Config::load_for(&workspace)?;
    let assume_yes = cli.yes || config.auto_install;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    match cli.command {
        Commands::Sync => runtime.block_on(sync::execute(&workspace, &config, assume_yes)),

        Commands::Watch { debounce_ms } => runtime.block_on(watch::execute(
            &workspace,
            &config,
            assume_yes,
            debounce_ms,
        )),

        Commands::Status => runtime.block_on(status::execute(&workspace, &config)),
    }
}

fn extension_dirs(config: &Config) -> Result<Vec<PathBuf>> {
    if config.extensions_dirs.is_empty() {
        Ok(VscodeExtensions::default_dirs(&xdg::home_dir()?))
    } else {
        Ok(config.extensions_dirs.clone())
    }
}

/// Concrete ports for a VS Code workspace on this machine.
fn ports(workspace: &Workspace, config: &Config, assume_yes: bool) -> Result<Ports> {
    let state_dir = xdg::state_dir()?;

    Ok(Ports {
        manager: Arc::new(MiseCli::new(&config.mise_bin, workspace.root())),
        settings: Arc::new(SettingsFile::new(workspace.path(WorkspacePath::Settings))),
        extensions: Arc::new(VscodeExtensions::new(extension_dirs(config)?)),
        notifier: Arc::new(ConsoleNotifier::new(&state_dir, assume_yes)),
    })
}
