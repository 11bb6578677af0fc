use crate::config::Config;
use crate::orchestrator::Orchestrator;
use crate::watch::ConfigWatcher;
use crate::{ui, Workspace};
use anyhow::Result;
use std::time::Duration;
use tokio::task::JoinSet;

pub async fn execute(
    workspace: &Workspace,
    config: &Config,
    assume_yes: bool,
    debounce_ms: Option<u64>,
) -> Result<()> {
    let ports = super::ports(workspace, config, assume_yes)?;
    let orchestrator = Orchestrator::new(
        workspace.clone(),
        ports,
        config.bindings(),
        config.restart_delay(),
    );
    let debounce = debounce_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.debounce());

    let mut watcher = ConfigWatcher::start(workspace.root(), debounce)?;
    ui::status(
        "Watching",
        format!("{} (Ctrl-C to stop)", workspace.root().display()),
    );

    let mut runs = JoinSet::new();
    runs.spawn(sync_once(orchestrator.clone()));

    loop {
        tokio::select! {
            changed = watcher.changed() => {
                let Some(paths) = changed else {
                    break;
                };
                for path in &paths {
                    ui::status("Changed", path.display());
                }
                runs.spawn(sync_once(orchestrator.clone()));
            }
            Some(_) = runs.join_next() => {}
            _ = tokio::signal::ctrl_c() => {
                orchestrator.cancellation_token().cancel();
                break;
            }
        }
    }

    while runs.join_next().await.is_some() {}
    orchestrator.settle().await;
    ui::status("Stopped", "watching");
    Ok(())
}

async fn sync_once(orchestrator: Orchestrator) {
    let summary = orchestrator.run().await;
    super::sync::print_summary(&summary);
}
