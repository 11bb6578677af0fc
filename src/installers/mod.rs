use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::host::{InstallLog, Notifier};
use crate::toolset::Tool;

mod inflight;
mod mise;

pub use inflight::{Claim, InFlightInstalls, InstallTicket};
pub use mise::MiseCli;

/// How an installer subprocess ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallExit {
    Success,
    /// Non-zero exit code, or `None` when terminated by a signal.
    Failed(Option<i32>),
    Cancelled,
}

/// Subprocess port onto the version manager.
#[async_trait]
pub trait VersionManager: Send + Sync {
    /// Raw JSON from `list --current --json`.
    async fn list_current(&self) -> Result<String>;

    /// Install one tool, streaming output into `log` until exit or cancellation.
    async fn install(
        &self,
        tool: &Tool,
        log: Arc<dyn InstallLog>,
        cancel: CancellationToken,
    ) -> Result<InstallExit>;
}

/// Terminal state of `ensure_installed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Success,
    Declined,
    Failed(String),
}

/// Brings tools to the installed state with the user's consent.
///
/// At most one install per tool name runs at any time across every run that
/// shares this reconciler's registry.
pub struct InstallReconciler {
    manager: Arc<dyn VersionManager>,
    notifier: Arc<dyn Notifier>,
    in_flight: Arc<InFlightInstalls>,
}

impl InstallReconciler {
    pub fn new(manager: Arc<dyn VersionManager>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            manager,
            notifier,
            in_flight: InFlightInstalls::new(),
        }
    }

    pub fn in_flight(&self) -> &Arc<InFlightInstalls> {
        &self.in_flight
    }

    /// Installs started here stop when `cancel` fires. Joining an install
    /// started elsewhere adopts that install's outcome.
    pub async fn ensure_installed(
        &self,
        tool: &Tool,
        cancel: &CancellationToken,
    ) -> InstallOutcome {
        if tool.installed {
            return InstallOutcome::Success;
        }

        loop {
            match self.in_flight.claim(&tool.name, &tool.version) {
                Claim::Started(ticket) => {
                    let outcome = self.install(tool, cancel).await;
                    ticket.finish(outcome.clone());
                    return outcome;
                }
                Claim::Pending { version, done } if version == tool.version => {
                    debug!("Joining in-flight install of {tool}");
                    return inflight::wait(done).await;
                }
                Claim::Pending { version, done } => {
                    info!(
                        "Waiting for {}@{version} to finish before installing {tool}",
                        tool.name
                    );
                    inflight::wait(done).await;
                }
            }
        }
    }

    async fn install(&self, tool: &Tool, cancel: &CancellationToken) -> InstallOutcome {
        let spec = tool.spec();

        if !self
            .notifier
            .confirm(&format!("Mise: Do you want to install {spec}?"))
            .await
        {
            self.notifier.log(&format!("Install of {spec} declined"));
            return InstallOutcome::Declined;
        }

        self.notifier.log(&format!("Installing {spec}"));
        let log = self
            .notifier
            .install_log(&format!("Mise Install {spec}"))
            .await;

        let result = self
            .manager
            .install(tool, log, cancel.child_token())
            .await;

        match result {
            Ok(InstallExit::Success) => {
                self.notifier.info(&format!("Mise: Installed {spec}"));
                InstallOutcome::Success
            }
            Ok(InstallExit::Failed(code)) => {
                let reason = match code {
                    Some(code) => format!("exit code {code}"),
                    None => "terminated by signal".to_string(),
                };
                self.notifier
                    .error(&format!("Mise: Install failed for {spec} ({reason})"));
                InstallOutcome::Failed(reason)
            }
            Ok(InstallExit::Cancelled) => {
                self.notifier
                    .error(&format!("Mise: Install cancelled for {spec}"));
                InstallOutcome::Failed("cancelled".to_string())
            }
            Err(err) => {
                warn!("Install of {spec} could not run: {err}");
                self.notifier
                    .error(&format!("Mise: Install failed for {spec}: {err}"));
                InstallOutcome::Failed(err.to_string())
            }
        }
    }
}
