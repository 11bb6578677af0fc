//! One sync run: resolve the toolset, then drive every tool through
//! install, link and extension reconciliation.
//!
//! Tools run as independent tasks. Within a tool the steps are strictly
//! sequential and the first failure ends that tool's pipeline; siblings are
//! never affected.

use std::collections::btree_map::{BTreeMap, Entry};
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::extensions::{Bindings, ExtensionOutcome, ExtensionReconciler};
use crate::host::Ports;
use crate::installers::{InstallOutcome, InstallReconciler};
use crate::links::{LinkOutcome, LinkStabilizer};
use crate::toolset::{self, Tool};
use crate::workspace::{link_name, Workspace};

/// Terminal state of a pipeline that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub link: LinkOutcome,
    pub extension: ExtensionOutcome,
}

#[derive(Debug)]
pub struct ToolReport {
    pub name: String,
    pub version: String,
    pub result: Result<PipelineOutcome>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<ToolReport>,
}

impl RunSummary {
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ToolReport> {
        self.reports.iter().find(|report| report.name == name)
    }

    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.result.is_ok()).count()
    }

    pub fn declined(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(&r.result, Err(err) if err.is_declined()))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.reports.len() - self.succeeded() - self.declined()
    }
}

struct Inner {
    workspace: Workspace,
    ports: Ports,
    installer: InstallReconciler,
    links: LinkStabilizer,
    extensions: ExtensionReconciler,
    cancel: Mutex<CancellationToken>,
}

/// Cheap to clone; clones share the in-flight install registry, so
/// overlapping runs never install the same tool twice.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        workspace: Workspace,
        ports: Ports,
        bindings: Bindings,
        restart_delay: Duration,
    ) -> Self {
        let installer =
            InstallReconciler::new(Arc::clone(&ports.manager), Arc::clone(&ports.notifier));
        let extensions = ExtensionReconciler::new(
            workspace.clone(),
            bindings,
            Arc::clone(&ports.settings),
            Arc::clone(&ports.extensions),
            Arc::clone(&ports.notifier),
            restart_delay,
        );

        Self {
            inner: Arc::new(Inner {
                links: LinkStabilizer::new(&workspace),
                workspace,
                ports,
                installer,
                extensions,
                cancel: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.inner.workspace
    }

    /// Firing this token stops running installs. Link and extension steps of
    /// the affected tools are skipped; nothing is rolled back.
    ///
    /// Once fired, the token is spent: runs started afterwards get a fresh one.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.current_token()
    }

    pub async fn run(&self) -> RunSummary {
        let cancel = self.inner.current_token();
        let tools =
            toolset::resolve(self.inner.ports.manager.as_ref(), &self.inner.workspace).await;
        if tools.is_empty() {
            info!("Resolution empty for {:?}", self.inner.workspace.root());
            return RunSummary::default();
        }
        debug!("Syncing {}", toolset::tool_names(&tools).join(", "));

        // Tool names that flatten to the same link name would keep relinking
        // each other; the first in resolution order keeps the link.
        let mut link_owners: BTreeMap<String, String> = BTreeMap::new();
        let pipelines: Vec<_> = tools
            .into_iter()
            .map(|tool| {
                let pending = match link_owners.entry(link_name(&tool.name)) {
                    Entry::Occupied(owner) => Err(self.inner.link_conflict(&tool, owner.get())),
                    Entry::Vacant(slot) => {
                        slot.insert(tool.name.clone());
                        let inner = Arc::clone(&self.inner);
                        let task_tool = tool.clone();
                        let cancel = cancel.clone();
                        Ok(tokio::spawn(async move {
                            inner.pipeline(&task_tool, &cancel).await
                        }))
                    }
                };
                (tool, pending)
            })
            .collect();

        let mut summary = RunSummary::default();
        for (tool, pending) in pipelines {
            let result = match pending {
                Err(err) => Err(err),
                Ok(handle) => handle.await.unwrap_or_else(|err| {
                    Err(SyncError::Aborted {
                        tool: tool.spec(),
                        message: err.to_string(),
                    })
                }),
            };
            self.inner.report(&tool, &result);
            summary.reports.push(ToolReport {
                name: tool.name,
                version: tool.version,
                result,
            });
        }
        summary
    }

    /// Wait for restart requests issued by earlier runs.
    pub async fn settle(&self) {
        self.inner.extensions.settle().await;
    }
}

impl Inner {
    fn current_token(&self) -> CancellationToken {
        let mut cancel = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        if cancel.is_cancelled() {
            *cancel = CancellationToken::new();
        }
        cancel.clone()
    }

    fn link_conflict(&self, tool: &Tool, owner: &str) -> SyncError {
        SyncError::link(
            "create link",
            self.links.link_path(&tool.name),
            io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("link name already used by {owner}"),
            ),
        )
    }

    async fn pipeline(
        &self,
        tool: &Tool,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome> {
        match self.installer.ensure_installed(tool, cancel).await {
            InstallOutcome::Success => {}
            InstallOutcome::Declined => {
                return Err(SyncError::InstallDeclined { tool: tool.spec() })
            }
            InstallOutcome::Failed(reason) => {
                return Err(SyncError::InstallFailed {
                    tool: tool.spec(),
                    reason,
                })
            }
        }

        let link = self.links.stabilize(tool).await?;
        let extension = self.extensions.reconcile(tool).await?;
        Ok(PipelineOutcome { link, extension })
    }

    fn report(&self, tool: &Tool, result: &Result<PipelineOutcome>) {
        match result {
            Ok(outcome) => debug!("{tool}: {:?} / {:?}", outcome.link, outcome.extension),
            Err(err) if err.is_declined() => self.ports.notifier.log(&err.to_string()),
            // Already surfaced by the installer.
            Err(err @ SyncError::InstallFailed { .. }) => {
                warn!("{err}");
                self.ports.notifier.log(&err.to_string());
            }
            Err(err) => {
                warn!("{err}");
                self.ports
                    .notifier
                    .error(&format!("Mise: Failed to sync {tool}: {err}"));
            }
        }
    }
}
