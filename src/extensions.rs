use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::error::Result;
use crate::host::{ExtensionHost, Notifier, SettingsStore};
use crate::toolset::Tool;
use crate::workspace::Workspace;

/// How the stable path is written into the extension's setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathStyle {
    /// `.vscode/vscode-mise-installs/<tool>/...`
    #[default]
    Relative,
    /// `${workspaceFolder}/.vscode/vscode-mise-installs/<tool>/...`
    WorkspaceFolder,
    /// Fully resolved path on this machine.
    Absolute,
}

/// Declarative link between a managed tool and the extension that uses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionBinding {
    /// Extension identifier, `publisher.name`
    pub extension: String,
    /// Setting key the extension reads the tool location from
    pub setting: String,
    /// Path inside the tool's install directory (empty for the directory itself)
    #[serde(default)]
    pub path: String,
    /// Whether the setting takes a list of paths
    #[serde(default)]
    pub list: bool,
    #[serde(default)]
    pub style: PathStyle,
    /// Editor command that makes the extension pick up the new setting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<String>,
}

impl ExtensionBinding {
    fn new(
        extension: &str,
        setting: &str,
        path: &str,
        list: bool,
        style: PathStyle,
        restart: Option<&str>,
    ) -> Self {
        Self {
            extension: extension.to_string(),
            setting: setting.to_string(),
            path: path.to_string(),
            list,
            style,
            restart: restart.map(str::to_string),
        }
    }

    /// Setting value that points the extension at the tool's stable link.
    pub fn desired_value(&self, workspace: &Workspace, tool_name: &str) -> Value {
        let mut relative = workspace.link_relative(tool_name);
        let inner = self.path.trim_matches('/');
        if !inner.is_empty() {
            relative.push('/');
            relative.push_str(inner);
        }

        let location = match self.style {
            PathStyle::Relative => relative,
            PathStyle::WorkspaceFolder => format!("${{workspaceFolder}}/{relative}"),
            PathStyle::Absolute => workspace.root().join(&relative).display().to_string(),
        };

        if self.list {
            Value::Array(vec![Value::String(location)])
        } else {
            Value::String(location)
        }
    }
}

/// Tool name → binding table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bindings {
    entries: BTreeMap<String, ExtensionBinding>,
}

impl Default for Bindings {
    fn default() -> Self {
        use PathStyle::*;

        let mut entries = BTreeMap::new();
        entries.insert(
            "deno".to_string(),
            ExtensionBinding::new(
                "denoland.vscode-deno",
                "deno.path",
                "bin/deno",
                false,
                Relative,
                Some("deno.client.restart"),
            ),
        );
        entries.insert(
            "ruff".to_string(),
            ExtensionBinding::new(
                "charliermarsh.ruff",
                "ruff.path",
                "bin/ruff",
                true,
                Relative,
                Some("ruff.restart"),
            ),
        );
        entries.insert(
            "go".to_string(),
            ExtensionBinding::new(
                "golang.go",
                "go.goroot",
                "",
                false,
                WorkspaceFolder,
                Some("go.languageserver.restart"),
            ),
        );
        entries.insert(
            "bun".to_string(),
            ExtensionBinding::new(
                "oven.bun-vscode",
                "bun.runtime",
                "bin/bun",
                false,
                Relative,
                None,
            ),
        );

        Self { entries }
    }
}

impl Bindings {
    /// Built-in table with user-configured bindings layered on top.
    pub fn with_overrides(overrides: &BTreeMap<String, ExtensionBinding>) -> Self {
        let mut bindings = Self::default();
        for (tool, binding) in overrides {
            bindings.insert(tool, binding.clone());
        }
        bindings
    }

    pub fn insert(&mut self, tool: &str, binding: ExtensionBinding) {
        self.entries.insert(tool.to_string(), binding);
    }

    pub fn get(&self, tool: &str) -> Option<&ExtensionBinding> {
        self.entries.get(tool)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ExtensionBinding)> {
        self.entries.iter()
    }
}

/// Result of reconciling one tool's dependent extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionOutcome {
    Updated,
    Unchanged,
    Skipped,
}

/// Points dependent extensions at the stable links.
pub struct ExtensionReconciler {
    workspace: Workspace,
    bindings: Bindings,
    settings: Arc<dyn SettingsStore>,
    host: Arc<dyn ExtensionHost>,
    notifier: Arc<dyn Notifier>,
    restart_delay: Duration,
    restarts: TaskTracker,
}

impl ExtensionReconciler {
    pub fn new(
        workspace: Workspace,
        bindings: Bindings,
        settings: Arc<dyn SettingsStore>,
        host: Arc<dyn ExtensionHost>,
        notifier: Arc<dyn Notifier>,
        restart_delay: Duration,
    ) -> Self {
        Self {
            workspace,
            bindings,
            settings,
            host,
            notifier,
            restart_delay,
            restarts: TaskTracker::new(),
        }
    }

    pub async fn reconcile(&self, tool: &Tool) -> Result<ExtensionOutcome> {
        let Some(binding) = self.bindings.get(&tool.name) else {
            return Ok(ExtensionOutcome::Skipped);
        };

        if !self.host.is_installed(&binding.extension).await {
            debug!("{} is not installed, leaving {tool} unbound", binding.extension);
            return Ok(ExtensionOutcome::Skipped);
        }

        let desired = binding.desired_value(&self.workspace, &tool.name);
        let current = self.settings.get(&binding.setting).await?;
        if current.as_ref().map(normalize) == Some(normalize(&desired)) {
            return Ok(ExtensionOutcome::Unchanged);
        }

        self.settings.update(&binding.setting, desired).await?;
        self.notifier.info(&format!(
            "Mise: Configured the extension {} to use {tool}",
            binding.extension
        ));
        self.notifier
            .log(&format!("Set {} for {}", binding.setting, binding.extension));

        if let Some(command) = binding.restart.clone() {
            self.request_restart(command);
        }

        Ok(ExtensionOutcome::Updated)
    }

    /// Fire-and-forget: failures are logged, never returned to the pipeline.
    fn request_restart(&self, command: String) {
        let host = Arc::clone(&self.host);
        let delay = self.restart_delay;
        self.restarts.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(err) = host.execute_command(&command).await {
                warn!("Restart command {command} failed: {err}");
            }
        });
    }

    /// Wait for every restart request issued so far.
    pub async fn settle(&self) {
        self.restarts.close();
        self.restarts.wait().await;
        self.restarts.reopen();
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }
}

/// Canonical form for comparing setting values.
pub fn normalize(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            let s = s.trim().replace('\\', "/");
            let trimmed = s.trim_end_matches('/');
            Value::String(if trimmed.is_empty() { s } else { trimmed.to_string() })
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        other => other.clone(),
    }
}
