use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::extensions::{Bindings, ExtensionBinding};
use crate::util::xdg;
use crate::workspace::{Workspace, WorkspacePath};

const DEFAULT_MISE_BIN: &str = "mise";

/// Overrides `mise_bin` from any config file.
pub const MISE_BIN_ENV: &str = "MISE_SYNC_MISE_BIN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Program used to resolve and install tools
    pub mise_bin: String,
    /// Install missing tools without asking
    pub auto_install: bool,
    /// Delay before asking an extension to restart after its setting changed
    pub restart_delay_ms: u64,
    /// Quiet period for batching config file changes in `watch`
    pub debounce_ms: u64,
    /// Extension directories to scan instead of the VS Code defaults
    pub extensions_dirs: Vec<PathBuf>,
    /// Added or replaced tool → extension bindings
    pub bindings: BTreeMap<String, ExtensionBinding>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mise_bin: DEFAULT_MISE_BIN.to_string(),
            auto_install: false,
            restart_delay_ms: 500,
            debounce_ms: 300,
            extensions_dirs: Vec::new(),
            bindings: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {:?}", path))
    }

    /// The workspace's own config file if it has one, else the user config.
    pub fn source_for(workspace: &Workspace) -> Result<Option<PathBuf>> {
        let local = workspace.path(WorkspacePath::Config);
        if local.exists() {
            return Ok(Some(local));
        }

        let global = xdg::config_dir()?.join("config.toml");
        Ok(global.exists().then_some(global))
    }

    /// Load the effective configuration for `workspace`, environment included.
    pub fn load_for(workspace: &Workspace) -> Result<Self> {
        let mut config = match Self::source_for(workspace)? {
            Some(path) => {
                debug!("Using config {:?}", path);
                Self::load(&path)?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(bin) = env::var(MISE_BIN_ENV) {
            if !bin.trim().is_empty() {
                self.mise_bin = bin;
            }
        }
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Built-in bindings with this config's entries applied on top.
    pub fn bindings(&self) -> Bindings {
        Bindings::with_overrides(&self.bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::PathStyle;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_default() {
        let temp = TempDir::new().unwrap();

        let config = Config::load(&temp.path().join("mise-sync.toml")).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.restart_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mise-sync.toml");
        fs::write(&path, "auto_install = true\ndebounce_ms = 50\n").unwrap();

        let config = Config::load(&path).unwrap();

        assert!(config.auto_install);
        assert_eq!(config.debounce(), Duration::from_millis(50));
        assert_eq!(config.mise_bin, "mise");
        assert_eq!(config.restart_delay_ms, 500);
    }

    #[test]
    fn test_bindings_table() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mise-sync.toml");
        fs::write(
            &path,
            r#"
[bindings.python]
extension = "ms-python.python"
setting = "python.defaultInterpreterPath"
path = "bin/python"
style = "workspace-folder"

[bindings.deno]
extension = "denoland.vscode-deno"
setting = "deno.path"
path = "bin/deno"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        let bindings = config.bindings();

        let python = bindings.get("python").unwrap();
        assert_eq!(python.style, PathStyle::WorkspaceFolder);
        assert_eq!(python.restart, None);
        assert!(!python.list);
        assert_eq!(bindings.get("deno").unwrap().restart, None);
        assert!(bindings.get("go").is_some());
    }

    #[test]
    fn test_invalid_file_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mise-sync.toml");
        fs::write(&path, "restart_delay_ms = \"soon\"").unwrap();

        let err = Config::load(&path).unwrap_err();

        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    #[serial]
    fn test_workspace_file_wins_over_user_config() {
        let temp = TempDir::new().unwrap();
        let xdg = temp.path().join("xdg");
        fs::create_dir_all(xdg.join("mise-sync")).unwrap();
        fs::write(xdg.join("mise-sync/config.toml"), "mise_bin = \"global-mise\"").unwrap();
        fs::create_dir_all(temp.path().join("ws/.vscode")).unwrap();
        let workspace = Workspace::new(temp.path().join("ws")).unwrap();
        env::set_var("XDG_CONFIG_HOME", &xdg);
        env::remove_var(MISE_BIN_ENV);

        assert_eq!(Config::load_for(&workspace).unwrap().mise_bin, "global-mise");

        fs::write(
            workspace.path(WorkspacePath::Config),
            "mise_bin = \"local-mise\"",
        )
        .unwrap();
        assert_eq!(Config::load_for(&workspace).unwrap().mise_bin, "local-mise");

        env::remove_var("XDG_CONFIG_HOME");
    }

    #[test]
    #[serial]
    fn test_env_overrides_mise_bin() {
        let temp = TempDir::new().unwrap();
        let workspace = Workspace::new(temp.path()).unwrap();
        env::set_var("XDG_CONFIG_HOME", temp.path().join("xdg"));
        env::set_var(MISE_BIN_ENV, "/opt/mise/bin/mise");

        let config = Config::load_for(&workspace).unwrap();

        assert_eq!(config.mise_bin, "/opt/mise/bin/mise");
        env::remove_var(MISE_BIN_ENV);
        env::remove_var("XDG_CONFIG_HOME");
    }
}
