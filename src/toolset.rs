use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::installers::VersionManager;
use crate::workspace::Workspace;

/// A tool pinned by the workspace, as reported by `mise list --current`.
///
/// Built fresh on every run and discarded once its pipeline settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    pub name: String,
    pub version: String,
    pub installed: bool,
    pub install_path: PathBuf,
    pub source_path: PathBuf,
}

impl Tool {
    /// `name@version`, the form mise accepts for install
    pub fn spec(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// One version record as emitted by mise. Every field is optional here so a
/// single bad record can be dropped without rejecting the whole listing.
#[derive(Debug, Deserialize)]
struct VersionRecord {
    version: Option<String>,
    #[serde(default)]
    installed: bool,
    install_path: Option<PathBuf>,
    source: Option<SourceRecord>,
}

#[derive(Debug, Deserialize)]
struct SourceRecord {
    path: Option<PathBuf>,
}

impl VersionRecord {
    fn into_tool(self, name: &str) -> Option<Tool> {
        let version = self.version.filter(|v| !v.trim().is_empty())?;
        let install_path = self.install_path.filter(|p| !p.as_os_str().is_empty())?;
        let source_path = self.source.and_then(|s| s.path)?;

        Some(Tool {
            name: name.to_string(),
            version,
            installed: self.installed,
            install_path,
            source_path,
        })
    }
}

/// Parse `mise list --current --json` output into workspace-owned tools.
///
/// Only the first (primary) version of each tool is kept. Malformed records
/// and tools declared outside the workspace are dropped.
pub fn parse_tools(json: &str, workspace: &Workspace) -> Vec<Tool> {
    let listing: BTreeMap<String, Value> = match serde_json::from_str(json) {
        Ok(listing) => listing,
        Err(err) => {
            warn!("Ignoring unreadable mise tool listing: {err}");
            return Vec::new();
        }
    };

    let mut tools = Vec::new();
    for (name, versions) in listing {
        if name.trim().is_empty() {
            continue;
        }

        let records: Vec<VersionRecord> = match serde_json::from_value(versions) {
            Ok(records) => records,
            Err(err) => {
                debug!("Dropping malformed mise entry for '{name}': {err}");
                continue;
            }
        };

        let Some(tool) = records.into_iter().next().and_then(|r| r.into_tool(&name)) else {
            debug!("Dropping incomplete mise entry for '{name}'");
            continue;
        };

        if !workspace.owns(&tool.source_path) {
            debug!(
                "Skipping {tool}: declared in {:?}, outside the workspace",
                tool.source_path
            );
            continue;
        }

        tools.push(tool);
    }

    tools
}

/// Resolve the tools pinned for the workspace.
///
/// Never fails: a broken or missing mise yields an empty set.
pub async fn resolve(manager: &dyn VersionManager, workspace: &Workspace) -> Vec<Tool> {
    let json = match manager.list_current().await {
        Ok(json) => json,
        Err(err) => {
            warn!("Could not list current tools: {err}");
            return Vec::new();
        }
    };

    let tools = parse_tools(&json, workspace);
    if tools.is_empty() {
        debug!("No tools declared in {:?}", workspace.root());
    }
    tools
}

/// Used by callers that want names without holding the full records.
pub fn tool_names(tools: &[Tool]) -> Vec<&str> {
    tools.iter().map(|tool| tool.name.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, Workspace) {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("ws")).unwrap();
        let workspace = Workspace::new(temp.path().join("ws")).unwrap();
        (temp, workspace)
    }

    fn record(version: &str, installed: bool, source: &Path) -> Value {
        serde_json::json!({
            "version": version,
            "installed": installed,
            "install_path": format!("/x/.local/share/mise/installs/tool/{version}"),
            "source": { "type": "mise.toml", "path": source },
            "requested_version": version,
        })
    }

    #[test]
    fn parses_workspace_tools() {
        let (_temp, workspace) = workspace();
        let source = workspace.root().join("mise.toml");
        let json = serde_json::json!({
            "deno": [record("2.0.0", true, &source)],
            "go": [record("1.23.1", false, &source)],
        });

        let tools = parse_tools(&json.to_string(), &workspace);

        assert_eq!(tool_names(&tools), vec!["deno", "go"]);
        assert_eq!(tools[0].version, "2.0.0");
        assert!(tools[0].installed);
        assert!(!tools[1].installed);
        assert_eq!(
            tools[0].install_path,
            PathBuf::from("/x/.local/share/mise/installs/tool/2.0.0")
        );
        assert_eq!(tools[0].source_path, source);
        assert_eq!(tools[0].spec(), "deno@2.0.0");
    }

    #[test]
    fn keeps_first_version_only() {
        let (_temp, workspace) = workspace();
        let source = workspace.root().join("mise.toml");
        let json = serde_json::json!({
            "node": [record("22.1.0", true, &source), record("20.0.0", true, &source)],
        });

        let tools = parse_tools(&json.to_string(), &workspace);

        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].version, "22.1.0");
    }

    #[test]
    fn drops_tools_declared_outside_workspace() {
        let (temp, workspace) = workspace();
        let global = temp.path().join("home/.config/mise/config.toml");
        let local = workspace.root().join(".mise.toml");
        let json = serde_json::json!({
            "deno": [record("2.0.0", true, &local)],
            "python": [record("3.12.0", true, &global)],
        });

        let tools = parse_tools(&json.to_string(), &workspace);

        assert_eq!(tool_names(&tools), vec!["deno"]);
    }

    #[test]
    fn drops_malformed_entries() {
        let (_temp, workspace) = workspace();
        let source = workspace.root().join("mise.toml");
        let json = serde_json::json!({
            "deno": [record("2.0.0", true, &source)],
            "empty": [],
            "not-a-list": { "version": "1.0.0" },
            "no-version": [{ "installed": true, "install_path": "/x", "source": { "path": source } }],
            "no-source": [{ "version": "1.0.0", "installed": true, "install_path": "/x" }],
            "bad-type": [{ "version": 12, "installed": true, "install_path": "/x", "source": { "path": source } }],
        });

        let tools = parse_tools(&json.to_string(), &workspace);

        assert_eq!(tool_names(&tools), vec!["deno"]);
    }

    #[test]
    fn unreadable_listing_is_empty() {
        let (_temp, workspace) = workspace();

        assert!(parse_tools("", &workspace).is_empty());
        assert!(parse_tools("[1, 2, 3]", &workspace).is_empty());
        assert!(parse_tools("mise ERROR something", &workspace).is_empty());
        assert!(parse_tools("{}", &workspace).is_empty());
    }

    #[test]
    fn missing_installed_flag_means_not_installed() {
        let (_temp, workspace) = workspace();
        let source = workspace.root().join("mise.toml");
        let json = serde_json::json!({
            "bun": [{ "version": "1.1.0", "install_path": "/x/bun/1.1.0", "source": { "path": source } }],
        });

        let tools = parse_tools(&json.to_string(), &workspace);

        assert_eq!(tools.len(), 1);
        assert!(!tools[0].installed);
    }
}
