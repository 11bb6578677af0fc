use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Editor directory inside the workspace
const EDITOR_DIR: &str = ".vscode";

/// Directory holding one stable symlink per managed tool
pub const INSTALLS_DIR: &str = ".vscode/vscode-mise-installs";

/// Workspace path types
#[derive(Debug, Clone, Copy)]
pub enum WorkspacePath {
    /// Workspace root (the folder open in the editor)
    Root,
    /// Stable link directory: workspace/.vscode/vscode-mise-installs
    Installs,
    /// Editor settings: workspace/.vscode/settings.json
    Settings,
    /// Workspace sync config: workspace/.vscode/mise-sync.toml
    Config,
}

/// Workspace - the project folder whose tools are being synchronized
///
/// The root is canonicalized once so that the ownership check against the
/// paths mise reports compares like with like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open the workspace at `root`, which must be an existing directory
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = fs::canonicalize(root)
            .with_context(|| format!("Workspace directory {:?} does not exist", root))?;

        if !root.is_dir() {
            anyhow::bail!("Workspace path {:?} is not a directory", root);
        }

        Ok(Self { root })
    }

    /// Open the workspace given on the command line, or the current directory
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::new(path),
            None => {
                let cwd = env::current_dir().context("Failed to determine current directory")?;
                Self::new(cwd)
            }
        }
    }

    /// Get path for a specific workspace location
    pub fn path(&self, path_type: WorkspacePath) -> PathBuf {
        match path_type {
            WorkspacePath::Root => self.root.clone(),
            WorkspacePath::Installs => self.root.join(INSTALLS_DIR),
            WorkspacePath::Settings => self.root.join(EDITOR_DIR).join("settings.json"),
            WorkspacePath::Config => self.root.join(EDITOR_DIR).join("mise-sync.toml"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a declaration at `path` belongs to this workspace.
    ///
    /// Compared by path component so `/ws2/mise.toml` is not inside `/ws`.
    pub fn owns(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    /// Absolute location of the stable link for a tool
    pub fn link_path(&self, tool_name: &str) -> PathBuf {
        self.path(WorkspacePath::Installs)
            .join(link_name(tool_name))
    }

    /// Workspace-relative location of the stable link, always `/`-separated
    pub fn link_relative(&self, tool_name: &str) -> String {
        format!("{}/{}", INSTALLS_DIR, link_name(tool_name))
    }
}

/// File name used for a tool's stable link.
///
/// Backend-qualified names (`npm:prettier`, `ubi:owner/repo`) must still map
/// to a single directory entry.
pub fn link_name(tool_name: &str) -> String {
    let mut result = String::with_capacity(tool_name.len());
    for ch in tool_name.chars() {
        match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => result.push(ch),
            _ => result.push('-'),
        }
    }

    if result.trim_matches(|c| c == '-' || c == '.').is_empty() {
        "default".to_string()
    } else {
        result
    }
}
