use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::ExtensionHost;
use crate::error::Result;
use crate::ui;

/// Extension presence as seen in VS Code's on-disk extension directories.
///
/// An extension `publisher.name` is installed when one of the directories
/// holds `publisher.name-<version>`. Commands cannot be sent to a running
/// editor from here, so `execute_command` tells the user what to run.
#[derive(Debug, Clone)]
pub struct VscodeExtensions {
    dirs: Vec<PathBuf>,
}

impl VscodeExtensions {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Stable, insiders and remote-server extension directories under `home`.
    pub fn default_dirs(home: &Path) -> Vec<PathBuf> {
        [
            ".vscode/extensions",
            ".vscode-server/extensions",
            ".vscode-insiders/extensions",
        ]
        .iter()
        .map(|dir| home.join(dir))
        .collect()
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }
}

#[async_trait]
impl ExtensionHost for VscodeExtensions {
    async fn is_installed(&self, extension_id: &str) -> bool {
        for dir in &self.dirs {
            let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let name = entry.file_name();
                if matches_extension(&name.to_string_lossy(), extension_id) {
                    debug!("Found {extension_id} at {:?}", entry.path());
                    return true;
                }
            }
        }
        false
    }

    async fn execute_command(&self, command: &str) -> Result<()> {
        ui::info(format!(
            "Run \"{command}\" from the VS Code command palette to pick up the change"
        ));
        Ok(())
    }
}

/// `publisher.name-1.2.3` (optionally with a platform suffix) for `publisher.name`.
fn matches_extension(dir_name: &str, extension_id: &str) -> bool {
    let dir_name = dir_name.to_ascii_lowercase();
    let id = extension_id.to_ascii_lowercase();
    dir_name
        .strip_prefix(&id)
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|version| version.chars().next())
        .is_some_and(|c| c.is_ascii_digit())
}
