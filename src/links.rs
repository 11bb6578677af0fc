use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::toolset::Tool;
use crate::workspace::{link_name, Workspace, WorkspacePath};

/// What `stabilize` did to a tool's link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    AlreadyCorrect,
    Relinked,
}

/// Link state as observed without touching the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Missing,
    Correct,
    Stale(PathBuf),
    /// Something other than a symlink occupies the link path.
    Blocked,
}

/// Maintains `.vscode/vscode-mise-installs/<tool>` links.
///
/// Each link points at the tool's real, version-specific install directory,
/// giving editors one path that survives version changes.
#[derive(Debug, Clone)]
pub struct LinkStabilizer {
    installs_dir: PathBuf,
}

impl LinkStabilizer {
    pub fn new(workspace: &Workspace) -> Self {
        Self {
            installs_dir: workspace.path(WorkspacePath::Installs),
        }
    }

    pub fn link_path(&self, tool_name: &str) -> PathBuf {
        self.installs_dir.join(link_name(tool_name))
    }

    pub async fn stabilize(&self, tool: &Tool) -> Result<LinkOutcome> {
        fs::create_dir_all(&self.installs_dir)
            .await
            .map_err(|e| SyncError::link("create directory", &self.installs_dir, e))?;

        let link = self.link_path(&tool.name);
        match fs::read_link(&link).await {
            Ok(current) if current == tool.install_path => {
                debug!("{link:?} already points at {:?}", tool.install_path);
                Ok(LinkOutcome::AlreadyCorrect)
            }
            Ok(current) => {
                debug!(
                    "Replacing {link:?}: {current:?} -> {:?}",
                    tool.install_path
                );
                replace_link(&tool.install_path, &link).await?;
                Ok(LinkOutcome::Relinked)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                match create_dir_link(&tool.install_path, &link).await {
                    Ok(()) => Ok(LinkOutcome::Linked),
                    // Another run got there first.
                    Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                        match fs::read_link(&link).await {
                            Ok(current) if current == tool.install_path => {
                                Ok(LinkOutcome::AlreadyCorrect)
                            }
                            _ => Err(SyncError::link("create link", &link, err)),
                        }
                    }
                    Err(err) => Err(SyncError::link("create link", &link, err)),
                }
            }
            // A real file or directory: never delete what we didn't create.
            Err(err) => Err(SyncError::link("read link", &link, err)),
        }
    }

    pub async fn inspect(&self, tool: &Tool) -> LinkState {
        let link = self.link_path(&tool.name);
        match fs::read_link(&link).await {
            Ok(current) if current == tool.install_path => LinkState::Correct,
            Ok(current) => LinkState::Stale(current),
            Err(err) if err.kind() == io::ErrorKind::NotFound => LinkState::Missing,
            Err(_) => LinkState::Blocked,
        }
    }
}

#[cfg(unix)]
async fn create_dir_link(target: &Path, link: &Path) -> io::Result<()> {
    fs::symlink(target, link).await
}

#[cfg(windows)]
async fn create_dir_link(target: &Path, link: &Path) -> io::Result<()> {
    fs::symlink_dir(target, link).await
}

/// Swap an existing link for one pointing at `target`.
///
/// On Unix the new link is built beside the old one and renamed over it, so
/// the link path never disappears.
#[cfg(unix)]
async fn replace_link(target: &Path, link: &Path) -> Result<()> {
    let temp = temp_link_path(link);
    match fs::remove_file(&temp).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(SyncError::link("remove stale link", &temp, err)),
    }

    create_dir_link(target, &temp)
        .await
        .map_err(|e| SyncError::link("create link", &temp, e))?;

    if let Err(err) = fs::rename(&temp, link).await {
        let _ = fs::remove_file(&temp).await;
        return Err(SyncError::link("replace link", link, err));
    }
    Ok(())
}

#[cfg(windows)]
async fn replace_link(target: &Path, link: &Path) -> Result<()> {
    fs::remove_dir(link)
        .await
        .map_err(|e| SyncError::link("remove link", link, e))?;
    create_dir_link(target, link)
        .await
        .map_err(|e| SyncError::link("create link", link, e))
}

#[cfg(unix)]
fn temp_link_path(link: &Path) -> PathBuf {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

    let name = link
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    link.with_file_name(format!(".{name}.{}.{seq}.tmp", std::process::id()))
}
