use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

const APP_DIR: &str = "mise-sync";

fn xdg_base(var: &str, fallback: &str) -> Result<PathBuf> {
    match env::var_os(var).filter(|value| !value.is_empty()) {
        Some(base) => Ok(PathBuf::from(base)),
        None => Ok(home_dir()?.join(fallback)),
    }
}

/// Get the XDG config directory for mise-sync
///
/// Returns `$XDG_CONFIG_HOME/mise-sync` or `~/.config/mise-sync` if not set
pub fn config_dir() -> Result<PathBuf> {
    Ok(xdg_base("XDG_CONFIG_HOME", ".config")?.join(APP_DIR))
}

/// Get the XDG state directory for mise-sync
///
/// Returns `$XDG_STATE_HOME/mise-sync` or `~/.local/state/mise-sync` if not set.
/// Run and install logs live here.
pub fn state_dir() -> Result<PathBuf> {
    Ok(xdg_base("XDG_STATE_HOME", ".local/state")?.join(APP_DIR))
}

/// Get the home directory
pub fn home_dir() -> Result<PathBuf> {
    directories::BaseDirs::new()
        .context("Failed to get home directory")
        .map(|bd| bd.home_dir().to_path_buf())
}
