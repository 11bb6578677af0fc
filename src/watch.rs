use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind, Debouncer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Workspace-relative locations mise reads configuration from.
///
/// `*` never crosses a path separator.
pub const MISE_PATTERNS: [&str; 19] = [
    ".config/mise/config.toml",
    "mise/config.toml",
    "mise.toml",
    ".mise/config.toml",
    ".mise.toml",
    ".config/mise/config.local.toml",
    "mise/config.local.toml",
    "mise.local.toml",
    ".mise/config.local.toml",
    ".mise.local.toml",
    ".config/mise/config.*.toml",
    "mise/config.*.toml",
    "mise.*.toml",
    ".mise/config.*.toml",
    ".mise.*.toml",
    ".config/mise/config.*.local.toml",
    "mise/config.*.local.toml",
    ".mise/config.*.local.toml",
    ".mise.*.local.toml",
];

/// Directories holding config files, relative to the workspace root.
const CONFIG_DIRS: [&str; 4] = ["", ".config/mise", "mise", ".mise"];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Whether `path` is one of the mise configuration files of `root`.
pub fn is_config_path(root: &Path, path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    MISE_PATTERNS
        .iter()
        .filter_map(|pattern| Pattern::new(pattern).ok())
        .any(|pattern| pattern.matches_path_with(relative, MATCH_OPTIONS))
}

/// Debounced watch over a workspace's mise configuration files.
///
/// Config directories that appear after startup are picked up as soon as the
/// root (or `.config`) reports their creation.
pub struct ConfigWatcher {
    root: PathBuf,
    debouncer: Debouncer<RecommendedWatcher>,
    events: mpsc::UnboundedReceiver<Vec<PathBuf>>,
    watched: Vec<PathBuf>,
}

impl ConfigWatcher {
    /// Watch `root` and whichever of its config directories exist.
    pub fn start(root: &Path, debounce: Duration) -> Result<Self> {
        let (tx, events) = mpsc::unbounded_channel();

        let debouncer = new_debouncer(debounce, move |result: DebounceEventResult| {
            let events = match result {
                Ok(events) => events,
                Err(err) => {
                    warn!("File watch error: {err}");
                    return;
                }
            };

            let paths: Vec<PathBuf> = events
                .into_iter()
                .filter(|event| event.kind == DebouncedEventKind::Any)
                .map(|event| event.path)
                .collect();
            if !paths.is_empty() {
                let _ = tx.send(paths);
            }
        })
        .context("Failed to create file watcher")?;

        let mut watcher = Self {
            root: root.to_path_buf(),
            debouncer,
            events,
            watched: Vec::new(),
        };
        watcher
            .debouncer
            .watcher()
            .watch(root, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {:?}", root))?;
        debug!("Watching {:?}", root);
        watcher.watched.push(root.to_path_buf());
        watcher.refresh();

        Ok(watcher)
    }

    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Next batch of changed config files. `None` once the watcher is gone.
    pub async fn changed(&mut self) -> Option<Vec<PathBuf>> {
        loop {
            let paths = self.events.recv().await?;

            let mut changed = self.refresh();
            changed.extend(
                paths
                    .into_iter()
                    .filter(|path| is_config_path(&self.root, path)),
            );
            changed.sort();
            changed.dedup();

            if !changed.is_empty() {
                return Some(changed);
            }
        }
    }

    /// Start watching config directories (and their parents below the root)
    /// that now exist, and forget those that were removed.
    ///
    /// Returns config files already present in newly watched directories,
    /// since they may have been written before the watch was in place.
    fn refresh(&mut self) -> Vec<PathBuf> {
        let root = self.root.clone();
        let watcher = self.debouncer.watcher();

        self.watched.retain(|path| {
            if *path == root || path.is_dir() {
                return true;
            }
            debug!("No longer watching {:?}", path);
            let _ = watcher.unwatch(path);
            false
        });

        let mut found = Vec::new();
        for dir in CONFIG_DIRS.iter().filter(|dir| !dir.is_empty()) {
            let mut path = root.clone();
            for component in Path::new(dir).components() {
                path.push(component);
                if !path.is_dir() {
                    break;
                }
                if self.watched.contains(&path) {
                    continue;
                }
                if let Err(err) = watcher.watch(&path, RecursiveMode::NonRecursive) {
                    warn!("Failed to watch {:?}: {err}", path);
                    break;
                }
                debug!("Watching {:?}", path);
                self.watched.push(path.clone());
                found.extend(config_files_in(&root, &path));
            }
        }
        found
    }
}

fn config_files_in(root: &Path, dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| is_config_path(root, path))
        .collect()
}
