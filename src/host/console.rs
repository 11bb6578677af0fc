use async_trait::async_trait;
use dialoguer::Confirm;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};

use super::{InstallLog, Notifier};
use crate::ui;
use crate::workspace::link_name;

/// Append-only text log on disk.
///
/// Write failures are reported through tracing and otherwise ignored; losing
/// a log line never fails a sync.
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileLog {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = match open_append(&path) {
            Ok(file) => Some(file),
            Err(err) => {
                warn!("Failed to open log {:?}: {err}", path);
                None
            }
        };
        Self {
            path,
            file: Mutex::new(file),
        }
    }

    /// Like [`FileLog::open`], without blocking the calling task on the
    /// directory creation and open.
    pub async fn open_in_background(path: PathBuf) -> Self {
        let fallback = path.clone();
        spawn_blocking(move || Self::open(path))
            .await
            .unwrap_or_else(|err| {
                warn!("Failed to open log {:?}: {err}", fallback);
                Self {
                    path: fallback,
                    file: Mutex::new(None),
                }
            })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, line: &str) {
        let Ok(mut guard) = self.file.lock() else {
            return;
        };
        if let Some(file) = guard.as_mut() {
            if let Err(err) = writeln!(file, "{line}") {
                debug!("Failed to write to {:?}: {err}", self.path);
            }
        }
    }
}

impl InstallLog for FileLog {
    fn append(&self, line: &str) {
        self.write_line(line);
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install output sink that echoes to the terminal and keeps a file copy.
struct InstallOutput {
    title: String,
    tool: String,
    file: FileLog,
}

impl InstallLog for InstallOutput {
    fn append(&self, line: &str) {
        ui::install_output(&self.tool, line);
        self.file.append(line);
        debug!(target: "mise_sync::install", "[{}] {line}", self.title);
    }
}

/// Terminal implementation of the notification surface.
pub struct ConsoleNotifier {
    assume_yes: bool,
    interactive: bool,
    prompt_lock: tokio::sync::Mutex<()>,
    log: FileLog,
    logs_dir: PathBuf,
}

impl ConsoleNotifier {
    /// `state_dir` receives `mise-sync.log` and the per-install `logs/`.
    pub fn new(state_dir: &Path, assume_yes: bool) -> Self {
        Self {
            assume_yes,
            interactive: ui::stdin_is_terminal(),
            prompt_lock: tokio::sync::Mutex::new(()),
            log: FileLog::open(state_dir.join("mise-sync.log")),
            logs_dir: state_dir.join("logs"),
        }
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn confirm(&self, message: &str) -> bool {
        if self.assume_yes {
            debug!("Assuming yes: {message}");
            return true;
        }
        if !self.interactive {
            ui::warn(format!("{message} (no terminal; pass --yes to consent)"));
            return false;
        }

        // One prompt on screen at a time.
        let _guard = self.prompt_lock.lock().await;
        let prompt = message.to_string();
        spawn_blocking(move || {
            Confirm::new()
                .with_prompt(prompt)
                .default(false)
                .interact()
                .unwrap_or(false)
        })
        .await
        .unwrap_or(false)
    }

    fn info(&self, message: &str) {
        ui::info(message);
        self.log(message);
    }

    fn error(&self, message: &str) {
        ui::error(message);
        self.log(message);
    }

    fn log(&self, line: &str) {
        info!("{line}");
        self.log.write_line(line);
    }

    async fn install_log(&self, title: &str) -> Arc<dyn InstallLog> {
        let spec = title.rsplit(' ').next().unwrap_or(title);
        let path = self.logs_dir.join(format!("install-{}.log", link_name(spec)));
        ui::status("Installing", spec);
        Arc::new(InstallOutput {
            title: title.to_string(),
            tool: spec.rsplit_once('@').map_or(spec, |(name, _)| name).to_string(),
            file: FileLog::open_in_background(path).await,
        })
    }
}
