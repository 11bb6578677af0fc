//! In-memory ports for unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SyncError};
use crate::host::{ExtensionHost, InstallLog, Notifier, SettingsStore};
use crate::installers::{InstallExit, VersionManager};
use crate::toolset::Tool;

pub fn tool(name: &str, version: &str, installed: bool) -> Tool {
    Tool {
        name: name.to_string(),
        version: version.to_string(),
        installed,
        install_path: PathBuf::from(format!("/x/.local/share/mise/installs/{name}/{version}")),
        source_path: PathBuf::from("/ws/mise.toml"),
    }
}

/// JSON listing in the shape of `mise list --current --json`.
pub fn listing(entries: &[(&str, &str, bool, &Path)], source: &Path) -> String {
    let mut map = serde_json::Map::new();
    for (name, version, installed, install_path) in entries {
        map.insert(
            name.to_string(),
            serde_json::json!([{
                "version": version,
                "requested_version": version,
                "installed": installed,
                "install_path": install_path,
                "source": { "type": "mise.toml", "path": source },
            }]),
        );
    }
    Value::Object(map).to_string()
}

#[derive(Default)]
pub struct FakeSettings {
    values: Mutex<HashMap<String, Value>>,
    writes: Mutex<Vec<(String, Value)>>,
    reject: AtomicBool,
}

impl FakeSettings {
    pub fn set(&self, key: &str, value: Value) {
        self.values.lock().unwrap().insert(key.to_string(), value);
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.values.lock().unwrap().get(key).cloned()
    }

    pub fn writes(&self) -> Vec<(String, Value)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn reject_writes(&self) {
        self.reject.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SettingsStore for FakeSettings {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.value(key))
    }

    async fn update(&self, key: &str, value: Value) -> Result<()> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(SyncError::ConfigWrite {
                key: key.to_string(),
                message: "read-only settings".to_string(),
            });
        }
        self.writes
            .lock()
            .unwrap()
            .push((key.to_string(), value.clone()));
        self.set(key, value);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeExtensions {
    installed: HashSet<String>,
    commands: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl FakeExtensions {
    pub fn with(ids: &[&str]) -> Self {
        Self {
            installed: ids.iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn fail_commands(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExtensionHost for FakeExtensions {
    async fn is_installed(&self, extension_id: &str) -> bool {
        self.installed.contains(extension_id)
    }

    async fn execute_command(&self, command: &str) -> Result<()> {
        self.commands.lock().unwrap().push(command.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(SyncError::CommandFailed {
                command: command.to_string(),
                status: "unknown command".to_string(),
                stderr: String::new(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingLog(Mutex<Vec<String>>);

impl RecordingLog {
    pub fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl InstallLog for RecordingLog {
    fn append(&self, line: &str) {
        self.0.lock().unwrap().push(line.to_string());
    }
}

/// Notifier that answers every prompt the same way and records output.
pub struct RecordingNotifier {
    answer: bool,
    pub prompts: Mutex<Vec<String>>,
    pub infos: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
    pub lines: Mutex<Vec<String>>,
    pub install_logs: Mutex<Vec<(String, Arc<RecordingLog>)>>,
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::answering(true)
    }
}

impl RecordingNotifier {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            prompts: Mutex::default(),
            infos: Mutex::default(),
            errors: Mutex::default(),
            lines: Mutex::default(),
            install_logs: Mutex::default(),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn confirm(&self, message: &str) -> bool {
        self.prompts.lock().unwrap().push(message.to_string());
        tokio::task::yield_now().await;
        self.answer
    }

    fn info(&self, message: &str) {
        self.infos.lock().unwrap().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn log(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }

    async fn install_log(&self, title: &str) -> Arc<dyn InstallLog> {
        let log = Arc::new(RecordingLog::default());
        self.install_logs
            .lock()
            .unwrap()
            .push((title.to_string(), Arc::clone(&log)));
        log
    }
}

/// Version manager serving a fixed listing and scripted install results.
pub struct FakeManager {
    listing: Option<String>,
    exit_codes: HashMap<String, i32>,
    install_delay: Duration,
    installs: Mutex<Vec<String>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl FakeManager {
    pub fn new(listing: impl Into<String>) -> Self {
        Self {
            listing: Some(listing.into()),
            exit_codes: HashMap::new(),
            install_delay: Duration::ZERO,
            installs: Mutex::default(),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }

    /// A manager whose `list` invocation fails.
    pub fn broken() -> Self {
        let mut manager = Self::new("");
        manager.listing = None;
        manager
    }

    pub fn exit_code(mut self, tool: &str, code: i32) -> Self {
        self.exit_codes.insert(tool.to_string(), code);
        self
    }

    pub fn install_delay(mut self, delay: Duration) -> Self {
        self.install_delay = delay;
        self
    }

    pub fn installs(&self) -> Vec<String> {
        self.installs.lock().unwrap().clone()
    }

    /// Highest number of installs observed running at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VersionManager for FakeManager {
    async fn list_current(&self) -> Result<String> {
        self.listing.clone().ok_or_else(|| SyncError::CommandFailed {
            command: "mise list --current --json".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "mise ERROR".to_string(),
        })
    }

    async fn install(
        &self,
        tool: &Tool,
        log: Arc<dyn InstallLog>,
        cancel: CancellationToken,
    ) -> Result<InstallExit> {
        self.installs.lock().unwrap().push(tool.spec());
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        log.append(&format!("installing {}", tool.spec()));

        let exit = tokio::select! {
            _ = tokio::time::sleep(self.install_delay) => {
                match self.exit_codes.get(&tool.name) {
                    None | Some(0) => InstallExit::Success,
                    Some(code) => InstallExit::Failed(Some(*code)),
                }
            }
            _ = cancel.cancelled() => InstallExit::Cancelled,
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(exit)
    }
}
