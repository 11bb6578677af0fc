//! Capability ports onto the editor host.
//!
//! The orchestrator never touches editor state directly; it is handed these
//! ports so a real workspace and an in-memory fake are interchangeable.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;
use crate::installers::VersionManager;

mod console;
mod settings;
mod vscode;

pub use console::{ConsoleNotifier, FileLog};
pub use settings::SettingsFile;
pub use vscode::VscodeExtensions;

/// Workspace-scoped key/value configuration store.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Current value for `key`, or `None` when unset.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Persist `value` at `key`. Completes once the write is durable.
    async fn update(&self, key: &str, value: Value) -> Result<()>;
}

/// Query and drive installed editor extensions.
#[async_trait]
pub trait ExtensionHost: Send + Sync {
    async fn is_installed(&self, extension_id: &str) -> bool;

    async fn execute_command(&self, command: &str) -> Result<()>;
}

/// Destination for streamed installer output.
pub trait InstallLog: Send + Sync {
    fn append(&self, line: &str);
}

/// User-facing prompts, notifications and the persistent log.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Ask for explicit consent. Anything but an affirmative answer is `false`.
    async fn confirm(&self, message: &str) -> bool;

    fn info(&self, message: &str);

    fn error(&self, message: &str);

    /// Append a diagnostic line to the persistent log.
    fn log(&self, line: &str);

    /// Open a dedicated sink for one install, titled after the tool.
    async fn install_log(&self, title: &str) -> Arc<dyn InstallLog>;
}

/// Everything the orchestrator needs from the outside world.
#[derive(Clone)]
pub struct Ports {
    pub manager: Arc<dyn VersionManager>,
    pub settings: Arc<dyn SettingsStore>,
    pub extensions: Arc<dyn ExtensionHost>,
    pub notifier: Arc<dyn Notifier>,
}
