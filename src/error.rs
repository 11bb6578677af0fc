use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, SyncError>;

/// Failures of a single tool's sync pipeline.
///
/// Every variant is scoped to one tool; the orchestrator records it against
/// that tool and keeps the other pipelines running.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("installation of {tool} was declined")]
    InstallDeclined { tool: String },

    #[error("installation of {tool} failed: {reason}")]
    InstallFailed { tool: String, reason: String },

    #[error("failed to {action} {}: {source}", path.display())]
    LinkFilesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write setting `{key}`: {message}")]
    ConfigWrite { key: String, message: String },

    #[error("failed to read setting `{key}`: {message}")]
    ConfigRead { key: String, message: String },

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("sync of {tool} stopped unexpectedly: {message}")]
    Aborted { tool: String, message: String },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    pub(crate) fn link(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        SyncError::LinkFilesystem {
            action,
            path: path.into(),
            source,
        }
    }

    /// True for outcomes the user chose, as opposed to things that broke.
    pub fn is_declined(&self) -> bool {
        matches!(self, SyncError::InstallDeclined { .. })
    }
}
