use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{InstallExit, VersionManager};
use crate::error::{Result, SyncError};
use crate::host::InstallLog;
use crate::toolset::Tool;

/// How long to keep reading output after the install process has exited.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// The `mise` command line, run from the workspace root.
#[derive(Debug, Clone)]
pub struct MiseCli {
    program: String,
    cwd: PathBuf,
}

impl MiseCli {
    pub fn new(program: impl Into<String>, cwd: impl AsRef<Path>) -> Self {
        Self {
            program: program.into(),
            cwd: cwd.as_ref().to_path_buf(),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args).current_dir(&self.cwd).stdin(Stdio::null());
        cmd
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.program, args.join(" "))
    }
}

#[async_trait]
impl VersionManager for MiseCli {
    async fn list_current(&self) -> Result<String> {
        let args = ["list", "--current", "--json"];
        let output = self
            .command(&args)
            .output()
            .await
            .map_err(|source| SyncError::Spawn {
                command: self.describe(&args),
                source,
            })?;

        if !output.status.success() {
            return Err(SyncError::CommandFailed {
                command: self.describe(&args),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn install(
        &self,
        tool: &Tool,
        log: Arc<dyn InstallLog>,
        cancel: CancellationToken,
    ) -> Result<InstallExit> {
        let spec = tool.spec();
        let args = ["install", spec.as_str(), "--yes"];
        debug!("Running {}", self.describe(&args));

        let mut child = self
            .command(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SyncError::Spawn {
                command: self.describe(&args),
                source,
            })?;

        let stdout = child.stdout.take().map(|out| pump(out, Arc::clone(&log)));
        let stderr = child.stderr.take().map(|err| pump(err, Arc::clone(&log)));

        let exit = tokio::select! {
            status = child.wait() => {
                let status = status?;
                if status.success() {
                    InstallExit::Success
                } else {
                    InstallExit::Failed(status.code())
                }
            }
            _ = cancel.cancelled() => {
                if let Err(err) = child.kill().await {
                    warn!("Failed to stop install of {spec}: {err}");
                }
                log.append(&format!("Install of {spec} cancelled"));
                InstallExit::Cancelled
            }
        };

        // Drain whatever the process wrote before exiting. Grandchildren may
        // keep the pipes open long after mise is gone, so the drain is bounded.
        for mut pump in [stdout, stderr].into_iter().flatten() {
            if exit == InstallExit::Cancelled {
                pump.abort();
            } else if tokio::time::timeout(DRAIN_TIMEOUT, &mut pump).await.is_err() {
                debug!("Output of {spec} still open after exit, detaching");
                pump.abort();
            }
        }

        Ok(exit)
    }
}

fn pump<R>(reader: R, log: Arc<dyn InstallLog>) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    log.append(line.trim_end_matches(['\n', '\r']));
                }
                Err(err) => {
                    debug!("Stopped reading install output: {err}");
                    break;
                }
            }
        }
    })
}
