use crate::config::Config;
use crate::extensions::ExtensionOutcome;
use crate::links::LinkOutcome;
use crate::orchestrator::{Orchestrator, RunSummary};
use crate::{ui, Workspace};
use anyhow::{bail, Result};

pub async fn execute(workspace: &Workspace, config: &Config, assume_yes: bool) -> Result<()> {
    let ports = super::ports(workspace, config, assume_yes)?;
    let orchestrator = Orchestrator::new(
        workspace.clone(),
        ports,
        config.bindings(),
        config.restart_delay(),
    );

    let progress = ui::Progress::new("Syncing", workspace.root().display().to_string());

    let cancel = orchestrator.cancellation_token();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let summary = orchestrator.run().await;
    interrupt.abort();
    orchestrator.settle().await;

    print_summary(&summary);

    let interrupted = cancel.is_cancelled();
    let failed = summary.failed();
    if interrupted {
        progress.cancel("interrupted");
    } else if failed > 0 {
        progress.fail("Failed", format!("{failed} of {} tools", summary.reports.len()));
    } else {
        progress.success("Synced", Some(describe_counts(&summary)));
    }

    exit_status(&summary, interrupted)
}

/// Declines are the user's choice; interruptions and failures are not.
fn exit_status(summary: &RunSummary, interrupted: bool) -> Result<()> {
    if interrupted {
        bail!("sync interrupted before all tools were ready");
    }
    let failed = summary.failed();
    if failed > 0 {
        bail!("{failed} tool(s) could not be synced");
    }
    Ok(())
}

pub(super) fn print_summary(summary: &RunSummary) {
    if summary.is_empty() {
        ui::info("No tools are declared by this workspace's mise config");
        return;
    }

    for report in &summary.reports {
        let spec = format!("{}@{}", report.name, report.version);
        match &report.result {
            Ok(outcome) => ui::success(
                "Ready",
                format!(
                    "{spec} ({}, {})",
                    describe_link(outcome.link),
                    describe_extension(outcome.extension)
                ),
            ),
            Err(err) if err.is_declined() => ui::warn(format!("{spec} skipped: {err}")),
            Err(err) => ui::error(format!("{spec}: {err}")),
        }
    }
}

fn describe_counts(summary: &RunSummary) -> String {
    let declined = summary.declined();
    if declined == 0 {
        format!("({} ready)", summary.succeeded())
    } else {
        format!("({} ready, {declined} declined)", summary.succeeded())
    }
}

fn describe_link(outcome: LinkOutcome) -> &'static str {
    match outcome {
        LinkOutcome::Linked => "linked",
        LinkOutcome::AlreadyCorrect => "link up to date",
        LinkOutcome::Relinked => "relinked",
    }
}

fn describe_extension(outcome: ExtensionOutcome) -> &'static str {
    match outcome {
        ExtensionOutcome::Updated => "extension configured",
        ExtensionOutcome::Unchanged => "extension up to date",
        ExtensionOutcome::Skipped => "no extension",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::orchestrator::{PipelineOutcome, ToolReport};

    fn report(name: &str, result: crate::Result<PipelineOutcome>) -> ToolReport {
        ToolReport {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            result,
        }
    }

    fn ready() -> crate::Result<PipelineOutcome> {
        Ok(PipelineOutcome {
            link: LinkOutcome::Linked,
            extension: ExtensionOutcome::Skipped,
        })
    }

    fn summary(reports: Vec<ToolReport>) -> RunSummary {
        RunSummary { reports }
    }

    #[test]
    fn test_exit_status_ok_with_declines() {
        let summary = summary(vec![
            report("deno", ready()),
            report(
                "go",
                Err(SyncError::InstallDeclined {
                    tool: "go@1.0.0".to_string(),
                }),
            ),
        ]);

        assert!(exit_status(&summary, false).is_ok());
        assert_eq!(describe_counts(&summary), "(1 ready, 1 declined)");
    }

    #[test]
    fn test_exit_status_fails_on_failures() {
        let summary = summary(vec![report(
            "go",
            Err(SyncError::InstallFailed {
                tool: "go@1.0.0".to_string(),
                reason: "exit code 1".to_string(),
            }),
        )]);

        let err = exit_status(&summary, false).unwrap_err();
        assert_eq!(err.to_string(), "1 tool(s) could not be synced");
    }

    #[test]
    fn test_exit_status_fails_when_interrupted() {
        let summary = summary(vec![report(
            "deno",
            Err(SyncError::InstallFailed {
                tool: "deno@1.0.0".to_string(),
                reason: "cancelled".to_string(),
            }),
        )]);

        let err = exit_status(&summary, true).unwrap_err();
        assert!(err.to_string().contains("interrupted"));
        assert!(exit_status(&RunSummary::default(), true).is_err());
    }
}
