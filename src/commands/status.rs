use crate::config::Config;
use crate::extensions::{normalize, ExtensionBinding};
use crate::host::{ExtensionHost, SettingsFile, SettingsStore, VscodeExtensions};
use crate::installers::MiseCli;
use crate::links::{LinkStabilizer, LinkState};
use crate::toolset::{self, Tool};
use crate::{ui, Workspace, WorkspacePath};
use anyhow::Result;

pub async fn execute(workspace: &Workspace, config: &Config) -> Result<()> {
    let manager = MiseCli::new(&config.mise_bin, workspace.root());
    let tools = toolset::resolve(&manager, workspace).await;

    if tools.is_empty() {
        ui::info(format!(
            "No tools are declared by mise config in {}",
            workspace.root().display()
        ));
        return Ok(());
    }

    let links = LinkStabilizer::new(workspace);
    let bindings = config.bindings();
    let extensions = VscodeExtensions::new(super::extension_dirs(config)?);
    let settings = SettingsFile::new(workspace.path(WorkspacePath::Settings));

    for tool in &tools {
        let install = if tool.installed {
            "installed"
        } else {
            "not installed"
        };
        let link_state = links.inspect(tool).await;
        let link_ready = link_state == LinkState::Correct;
        let (extension, extension_ready) = match bindings.get(&tool.name) {
            None => ("no extension binding".to_string(), true),
            Some(binding) => {
                describe_binding(workspace, tool, binding, &extensions, &settings).await
            }
        };

        ui::tool_state(
            &tool.name,
            tool.installed && link_ready && extension_ready,
            &[
                format!("{} {install}", tool.version),
                describe_link(link_state),
                extension,
            ],
        );
    }

    Ok(())
}

fn describe_link(state: LinkState) -> String {
    match state {
        LinkState::Missing => "link missing".to_string(),
        LinkState::Correct => "link up to date".to_string(),
        LinkState::Stale(target) => format!("link stale (points at {})", target.display()),
        LinkState::Blocked => "link path occupied by a real file or directory".to_string(),
    }
}

async fn describe_binding(
    workspace: &Workspace,
    tool: &Tool,
    binding: &ExtensionBinding,
    extensions: &VscodeExtensions,
    settings: &SettingsFile,
) -> (String, bool) {
    // Without the extension there is nothing to configure.
    if !extensions.is_installed(&binding.extension).await {
        return (format!("{} not installed", binding.extension), true);
    }

    let desired = binding.desired_value(workspace, &tool.name);
    match settings.get(&binding.setting).await {
        Ok(Some(current)) if normalize(&current) == normalize(&desired) => {
            (format!("{} configured", binding.setting), true)
        }
        Ok(Some(current)) => (
            format!("{} is {current}, expected {desired}", binding.setting),
            false,
        ),
        Ok(None) => (format!("{} not set", binding.setting), false),
        Err(err) => (format!("{} unreadable: {err}", binding.setting), false),
    }
}
