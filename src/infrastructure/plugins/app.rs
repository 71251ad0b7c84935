use super::plugin_interface::{DeployContext, DeployPlugin, FileTask, PluginCapabilities, PluginError};
use super::{resolve_local_dir, settings_of};
use crate::domain::entities::Target;
use crate::domain::value_objects::PluginType;
use crate::infrastructure::process::{CommandExecutor, ExecutionConfig};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

/// Settings of an `app` target
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    /// Program to start
    #[validate(length(min = 1))]
    pub app: String,

    /// Arguments placed before the file list
    #[serde(default)]
    pub arguments: Vec<String>,

    /// Working directory, defaults to the workspace root
    #[serde(default)]
    pub cwd: Option<String>,

    /// Pass workspace-relative paths instead of absolute ones
    #[serde(default)]
    pub use_relative_paths: bool,
}

/// Hands the whole file list of a deployment to an external program
#[derive(Debug, Default)]
pub struct AppPlugin;

impl AppPlugin {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeployPlugin for AppPlugin {
    fn plugin_type(&self) -> PluginType {
        PluginType::new(PluginType::APP)
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities::deploy_only().with_batch()
    }

    async fn deploy_workspace(
        &self,
        tasks: Vec<FileTask>,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        let settings: AppSettings = settings_of(target)?;
        ctx.check_cancelled()?;

        let program = ctx.values.resolve(&settings.app);
        let mut args: Vec<String> = settings
            .arguments
            .iter()
            .map(|argument| ctx.values.resolve(argument))
            .collect();
        args.extend(tasks.iter().map(|task| {
            if settings.use_relative_paths {
                task.file.relative_path.clone()
            } else {
                task.file.local_path.display().to_string()
            }
        }));

        let cwd = settings
            .cwd
            .as_deref()
            .map(|cwd| resolve_local_dir(ctx, cwd))
            .unwrap_or_else(|| ctx.workspace_root.clone());
        let config = ExecutionConfig::new()
            .with_working_directory(cwd)
            .with_cancellation(ctx.cancellation.clone());

        info!("Starting '{}' with {} file(s)", program, tasks.len());
        let result = CommandExecutor::execute_checked(&program, &args, &config)
            .await
            .map(|_| ())
            .map_err(PluginError::from);

        match result {
            Ok(()) => tasks.into_iter().for_each(FileTask::succeed),
            Err(e) if e.is_cancelled() => tasks.into_iter().for_each(FileTask::cancel),
            Err(e) => {
                let message = e.to_string();
                tasks.into_iter().for_each(|task| task.fail(message.clone()));
            }
        }
        Ok(())
    }
}
