use super::plugin_interface::{
    run_plugin, DeployContext, DeployPlugin, FileRef, FileTask, PluginCapabilities, PluginError,
};
use super::settings_of;
use crate::domain::entities::{normalize_name, Target};
use crate::domain::value_objects::{map_path, DeployDirection, FileStatus, PluginType};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use validator::Validate;

/// Maximum nesting of forwarding targets
pub const MAX_FORWARD_DEPTH: usize = 8;

/// Settings of a `batch` target
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BatchSettings {
    /// Names of the targets to forward to
    #[validate(length(min = 1))]
    pub targets: Vec<String>,
}

/// Forwards a deployment to other configured targets
#[derive(Debug, Default)]
pub struct BatchPlugin;

impl BatchPlugin {
    pub fn new() -> Self {
        Self
    }

    /// Statuses of one forwarded target, one per file
    async fn forward(files: &[FileRef], name: &str, ctx: &DeployContext) -> Vec<FileStatus> {
        let fail_all = |message: String| vec![FileStatus::Failed(message); files.len()];

        let wanted = normalize_name(name);
        let Some(target) = ctx.targets.iter().find(|t| t.normalized_name() == wanted) else {
            return fail_all(format!("unknown target '{}'", name));
        };
        let plugins = ctx.registry.resolve(target);
        if plugins.is_empty() {
            return fail_all(format!("no plugins for type '{}'", target.target_type));
        }

        let mut statuses: Vec<Option<FileStatus>> = vec![None; files.len()];
        let mut mapped = Vec::with_capacity(files.len());
        let mut positions = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            match map_path(&file.relative_path, &target.mappings) {
                Ok(target_path) => {
                    mapped.push(FileRef::new(&file.local_path, &file.relative_path, target_path));
                    positions.push(index);
                }
                Err(e) => statuses[index] = Some(FileStatus::Failed(e.to_string())),
            }
        }

        let nested = ctx.nested();
        for plugin in &plugins {
            debug!("Forwarding {} file(s) to '{}'", mapped.len(), target.name);
            let results = run_plugin(plugin, DeployDirection::Deploy, &mapped, target, &nested, |_, _| {}).await;
            for (position, status) in positions.iter().zip(results) {
                let slot = &mut statuses[*position];
                *slot = Some(match slot.take() {
                    Some(previous) => previous.worst(status),
                    None => status,
                });
            }
        }

        statuses
            .into_iter()
            .map(|status| status.unwrap_or(FileStatus::Succeeded))
            .collect()
    }
}

#[async_trait]
impl DeployPlugin for BatchPlugin {
    fn plugin_type(&self) -> PluginType {
        PluginType::new(PluginType::BATCH)
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
        let settings: BatchSettings = settings_of(target)?;
        if ctx.depth >= MAX_FORWARD_DEPTH {
            return Err(PluginError::Transfer(format!(
                "target '{}' forwards deeper than {} levels",
                target.name, MAX_FORWARD_DEPTH
            )));
        }

        let files: Vec<FileRef> = tasks.iter().map(|task| task.file.clone()).collect();
        let mut combined = vec![FileStatus::Succeeded; files.len()];
        for name in &settings.targets {
            if normalize_name(name) == target.normalized_name() {
                warn!("Target '{}' forwards to itself, skipping", target.name);
                continue;
            }
            let statuses = Self::forward(&files, name, ctx).await;
            combined = combined
                .into_iter()
                .zip(statuses)
                .map(|(current, status)| current.worst(status))
                .collect();
        }

        for (task, status) in tasks.into_iter().zip(combined) {
            task.complete(status);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::value_resolver::ValueResolver;
    use crate::application::session::DeploySession;
    use crate::domain::value_objects::MappingRule;
    use crate::infrastructure::plugins::PluginRegistry;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn context(root: &std::path::Path, targets: Vec<Target>) -> DeployContext {
        DeployContext::new(
            Arc::new(DeploySession::default()),
            CancellationToken::new(),
            ValueResolver::default(),
            root,
            Arc::new(PluginRegistry::with_builtin_plugins()),
            Arc::new(targets),
        )
    }

    #[tokio::test]
    async fn test_forwards_with_target_mappings() {
        let ws = TempDir::new().unwrap();
        std::fs::create_dir_all(ws.path().join("src")).unwrap();
        std::fs::write(ws.path().join("src/a.txt"), "a").unwrap();

        let out1 = ws.path().join("out1");
        let out2 = ws.path().join("out2");
        let targets = vec![
            Target::new("one", "local").with_setting("dir", out1.display().to_string()),
            Target::new("two", "local")
                .with_setting("dir", out2.display().to_string())
                .with_mapping(MappingRule::prefix("src/", "")),
            Target::new("both", "batch").with_setting("targets", serde_json::json!(["One", "two", "both"])),
        ];
        let ctx = context(ws.path(), targets.clone());
        let plugin: Arc<dyn DeployPlugin> = Arc::new(BatchPlugin::new());
        let files = vec![FileRef::new(ws.path().join("src/a.txt"), "src/a.txt", "src/a.txt")];

        let statuses = run_plugin(&plugin, DeployDirection::Deploy, &files, &targets[2], &ctx, |_, _| {}).await;
        assert_eq!(statuses, vec![FileStatus::Succeeded]);
        assert!(out1.join("src/a.txt").exists());
        assert!(out2.join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_unknown_forward_target_fails_files() {
        let ws = TempDir::new().unwrap();
        let target = Target::new("fan", "batch").with_setting("targets", serde_json::json!(["ghost"]));
        let ctx = context(ws.path(), vec![target.clone()]);
        let plugin: Arc<dyn DeployPlugin> = Arc::new(BatchPlugin::new());
        let files = vec![FileRef::new(ws.path().join("a.txt"), "a.txt", "a.txt")];

        let statuses = run_plugin(&plugin, DeployDirection::Deploy, &files, &target, &ctx, |_, _| {}).await;
        assert!(matches!(&statuses[0], FileStatus::Failed(m) if m.contains("ghost")));
    }

    #[tokio::test]
    async fn test_mutual_forwarding_stops_at_depth_limit() {
        let ws = TempDir::new().unwrap();
        let targets = vec![
            Target::new("ping", "batch").with_setting("targets", serde_json::json!(["pong"])),
            Target::new("pong", "batch").with_setting("targets", serde_json::json!(["ping"])),
        ];
        let ctx = context(ws.path(), targets.clone());
        let plugin: Arc<dyn DeployPlugin> = Arc::new(BatchPlugin::new());
        let files = vec![FileRef::new(ws.path().join("a.txt"), "a.txt", "a.txt")];

        let statuses = run_plugin(&plugin, DeployDirection::Deploy, &files, &targets[0], &ctx, |_, _| {}).await;
        assert!(matches!(&statuses[0], FileStatus::Failed(m) if m.contains("deeper")));
    }
}
