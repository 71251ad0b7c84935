use super::plugin_interface::{
    deploy_sequentially, DeployContext, DeployPlugin, FileRef, FileTask, PluginCapabilities,
    PluginError, RemoteFileInfo,
};
use super::{join_target_path, resolve_local_dir, settings_of, system_time_to_utc};
use crate::domain::entities::Target;
use crate::domain::value_objects::PluginType;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};
use validator::Validate;

/// Settings of a `local` target
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LocalSettings {
    /// Destination directory, relative paths start at the workspace root
    #[validate(length(min = 1))]
    pub dir: String,

    /// Remove the contents of `dir` before the first file of a deployment
    #[serde(default)]
    pub empty: bool,
}

/// Copies files into a directory on this machine
#[derive(Debug, Default)]
pub struct LocalPlugin;

impl LocalPlugin {
    pub fn new() -> Self {
        Self
    }

    async fn prepare_dir(dir: &Path, empty: bool) -> Result<(), PluginError> {
        match fs::metadata(dir).await {
            Ok(meta) if !meta.is_dir() => {
                return Err(PluginError::Io {
                    path: dir.display().to_string(),
                    message: "not a directory".to_string(),
                })
            }
            Ok(_) if empty => {
                info!("Emptying {}", dir.display());
                fs::remove_dir_all(dir)
                    .await
                    .map_err(|e| PluginError::io(dir, e))?;
            }
            _ => {}
        }

        fs::create_dir_all(dir)
            .await
            .map_err(|e| PluginError::io(dir, e))
    }
}

#[async_trait]
impl DeployPlugin for LocalPlugin {
    fn plugin_type(&self) -> PluginType {
        PluginType::new(PluginType::LOCAL)
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities::full()
    }

    async fn deploy_workspace(
        &self,
        tasks: Vec<FileTask>,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        let settings: LocalSettings = settings_of(target)?;
        let dir = resolve_local_dir(ctx, &settings.dir);
        ctx.check_cancelled()?;
        Self::prepare_dir(&dir, settings.empty).await?;

        deploy_sequentially(self, tasks, target, ctx).await;
        Ok(())
    }

    async fn deploy_file(
        &self,
        file: &FileRef,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        let settings: LocalSettings = settings_of(target)?;
        let dest = join_target_path(&resolve_local_dir(ctx, &settings.dir), &file.target_path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PluginError::io(parent, e))?;
        }

        debug!("Copying {} -> {}", file.local_path.display(), dest.display());
        fs::copy(&file.local_path, &dest)
            .await
            .map_err(|e| PluginError::io(&dest, e))?;
        Ok(())
    }

    async fn pull_file(
        &self,
        file: &FileRef,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        let settings: LocalSettings = settings_of(target)?;
        let source = join_target_path(&resolve_local_dir(ctx, &settings.dir), &file.target_path);
        if let Some(parent) = file.local_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PluginError::io(parent, e))?;
        }

        debug!("Copying {} -> {}", source.display(), file.local_path.display());
        fs::copy(&source, &file.local_path)
            .await
            .map_err(|e| PluginError::io(&source, e))?;
        Ok(())
    }

    async fn get_file_info(
        &self,
        file: &FileRef,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<RemoteFileInfo, PluginError> {
        let settings: LocalSettings = settings_of(target)?;
        let path = join_target_path(&resolve_local_dir(ctx, &settings.dir), &file.target_path);
        let display = path.display().to_string();

        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(RemoteFileInfo::found(
                display,
                meta.modified().ok().map(system_time_to_utc),
                Some(meta.len()),
            )),
            Ok(_) => Ok(RemoteFileInfo::missing(display)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RemoteFileInfo::missing(display)),
            Err(e) => Err(PluginError::io(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::value_resolver::ValueResolver;
    use crate::application::session::DeploySession;
    use crate::domain::value_objects::{DeployDirection, FileStatus};
    use crate::infrastructure::plugins::{run_plugin, PluginRegistry};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn context(root: &Path) -> DeployContext {
        DeployContext::new(
            Arc::new(DeploySession::default()),
            CancellationToken::new(),
            ValueResolver::new(Vec::new()),
            root,
            Arc::new(PluginRegistry::new()),
            Arc::new(Vec::new()),
        )
    }

    #[tokio::test]
    async fn test_deploy_pull_and_info() {
        let ws = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        std::fs::create_dir_all(ws.path().join("src")).unwrap();
        std::fs::write(ws.path().join("src/a.txt"), "hello").unwrap();

        let plugin: Arc<dyn DeployPlugin> = Arc::new(LocalPlugin::new());
        let target = Target::new("t1", "local").with_setting("dir", out.path().display().to_string());
        let file = FileRef::new(ws.path().join("src/a.txt"), "src/a.txt", "a.txt");
        let ctx = context(ws.path());

        let statuses = run_plugin(&plugin, DeployDirection::Deploy, &[file.clone()], &target, &ctx, |_, _| {}).await;
        assert_eq!(statuses, vec![FileStatus::Succeeded]);
        assert_eq!(std::fs::read_to_string(out.path().join("a.txt")).unwrap(), "hello");

        let info = plugin.get_file_info(&file, &target, &ctx).await.unwrap();
        assert!(info.exists);
        assert_eq!(info.size, Some(5));

        std::fs::write(out.path().join("a.txt"), "remote").unwrap();
        let statuses = run_plugin(&plugin, DeployDirection::Pull, &[file], &target, &ctx, |_, _| {}).await;
        assert_eq!(statuses, vec![FileStatus::Succeeded]);
        assert_eq!(std::fs::read_to_string(ws.path().join("src/a.txt")).unwrap(), "remote");
    }

    #[tokio::test]
    async fn test_empty_clears_destination_once() {
        let ws = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        std::fs::write(out.path().join("stale.txt"), "old").unwrap();
        std::fs::write(ws.path().join("a.txt"), "a").unwrap();
        std::fs::write(ws.path().join("b.txt"), "b").unwrap();

        let plugin: Arc<dyn DeployPlugin> = Arc::new(LocalPlugin::new());
        let target = Target::new("t1", "local")
            .with_setting("dir", out.path().display().to_string())
            .with_setting("empty", true);
        let files = vec![
            FileRef::new(ws.path().join("a.txt"), "a.txt", "a.txt"),
            FileRef::new(ws.path().join("b.txt"), "b.txt", "b.txt"),
        ];

        let statuses = run_plugin(&plugin, DeployDirection::Deploy, &files, &target, &context(ws.path()), |_, _| {}).await;
        assert!(statuses.iter().all(FileStatus::is_success));
        assert!(!out.path().join("stale.txt").exists());
        assert!(out.path().join("a.txt").exists());
        assert!(out.path().join("b.txt").exists());
    }

    #[tokio::test]
    async fn test_destination_file_fails_every_file() {
        let ws = TempDir::new().unwrap();
        let blocker = ws.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        std::fs::write(ws.path().join("a.txt"), "a").unwrap();

        let plugin: Arc<dyn DeployPlugin> = Arc::new(LocalPlugin::new());
        let target = Target::new("t1", "local").with_setting("dir", "blocker");
        let files = vec![FileRef::new(ws.path().join("a.txt"), "a.txt", "a.txt")];

        let statuses = run_plugin(&plugin, DeployDirection::Deploy, &files, &target, &context(ws.path()), |_, _| {}).await;
        assert!(matches!(&statuses[0], FileStatus::Failed(m) if m.contains("not a directory")));
    }

    #[tokio::test]
    async fn test_missing_dir_setting_is_invalid() {
        let ws = TempDir::new().unwrap();
        let plugin = LocalPlugin::new();
        let target = Target::new("t1", "local");
        let file = FileRef::new(ws.path().join("a.txt"), "a.txt", "a.txt");
        let result = plugin.deploy_file(&file, &target, &context(ws.path())).await;
        assert!(matches!(result, Err(PluginError::InvalidSettings { .. })));
    }

    #[tokio::test]
    async fn test_info_for_missing_file() {
        let ws = TempDir::new().unwrap();
        let plugin = LocalPlugin::new();
        let target = Target::new("t1", "local").with_setting("dir", "out");
        let file = FileRef::new(ws.path().join("a.txt"), "a.txt", "a.txt");
        let info = plugin.get_file_info(&file, &target, &context(ws.path())).await.unwrap();
        assert!(!info.exists);
    }
}
