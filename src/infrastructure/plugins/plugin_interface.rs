use super::plugin_registry::PluginRegistry;
use crate::application::services::value_resolver::ValueResolver;
use crate::application::session::DeploySession;
use crate::domain::entities::{Target, Value};
use crate::domain::value_objects::{DeployDirection, FileStatus, PluginType};
use crate::infrastructure::process::CommandExecutorError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Transport errors reported by plugins
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Invalid settings for target '{target}': {message}")]
    InvalidSettings { target: String, message: String },

    #[error("I/O error on '{path}': {message}")]
    Io { path: String, message: String },

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("'{operation}' is not supported by the '{plugin}' plugin")]
    Unsupported { plugin: String, operation: String },

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Command failed: {0}")]
    Command(#[from] CommandExecutorError),
}

impl PluginError {
    pub fn invalid_settings(target: &Target, message: impl ToString) -> Self {
        Self::InvalidSettings {
            target: target.name.clone(),
            message: message.to_string(),
        }
    }

    pub fn io(path: &Path, error: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: error.to_string(),
        }
    }

    pub fn unsupported(plugin: &PluginType, operation: &str) -> Self {
        Self::Unsupported {
            plugin: plugin.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Command(CommandExecutorError::Cancelled)
        )
    }
}

/// Optional capabilities of a plugin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PluginCapabilities {
    pub can_pull: bool,
    pub can_get_file_info: bool,
    /// Handles the whole file list in one go (one connection, one archive, one process)
    pub batch: bool,
}

impl PluginCapabilities {
    pub fn deploy_only() -> Self {
        Self::default()
    }

    pub fn full() -> Self {
        Self {
            can_pull: true,
            can_get_file_info: true,
            batch: false,
        }
    }

    pub fn with_batch(mut self) -> Self {
        self.batch = true;
        self
    }

    /// Capabilities of several plugins serving one target
    pub fn union(self, other: Self) -> Self {
        Self {
            can_pull: self.can_pull || other.can_pull,
            can_get_file_info: self.can_get_file_info || other.can_get_file_info,
            batch: self.batch || other.batch,
        }
    }

    /// Short names of the set flags, for listings
    pub fn labels(&self) -> Vec<&'static str> {
        [
            (self.can_pull, "pull"),
            (self.can_get_file_info, "info"),
            (self.batch, "batch"),
        ]
        .into_iter()
        .filter_map(|(set, label)| set.then_some(label))
        .collect()
    }

    pub fn supports(&self, direction: DeployDirection) -> bool {
        match direction {
            DeployDirection::Deploy => true,
            DeployDirection::Pull => self.can_pull,
        }
    }
}

/// One file as seen by a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    /// Absolute local path
    pub local_path: PathBuf,
    /// `/`-separated path relative to the workspace root
    pub relative_path: String,
    /// Path on the target after mapping rules
    pub target_path: String,
}

impl FileRef {
    pub fn new(
        local_path: impl Into<PathBuf>,
        relative_path: impl Into<String>,
        target_path: impl Into<String>,
    ) -> Self {
        Self {
            local_path: local_path.into(),
            relative_path: relative_path.into(),
            target_path: target_path.into(),
        }
    }

    /// Directory part of the target path (empty at the root)
    pub fn target_dir(&self) -> &str {
        self.target_path
            .rsplit_once('/')
            .map(|(dir, _)| dir)
            .unwrap_or("")
    }

    /// File name part of the target path
    pub fn target_name(&self) -> &str {
        self.target_path
            .rsplit_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.target_path)
    }
}

/// Single-use result channel of one file
///
/// Completing consumes the value, so a file reports at most once. A dropped
/// completion is seen by the receiver as abandoned.
#[derive(Debug)]
pub struct FileCompletion {
    sender: oneshot::Sender<FileStatus>,
}

impl FileCompletion {
    pub fn channel() -> (Self, oneshot::Receiver<FileStatus>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    pub fn complete(self, status: FileStatus) {
        // The receiver is gone only when the whole deployment was dropped
        let _ = self.sender.send(status);
    }
}

/// A file handed to a plugin together with its completion
#[derive(Debug)]
pub struct FileTask {
    pub file: FileRef,
    completion: FileCompletion,
}

impl FileTask {
    pub fn new(file: FileRef) -> (Self, oneshot::Receiver<FileStatus>) {
        let (completion, receiver) = FileCompletion::channel();
        (Self { file, completion }, receiver)
    }

    pub fn succeed(self) {
        self.completion.complete(FileStatus::Succeeded);
    }

    pub fn fail(self, message: impl Into<String>) {
        self.completion.complete(FileStatus::Failed(message.into()));
    }

    pub fn cancel(self) {
        self.completion.complete(FileStatus::Canceled);
    }

    /// Report the outcome of a per-file call
    pub fn finish(self, result: Result<(), PluginError>) {
        match result {
            Ok(()) => self.succeed(),
            Err(e) if e.is_cancelled() => self.cancel(),
            Err(e) => {
                warn!("{}: {}", self.file.relative_path, e);
                self.fail(e.to_string())
            }
        }
    }

    pub fn complete(self, status: FileStatus) {
        self.completion.complete(status);
    }
}

/// Remote metadata of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileInfo {
    pub exists: bool,
    pub modify_time: Option<DateTime<Utc>>,
    pub size: Option<u64>,
    pub path: String,
}

impl RemoteFileInfo {
    pub fn missing(path: impl Into<String>) -> Self {
        Self {
            exists: false,
            modify_time: None,
            size: None,
            path: path.into(),
        }
    }

    pub fn found(path: impl Into<String>, modify_time: Option<DateTime<Utc>>, size: Option<u64>) -> Self {
        Self {
            exists: true,
            modify_time,
            size,
            path: path.into(),
        }
    }
}

/// Everything a plugin may need besides the target
#[derive(Clone)]
pub struct DeployContext {
    pub session: Arc<DeploySession>,
    pub cancellation: CancellationToken,
    pub values: ValueResolver,
    pub workspace_root: PathBuf,
    pub registry: Arc<PluginRegistry>,
    /// Every configured target, for plugins that forward to other targets
    pub targets: Arc<Vec<Target>>,
    /// Forwarding depth
    pub depth: usize,
}

impl DeployContext {
    pub fn new(
        session: Arc<DeploySession>,
        cancellation: CancellationToken,
        values: ValueResolver,
        workspace_root: impl Into<PathBuf>,
        registry: Arc<PluginRegistry>,
        targets: Arc<Vec<Target>>,
    ) -> Self {
        Self {
            session,
            cancellation,
            values,
            workspace_root: workspace_root.into(),
            registry,
            targets,
            depth: 0,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Fail with `Cancelled` once the token fired
    pub fn check_cancelled(&self) -> Result<(), PluginError> {
        if self.is_cancelled() {
            Err(PluginError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Context for a forwarded deployment
    pub fn nested(&self) -> Self {
        let mut nested = self.clone();
        nested.depth += 1;
        nested
    }

    /// Values with `file`, `relative_path` and `target_name` of one file
    pub fn file_values(&self, file: &FileRef, target: &Target) -> ValueResolver {
        self.values.with_values(vec![
            Value::built_in("file", file.local_path.display().to_string()),
            Value::built_in("relative_path", file.relative_path.clone()),
            Value::built_in("target_name", target.name.clone()),
        ])
    }
}

/// Contract of every transport
#[async_trait]
pub trait DeployPlugin: Send + Sync {
    /// Type tag served by this plugin, the wildcard serves every target
    fn plugin_type(&self) -> PluginType;

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities::deploy_only()
    }

    /// Deploy the whole list of one target, completing every task once
    async fn deploy_workspace(
        &self,
        tasks: Vec<FileTask>,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        deploy_sequentially(self, tasks, target, ctx).await;
        Ok(())
    }

    async fn deploy_file(
        &self,
        _file: &FileRef,
        _target: &Target,
        _ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        Err(PluginError::unsupported(&self.plugin_type(), "deploy_file"))
    }

    async fn pull_workspace(
        &self,
        tasks: Vec<FileTask>,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        pull_sequentially(self, tasks, target, ctx).await;
        Ok(())
    }

    async fn pull_file(
        &self,
        _file: &FileRef,
        _target: &Target,
        _ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        Err(PluginError::unsupported(&self.plugin_type(), "pull_file"))
    }

    async fn get_file_info(
        &self,
        _file: &FileRef,
        _target: &Target,
        _ctx: &DeployContext,
    ) -> Result<RemoteFileInfo, PluginError> {
        Err(PluginError::unsupported(&self.plugin_type(), "get_file_info"))
    }
}

/// Run `deploy_file` for each task in order, cancelling the rest once the token fired
pub async fn deploy_sequentially<P>(plugin: &P, tasks: Vec<FileTask>, target: &Target, ctx: &DeployContext)
where
    P: DeployPlugin + ?Sized,
{
    for task in tasks {
        if ctx.is_cancelled() {
            task.cancel();
            continue;
        }
        let result = plugin.deploy_file(&task.file, target, ctx).await;
        task.finish(result);
    }
}

/// Run `pull_file` for each task in order
pub async fn pull_sequentially<P>(plugin: &P, tasks: Vec<FileTask>, target: &Target, ctx: &DeployContext)
where
    P: DeployPlugin + ?Sized,
{
    for task in tasks {
        if ctx.is_cancelled() {
            task.cancel();
            continue;
        }
        let result = plugin.pull_file(&task.file, target, ctx).await;
        task.finish(result);
    }
}

/// Hand a file list to one plugin and collect exactly one status per file
///
/// `on_status` is called for each file as its status becomes known. Panics and
/// errors of the plugin call, and completions the plugin dropped, become
/// failures (or cancellations when the token fired).
pub async fn run_plugin<F>(
    plugin: &Arc<dyn DeployPlugin>,
    direction: DeployDirection,
    files: &[FileRef],
    target: &Target,
    ctx: &DeployContext,
    mut on_status: F,
) -> Vec<FileStatus>
where
    F: FnMut(usize, &FileStatus),
{
    let (tasks, receivers): (Vec<_>, Vec<_>) = files.iter().cloned().map(FileTask::new).unzip();

    let call = async {
        let future = match direction {
            DeployDirection::Deploy => plugin.deploy_workspace(tasks, target, ctx),
            DeployDirection::Pull => plugin.pull_workspace(tasks, target, ctx),
        };
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(format!("plugin panicked: {}", panic_message(panic.as_ref()))),
        }
    };

    let collect = async {
        let mut received = Vec::with_capacity(receivers.len());
        for (index, receiver) in receivers.into_iter().enumerate() {
            let status = receiver.await.ok();
            if let Some(status) = &status {
                on_status(index, status);
            }
            received.push(status);
        }
        received
    };

    let (call_error, received) = tokio::join!(call, collect);
    if let Some(error) = &call_error {
        warn!("'{}' plugin failed for target '{}': {}", plugin.plugin_type(), target.name, error);
    }

    received
        .into_iter()
        .enumerate()
        .map(|(index, status)| match status {
            Some(status) => status,
            None => {
                let status = if ctx.is_cancelled() {
                    FileStatus::Canceled
                } else {
                    FileStatus::Failed(
                        call_error
                            .clone()
                            .unwrap_or_else(|| "plugin did not report a result".to_string()),
                    )
                };
                debug!("File #{} abandoned by plugin: {:?}", index, status);
                on_status(index, &status);
                status
            }
        })
        .collect()
}

/// Text of a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::session::DeploySession;

    struct FlakyPlugin;

    #[async_trait]
    impl DeployPlugin for FlakyPlugin {
        fn plugin_type(&self) -> PluginType {
            PluginType::new("flaky")
        }

        async fn deploy_file(
            &self,
            file: &FileRef,
            _target: &Target,
            _ctx: &DeployContext,
        ) -> Result<(), PluginError> {
            match file.relative_path.as_str() {
                "bad.txt" => Err(PluginError::Transfer("boom".to_string())),
                "panic.txt" => panic!("exploded"),
                _ => Ok(()),
            }
        }
    }

    struct ForgetfulPlugin;

    #[async_trait]
    impl DeployPlugin for ForgetfulPlugin {
        fn plugin_type(&self) -> PluginType {
            PluginType::new("forgetful")
        }

        async fn deploy_workspace(
            &self,
            mut tasks: Vec<FileTask>,
            _target: &Target,
            _ctx: &DeployContext,
        ) -> Result<(), PluginError> {
            if let Some(first) = tasks.drain(..1).next() {
                first.succeed();
            }
            Err(PluginError::Transfer("connection lost".to_string()))
        }
    }

    fn context() -> DeployContext {
        DeployContext::new(
            Arc::new(DeploySession::default()),
            CancellationToken::new(),
            ValueResolver::default(),
            "/ws",
            Arc::new(PluginRegistry::new()),
            Arc::new(Vec::new()),
        )
    }

    fn files(names: &[&str]) -> Vec<FileRef> {
        names
            .iter()
            .map(|name| FileRef::new(format!("/ws/{}", name), *name, *name))
            .collect()
    }

    #[test]
    fn test_file_ref_parts() {
        let file = FileRef::new("/ws/src/a.txt", "src/a.txt", "site/css/a.css");
        assert_eq!(file.target_dir(), "site/css");
        assert_eq!(file.target_name(), "a.css");

        let root = FileRef::new("/ws/a.txt", "a.txt", "a.txt");
        assert_eq!(root.target_dir(), "");
        assert_eq!(root.target_name(), "a.txt");
    }

    #[test]
    fn test_capability_union_and_labels() {
        let archive = PluginCapabilities::deploy_only().with_batch();
        assert_eq!(archive.labels(), vec!["batch"]);
        assert!(!archive.supports(DeployDirection::Pull));

        let combined = archive.union(PluginCapabilities::full());
        assert_eq!(combined.labels(), vec!["pull", "info", "batch"]);
        assert!(combined.supports(DeployDirection::Pull));
        assert!(PluginCapabilities::deploy_only().labels().is_empty());
    }

    #[tokio::test]
    async fn test_errors_are_per_file() {
        let plugin: Arc<dyn DeployPlugin> = Arc::new(FlakyPlugin);
        let target = Target::new("t", "flaky");
        let mut seen = Vec::new();

        let statuses = run_plugin(
            &plugin,
            DeployDirection::Deploy,
            &files(&["a.txt", "bad.txt", "c.txt"]),
            &target,
            &context(),
            |index, _| seen.push(index),
        )
        .await;

        assert_eq!(statuses[0], FileStatus::Succeeded);
        assert!(matches!(statuses[1], FileStatus::Failed(_)));
        assert_eq!(statuses[2], FileStatus::Succeeded);
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_panic_becomes_failure_for_remaining_files() {
        let plugin: Arc<dyn DeployPlugin> = Arc::new(FlakyPlugin);
        let target = Target::new("t", "flaky");

        let statuses = run_plugin(
            &plugin,
            DeployDirection::Deploy,
            &files(&["a.txt", "panic.txt", "c.txt"]),
            &target,
            &context(),
            |_, _| {},
        )
        .await;

        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses[0], FileStatus::Succeeded);
        match &statuses[1] {
            FileStatus::Failed(message) => assert!(message.contains("exploded")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(statuses[2], FileStatus::Failed(_)));
    }

    #[tokio::test]
    async fn test_dropped_completions_use_call_error() {
        let plugin: Arc<dyn DeployPlugin> = Arc::new(ForgetfulPlugin);
        let target = Target::new("t", "forgetful");

        let statuses = run_plugin(
            &plugin,
            DeployDirection::Deploy,
            &files(&["a.txt", "b.txt"]),
            &target,
            &context(),
            |_, _| {},
        )
        .await;

        assert_eq!(statuses[0], FileStatus::Succeeded);
        assert_eq!(
            statuses[1],
            FileStatus::Failed("Transfer failed: connection lost".to_string())
        );
    }

    #[tokio::test]
    async fn test_cancelled_context_cancels_everything() {
        let plugin: Arc<dyn DeployPlugin> = Arc::new(FlakyPlugin);
        let target = Target::new("t", "flaky");
        let ctx = context();
        ctx.cancellation.cancel();

        let statuses = run_plugin(
            &plugin,
            DeployDirection::Deploy,
            &files(&["a.txt", "b.txt"]),
            &target,
            &ctx,
            |_, _| {},
        )
        .await;
        assert_eq!(statuses, vec![FileStatus::Canceled, FileStatus::Canceled]);
    }

    #[tokio::test]
    async fn test_unsupported_pull() {
        let plugin: Arc<dyn DeployPlugin> = Arc::new(FlakyPlugin);
        let target = Target::new("t", "flaky");

        let statuses = run_plugin(
            &plugin,
            DeployDirection::Pull,
            &files(&["a.txt"]),
            &target,
            &context(),
            |_, _| {},
        )
        .await;
        assert!(matches!(&statuses[0], FileStatus::Failed(m) if m.contains("not supported")));
    }
}
