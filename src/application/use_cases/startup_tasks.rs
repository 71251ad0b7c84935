use crate::application::session::{DeploySession, TimerKind};
use crate::domain::entities::{DeployConfig, StartupTask};
use crate::infrastructure::process::{CommandExecutor, ExecutionConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// `runGitPullOnStartup` でコマンドを省略した場合のコマンド
pub const DEFAULT_GIT_PULL_COMMAND: &str = "git pull";

/// スケジュールされた起動時タスク
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub kind: TimerKind,
    pub delay: Duration,
    pub command: String,
}

/// 起動時のビルドタスクと `git pull` をセッションのタイマーに登録するユースケース
pub struct StartupTasksUseCase {
    session: Arc<DeploySession>,
    workspace_root: PathBuf,
    settings: DeployConfig,
}

impl StartupTasksUseCase {
    /// 新しいStartupTasksUseCaseインスタンスを作成
    pub fn new(session: Arc<DeploySession>, workspace_root: impl Into<PathBuf>, settings: DeployConfig) -> Self {
        Self {
            session,
            workspace_root: workspace_root.into(),
            settings,
        }
    }

    /// 設定から実行すべきタスクを決定する
    ///
    /// ビルドタスクは既定のコマンドがないため、`command` がなければスキップする。
    pub fn planned_tasks(&self) -> Vec<ScheduledTask> {
        let mut tasks = Vec::new();

        if let Some(task) = self.settings.run_build_task_on_startup.as_ref().and_then(|t| t.task()) {
            match task.command.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
                Some(command) => tasks.push(scheduled(TimerKind::BuildTask, &task, command)),
                None => warn!("runBuildTaskOnStartup is set but has no command, skipping"),
            }
        }

        if let Some(task) = self.settings.run_git_pull_on_startup.as_ref().and_then(|t| t.task()) {
            let command = task
                .command
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or(DEFAULT_GIT_PULL_COMMAND);
            tasks.push(scheduled(TimerKind::GitPull, &task, command));
        }

        tasks
    }

    /// タスクをタイマーに登録する。同じ種類の待機中のタイマーは置き換えられる。
    pub fn schedule(&self) -> Vec<ScheduledTask> {
        let tasks = self.planned_tasks();
        for task in &tasks {
            info!(
                "Scheduling {:?} in {} ms: {}",
                task.kind,
                task.delay.as_millis(),
                task.command
            );
            let command = task.command.clone();
            let kind = task.kind;
            let config = ExecutionConfig::new()
                .with_working_directory(&self.workspace_root)
                .with_shell(true);
            self.session.schedule_timer(task.kind, task.delay, async move {
                run_startup_command(kind, &command, &config).await;
            });
        }
        tasks
    }
}

fn scheduled(kind: TimerKind, task: &StartupTask, command: &str) -> ScheduledTask {
    ScheduledTask {
        kind,
        delay: Duration::from_millis(task.delay),
        command: command.to_string(),
    }
}

async fn run_startup_command(kind: TimerKind, command: &str, config: &ExecutionConfig) {
    match CommandExecutor::execute(command, config).await {
        Ok(result) if result.success => info!("{:?} finished: {}", kind, command),
        Ok(result) => warn!(
            "{:?} '{}' exited with {}: {}",
            kind,
            command,
            result.exit_code,
            result.stderr.trim()
        ),
        Err(e) => error!("{:?} '{}' failed: {}", kind, command, e),
    }
}
