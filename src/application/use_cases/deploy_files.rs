use crate::application::services::resolver_service::ResolvedConfig;
use crate::application::services::value_resolver::ValueResolver;
use crate::application::session::DeploySession;
use crate::common::error::DeployError;
use crate::domain::entities::{Target, Value};
use crate::domain::value_objects::{
    map_path, relative_to_workspace, DeployDirection, DeployOutcome, DeployState, FileStatus,
    StatusColor,
};
use crate::infrastructure::operations::{run_operation_value, OperationContext};
use crate::infrastructure::plugins::plugin_interface::{run_plugin, DeployContext, DeployPlugin, FileRef};
use crate::infrastructure::plugins::PluginRegistry;
use futures::future::join_all;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// デプロイ実行に必要な共有環境
#[derive(Clone)]
pub struct DeployEnvironment {
    /// 現在のセッション
    pub session: Arc<DeploySession>,

    /// プラグインレジストリ
    pub registry: Arc<PluginRegistry>,

    /// ワークスペースのルート
    pub workspace_root: PathBuf,

    /// 設定値と組み込み値
    pub values: ValueResolver,

    /// 設定された全てのターゲット（転送プラグイン用）
    pub targets: Arc<Vec<Target>>,
}

impl DeployEnvironment {
    /// 新しいDeployEnvironmentインスタンスを作成
    pub fn new(
        session: Arc<DeploySession>,
        registry: Arc<PluginRegistry>,
        workspace_root: impl Into<PathBuf>,
        values: ValueResolver,
        targets: Vec<Target>,
    ) -> Self {
        Self {
            session,
            registry,
            workspace_root: workspace_root.into(),
            values,
            targets: Arc::new(targets),
        }
    }

    /// 解決済みの設定から作成
    pub fn from_config(
        config: &ResolvedConfig,
        workspace_root: impl Into<PathBuf>,
        session: Arc<DeploySession>,
        registry: Arc<PluginRegistry>,
    ) -> Self {
        let workspace_root = workspace_root.into();
        let values = ValueResolver::with_built_ins(&workspace_root, config.values.clone());
        Self::new(session, registry, workspace_root, values, config.targets.clone())
    }

    /// プラグインに渡すコンテキスト
    pub fn deploy_context(&self, cancellation: CancellationToken) -> DeployContext {
        DeployContext::new(
            Arc::clone(&self.session),
            cancellation,
            self.values.clone(),
            self.workspace_root.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.targets),
        )
    }

    /// ターゲットのオペレーション用コンテキスト
    pub fn operation_context(&self, target: &Target, cancellation: CancellationToken) -> OperationContext {
        let values = self
            .values
            .with_values(vec![Value::built_in("target_name", target.name.clone())]);
        OperationContext::new(cancellation, values, self.workspace_root.clone())
    }
}

/// デプロイの進行を受け取るオブザーバ
///
/// 状態の変化、ファイルごとの完了、ターゲットごとの完了（ターゲットにつき一度）が通知される。
pub trait DeployObserver: Send + Sync {
    fn on_state_changed(&self, _state: DeployState) {}

    fn on_file_completed(&self, _target: &str, _file: &Path, _status: &FileStatus) {}

    fn on_target_completed(&self, _summary: &TargetSummary) {}
}

/// 1ファイル・1ターゲットの結果
#[derive(Debug, Clone, PartialEq)]
pub struct FileResult {
    /// ローカルの絶対パス
    pub path: PathBuf,

    /// マッピング後のターゲット上のパス（マッピングに失敗した場合はNone）
    pub target_path: Option<String>,

    /// 結果
    pub status: FileStatus,
}

/// 1ターゲットの結果
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSummary {
    /// ターゲット名
    pub target: String,

    /// ファイルごとの結果（入力順）
    pub files: Vec<FileResult>,
}

impl TargetSummary {
    pub fn total(&self) -> usize {
        self.files.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|status| matches!(status, FileStatus::Succeeded))
    }

    pub fn failed(&self) -> usize {
        self.count(|status| matches!(status, FileStatus::Failed(_)))
    }

    pub fn canceled(&self) -> usize {
        self.count(|status| matches!(status, FileStatus::Canceled))
    }

    fn count(&self, predicate: impl Fn(&FileStatus) -> bool) -> usize {
        self.files.iter().filter(|file| predicate(&file.status)).count()
    }
}

/// デプロイ/プルの結果
#[derive(Debug, Clone, PartialEq)]
pub struct DeploySummary {
    /// 方向
    pub direction: DeployDirection,

    /// 最終状態
    pub state: DeployState,

    /// ターゲットごとの結果
    pub targets: Vec<TargetSummary>,
}

impl DeploySummary {
    pub fn total(&self) -> usize {
        self.targets.iter().map(TargetSummary::total).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.targets.iter().map(TargetSummary::succeeded).sum()
    }

    pub fn failed(&self) -> usize {
        self.targets.iter().map(TargetSummary::failed).sum()
    }

    pub fn canceled(&self) -> usize {
        self.targets.iter().map(TargetSummary::canceled).sum()
    }

    pub fn outcome(&self) -> DeployOutcome {
        DeployOutcome::classify(self.failed(), self.total())
    }

    pub fn status_color(&self) -> Option<StatusColor> {
        self.outcome().status_color()
    }

    /// 利用者向けの要約メッセージ
    pub fn message(&self) -> String {
        match self.outcome() {
            DeployOutcome::Nothing => format!("Nothing to {}", self.direction),
            DeployOutcome::AllSucceeded if self.canceled() > 0 => format!(
                "{} of {} files canceled",
                self.canceled(),
                self.total()
            ),
            DeployOutcome::AllSucceeded => format!("{} file(s) done", self.total()),
            DeployOutcome::SomeFailed | DeployOutcome::AllFailed => {
                format!("{} of {} files failed", self.failed(), self.total())
            }
        }
    }
}

/// ファイルを複数のターゲットへデプロイ（またはターゲットからプル）するユースケース
pub struct DeployFilesUseCase {
    env: DeployEnvironment,
    observer: Option<Arc<dyn DeployObserver>>,
    state: watch::Sender<DeployState>,
}

impl DeployFilesUseCase {
    /// 新しいDeployFilesUseCaseインスタンスを作成
    pub fn new(env: DeployEnvironment) -> Self {
        let (state, _) = watch::channel(DeployState::Idle);
        Self {
            env,
            observer: None,
            state,
        }
    }

    /// オブザーバを設定
    pub fn with_observer(mut self, observer: Arc<dyn DeployObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// 状態の変化を購読
    pub fn subscribe(&self) -> watch::Receiver<DeployState> {
        self.state.subscribe()
    }

    pub fn environment(&self) -> &DeployEnvironment {
        &self.env
    }

    /// ファイルをターゲットへデプロイ
    pub async fn deploy(&self, files: &[PathBuf], targets: &[Target]) -> Result<DeploySummary, DeployError> {
        self.execute(DeployDirection::Deploy, files, targets).await
    }

    /// ターゲットからファイルをプル
    pub async fn pull(&self, files: &[PathBuf], targets: &[Target]) -> Result<DeploySummary, DeployError> {
        self.execute(DeployDirection::Pull, files, targets).await
    }

    async fn execute(
        &self,
        direction: DeployDirection,
        files: &[PathBuf],
        targets: &[Target],
    ) -> Result<DeploySummary, DeployError> {
        let token = self.env.session.begin_operation();

        // 1. 準備：ファイル一覧の正規化
        self.set_state(DeployState::Preparing);
        let files = self.prepare_files(files);
        info!(
            "Starting {} of {} file(s) to {} target(s)",
            direction,
            files.len(),
            targets.len()
        );

        // 2. beforeDeployオペレーション（失敗したら中断）
        if direction == DeployDirection::Deploy {
            if let Err(e) = self.run_before_deploy(targets, &token).await {
                self.set_state(DeployState::finished(e.is_cancelled(), usize::from(!e.is_cancelled())));
                return Err(e);
            }
        }

        // 3. ターゲットごとの処理（ターゲット間は並行）
        self.set_state(DeployState::InProgress);
        let ctx = self.env.deploy_context(token.clone());
        let summaries = join_all(
            targets
                .iter()
                .map(|target| self.process_target(direction, target, &files, &ctx)),
        )
        .await;

        // 4. deployedオペレーション（失敗はログのみ）
        if direction == DeployDirection::Deploy {
            self.run_deployed(targets, &token).await;
        }

        // 5. 最終状態の決定
        let mut summary = DeploySummary {
            direction,
            state: DeployState::Idle,
            targets: summaries,
        };
        summary.state = DeployState::finished(
            token.is_cancelled() || summary.canceled() > 0,
            summary.failed(),
        );
        info!("{} {}: {}", direction, summary.state, summary.message());
        self.set_state(summary.state);
        Ok(summary)
    }

    fn set_state(&self, state: DeployState) {
        debug!("Deploy state: {}", state);
        self.state.send_replace(state);
        if let Some(observer) = &self.observer {
            observer.on_state_changed(state);
        }
    }

    /// 相対パスを絶対パスにし、重複を取り除く（順序は保持）
    fn prepare_files(&self, files: &[PathBuf]) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        files
            .iter()
            .map(|file| {
                if file.is_absolute() {
                    file.clone()
                } else {
                    self.env.workspace_root.join(file)
                }
            })
            .filter(|file| seen.insert(file.clone()))
            .collect()
    }

    async fn run_before_deploy(&self, targets: &[Target], token: &CancellationToken) -> Result<(), DeployError> {
        for target in targets {
            let ctx = self.env.operation_context(target, token.clone());
            for raw in &target.before_deploy {
                if let Err(e) = run_operation_value(raw, &ctx).await {
                    if e.is_cancelled() {
                        return Err(DeployError::Cancelled);
                    }
                    error!("Operation before deploying to '{}' failed: {}", target.name, e);
                    return Err(DeployError::before_deploy_failed(&target.name, e.to_string()));
                }
            }
        }
        Ok(())
    }

    async fn run_deployed(&self, targets: &[Target], token: &CancellationToken) {
        if token.is_cancelled() {
            debug!("Skipping deployed operations of a canceled deployment");
            return;
        }
        for target in targets {
            let ctx = self.env.operation_context(target, token.clone());
            for raw in &target.deployed {
                if let Err(e) = run_operation_value(raw, &ctx).await {
                    warn!("Operation after deploying to '{}' failed: {}", target.name, e);
                }
            }
        }
    }

    fn plugins_for(&self, direction: DeployDirection, target: &Target) -> Vec<Arc<dyn DeployPlugin>> {
        self.env
            .registry
            .resolve(target)
            .into_iter()
            .filter(|plugin| plugin.capabilities().supports(direction))
            .collect()
    }

    async fn process_target(
        &self,
        direction: DeployDirection,
        target: &Target,
        files: &[PathBuf],
        ctx: &DeployContext,
    ) -> TargetSummary {
        let mut statuses: Vec<Option<FileStatus>> = vec![None; files.len()];
        let mut target_paths: Vec<Option<String>> = vec![None; files.len()];

        // マッピングに失敗したファイルはその場で失敗
        let mut refs = Vec::new();
        let mut indices = Vec::new();
        for (index, file) in files.iter().enumerate() {
            let mapped = relative_to_workspace(file, &self.env.workspace_root).and_then(|relative| {
                map_path(&relative, &target.mappings).map(|target_path| (relative, target_path))
            });
            match mapped {
                Ok((relative, target_path)) => {
                    target_paths[index] = Some(target_path.clone());
                    refs.push(FileRef::new(file.clone(), relative, target_path));
                    indices.push(index);
                }
                Err(e) => {
                    let status = FileStatus::Failed(e.to_string());
                    self.notify_file(target, file, &status);
                    statuses[index] = Some(status);
                }
            }
        }

        let plugins = self.plugins_for(direction, target);
        if plugins.is_empty() {
            let message = match direction {
                DeployDirection::Deploy => format!("no plugins for type '{}'", target.target_type),
                DeployDirection::Pull => format!("no plugins for type '{}' can pull", target.target_type),
            };
            warn!("Target '{}': {}", target.name, message);
            for &index in &indices {
                let status = FileStatus::Failed(message.clone());
                self.notify_file(target, &files[index], &status);
                statuses[index] = Some(status);
            }
        } else if !refs.is_empty() {
            debug!(
                "Target '{}': {} file(s) via {} plugin(s)",
                target.name,
                refs.len(),
                plugins.len()
            );
            // 同じファイルに複数のプラグインが報告した場合は最も悪い結果を採用し、
            // 最後のプラグインの報告でオブザーバに通知する
            let mut remaining = vec![plugins.len(); refs.len()];
            for plugin in &plugins {
                run_plugin(plugin, direction, &refs, target, ctx, |position, status| {
                    let index = indices[position];
                    let combined = match statuses[index].take() {
                        Some(previous) => previous.worst(status.clone()),
                        None => status.clone(),
                    };
                    remaining[position] -= 1;
                    if remaining[position] == 0 {
                        self.notify_file(target, &files[index], &combined);
                    }
                    statuses[index] = Some(combined);
                })
                .await;
            }
        }

        let summary = TargetSummary {
            target: target.name.clone(),
            files: files
                .iter()
                .zip(statuses)
                .zip(target_paths)
                .map(|((path, status), target_path)| FileResult {
                    path: path.clone(),
                    target_path,
                    status: status.unwrap_or_else(|| FileStatus::Failed("no result".to_string())),
                })
                .collect(),
        };

        debug!(
            "Target '{}' finished: {} succeeded, {} failed, {} canceled",
            summary.target,
            summary.succeeded(),
            summary.failed(),
            summary.canceled()
        );
        if let Some(observer) = &self.observer {
            observer.on_target_completed(&summary);
        }
        summary
    }

    fn notify_file(&self, target: &Target, file: &Path, status: &FileStatus) {
        if let Some(observer) = &self.observer {
            observer.on_file_completed(&target.name, file, status);
        }
    }
}
