use super::deploy_files::DeployEnvironment;
use crate::application::services::filter_service::{FileFilter, GlobFilter};
use crate::application::services::resolver_service::ResolvedConfig;
use crate::common::result::WarnOnError;
use crate::domain::entities::{normalize_name, DeployConfig, Package, Target};
use crate::domain::value_objects::{map_path, relative_to_workspace, DeployDirection, FileStatus};
use crate::infrastructure::filesystem::WorkspaceScanner;
use crate::infrastructure::plugins::plugin_interface::{
    panic_message, run_plugin, DeployContext, DeployPlugin, FileRef, RemoteFileInfo,
};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 1ターゲットでの同期結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// リモートのファイルでローカルを置き換えた
    Pulled,
    /// リモートに存在しない
    NotOnRemote,
    /// セッション中にローカルが変更されている
    LocalChangedWithinSession,
    /// ローカルの方が新しい
    LocalIsNewer,
    Failed(String),
    Canceled,
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pulled => write!(f, "pulled"),
            Self::NotOnRemote => write!(f, "does not exist on remote"),
            Self::LocalChangedWithinSession => write!(f, "local changed within session"),
            Self::LocalIsNewer => write!(f, "local is newer"),
            Self::Failed(message) => write!(f, "failed: {}", message),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

/// 同期の判定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncDecision {
    Pull,
    Skip(SyncOutcome),
}

/// リモートの情報とローカルの更新時刻から、プルするかどうかを判定する
///
/// リモートが存在し、ローカルより厳密に新しく、かつローカルがセッション開始後に
/// 変更されていない（または `always_sync_if_newer`）場合だけプルする。
/// リモートの更新時刻が分からない場合はローカルを優先する。
pub fn decide(
    remote: &RemoteFileInfo,
    local_modified: Option<DateTime<Utc>>,
    session_start: DateTime<Utc>,
    always_sync_if_newer: bool,
) -> SyncDecision {
    if !remote.exists {
        return SyncDecision::Skip(SyncOutcome::NotOnRemote);
    }
    let Some(local_modified) = local_modified else {
        return SyncDecision::Pull;
    };
    let Some(remote_modified) = remote.modify_time else {
        return SyncDecision::Skip(SyncOutcome::LocalIsNewer);
    };

    if remote_modified <= local_modified {
        SyncDecision::Skip(SyncOutcome::LocalIsNewer)
    } else if local_modified > session_start && !always_sync_if_newer {
        SyncDecision::Skip(SyncOutcome::LocalChangedWithinSession)
    } else {
        SyncDecision::Pull
    }
}

/// パッケージ・ターゲットごとの同期レポート
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub package: String,
    pub target: String,
    pub outcome: SyncOutcome,
}

/// ファイルを開いた時に、より新しいリモートのファイルを取得するユースケース
pub struct SyncOnOpenUseCase {
    env: DeployEnvironment,
    packages: Vec<Package>,
    settings: DeployConfig,
}

impl SyncOnOpenUseCase {
    /// 新しいSyncOnOpenUseCaseインスタンスを作成
    pub fn new(env: DeployEnvironment, packages: Vec<Package>, settings: DeployConfig) -> Self {
        Self {
            env,
            packages,
            settings,
        }
    }

    /// 解決済みの設定から作成
    pub fn from_config(env: DeployEnvironment, config: &ResolvedConfig) -> Self {
        Self::new(env, config.packages.clone(), config.settings.clone())
    }

    /// 開いたファイルを同期する
    ///
    /// ワークスペース外のファイルや、どのパッケージにも属さないファイルでは何もしない。
    pub async fn sync_on_open(&self, file: &Path) -> Vec<SyncReport> {
        let file = if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.env.workspace_root.join(file)
        };
        let relative = match relative_to_workspace(&file, &self.env.workspace_root) {
            Ok(relative) => relative,
            Err(e) => {
                debug!("Not syncing {}: {}", file.display(), e);
                return Vec::new();
            }
        };

        // 1. 同期対象のパッケージを決定
        let packages: Vec<&Package> = self
            .packages
            .iter()
            .filter(|package| package.sync_when_open.as_ref().is_some_and(|policy| policy.is_enabled()))
            .filter(|package| self.package_contains(package, &file, &relative))
            .collect();
        if packages.is_empty() {
            return Vec::new();
        }

        // 2. セッション開始時刻とキャンセルトークン
        let session_start = self
            .env
            .session
            .sync_reference_time(self.settings.use_workspace_start_time_for_sync_when_open);
        let ctx = self.env.deploy_context(self.env.session.begin_operation());

        // 3. パッケージ・ターゲット・プラグインごとに判定してプル
        let mut reports = Vec::new();
        for package in packages {
            let Some(policy) = &package.sync_when_open else {
                continue;
            };
            let always = policy
                .always_sync_if_newer()
                .unwrap_or(self.settings.always_sync_if_newer);

            for target in self.targets_of(&policy.target_names(&package.targets)) {
                let outcome = self
                    .sync_target(&file, &relative, &target, session_start, always, &ctx)
                    .await;
                info!("Sync of '{}' from '{}': {}", relative, target.name, outcome);
                reports.push(SyncReport {
                    package: package.name.clone(),
                    target: target.name.clone(),
                    outcome,
                });
            }
        }
        reports
    }

    /// パッケージにファイルが含まれるか（globだけで判定、またはワークスペースを走査）
    fn package_contains(&self, package: &Package, file: &Path, relative: &str) -> bool {
        let fast = package.use_fast_check.unwrap_or(self.settings.fast_check_on_sync);
        let subject = format!("Package '{}'", package.name);
        if fast {
            return GlobFilter::new(&FileFilter::from_package(package))
                .warn_on_error(subject)
                .is_some_and(|filter| filter.matches(relative));
        }

        WorkspaceScanner::new(&self.env.workspace_root)
            .package_files(package)
            .warn_on_error(subject)
            .is_some_and(|files| files.iter().any(|candidate| candidate == file))
    }

    fn targets_of(&self, names: &[String]) -> Vec<Target> {
        let mut targets = Vec::new();
        for name in names {
            let wanted = normalize_name(name);
            match self.env.targets.iter().find(|target| target.normalized_name() == wanted) {
                Some(target) => targets.push(target.clone()),
                None => warn!("Unknown sync target '{}'", name),
            }
        }
        targets
    }

    async fn sync_target(
        &self,
        file: &Path,
        relative: &str,
        target: &Target,
        session_start: DateTime<Utc>,
        always_sync_if_newer: bool,
        ctx: &DeployContext,
    ) -> SyncOutcome {
        let target_path = match map_path(relative, &target.mappings) {
            Ok(target_path) => target_path,
            Err(e) => return SyncOutcome::Failed(e.to_string()),
        };
        let file_ref = FileRef::new(file, relative, target_path);

        let plugins: Vec<Arc<dyn DeployPlugin>> = self
            .env
            .registry
            .resolve(target)
            .into_iter()
            .filter(|plugin| {
                let capabilities = plugin.capabilities();
                capabilities.can_pull && capabilities.can_get_file_info
            })
            .collect();
        if plugins.is_empty() {
            return SyncOutcome::Failed(format!(
                "no plugins for type '{}' can pull and read file info",
                target.target_type
            ));
        }

        let mut outcome = SyncOutcome::NotOnRemote;
        for plugin in &plugins {
            if ctx.is_cancelled() {
                return SyncOutcome::Canceled;
            }

            let info = match AssertUnwindSafe(plugin.get_file_info(&file_ref, target, ctx))
                .catch_unwind()
                .await
            {
                Ok(Ok(info)) => info,
                Ok(Err(e)) if e.is_cancelled() => return SyncOutcome::Canceled,
                Ok(Err(e)) => return SyncOutcome::Failed(e.to_string()),
                Err(panic) => {
                    return SyncOutcome::Failed(format!("plugin panicked: {}", panic_message(panic.as_ref())))
                }
            };

            let local_modified = local_modify_time(file).await;
            outcome = match decide(&info, local_modified, session_start, always_sync_if_newer) {
                SyncDecision::Skip(reason) => reason,
                SyncDecision::Pull => {
                    debug!("Pulling '{}' from '{}'", relative, target.name);
                    let statuses = run_plugin(
                        plugin,
                        DeployDirection::Pull,
                        std::slice::from_ref(&file_ref),
                        target,
                        ctx,
                        |_, _| {},
                    )
                    .await;
                    match statuses.into_iter().next() {
                        Some(FileStatus::Succeeded) => SyncOutcome::Pulled,
                        Some(FileStatus::Canceled) => SyncOutcome::Canceled,
                        Some(FileStatus::Failed(message)) => SyncOutcome::Failed(message),
                        None => SyncOutcome::Failed("plugin did not report a result".to_string()),
                    }
                }
            };
            // プル済みのファイルを後続のプラグインで再判定しない
            if matches!(
                outcome,
                SyncOutcome::Pulled | SyncOutcome::Failed(_) | SyncOutcome::Canceled
            ) {
                break;
            }
        }
        outcome
    }
}

async fn local_modify_time(file: &Path) -> Option<DateTime<Utc>> {
    let modified = tokio::fs::metadata(file).await.ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn remote(modify_time: Option<DateTime<Utc>>) -> RemoteFileInfo {
        RemoteFileInfo::found("a.txt", modify_time, Some(1))
    }

    #[test]
    fn test_missing_remote() {
        let now = Utc::now();
        assert_eq!(
            decide(&RemoteFileInfo::missing("a.txt"), Some(now), now, false),
            SyncDecision::Skip(SyncOutcome::NotOnRemote)
        );
    }

    #[test]
    fn test_local_is_newer() {
        let start = Utc::now() - Duration::hours(2);
        let local = start - Duration::minutes(5);
        assert_eq!(
            decide(&remote(Some(local - Duration::minutes(1))), Some(local), start, true),
            SyncDecision::Skip(SyncOutcome::LocalIsNewer)
        );
        // 同じ時刻はプルしない
        assert_eq!(
            decide(&remote(Some(local)), Some(local), start, false),
            SyncDecision::Skip(SyncOutcome::LocalIsNewer)
        );
        assert_eq!(
            decide(&remote(None), Some(local), start, false),
            SyncDecision::Skip(SyncOutcome::LocalIsNewer)
        );
    }

    #[test]
    fn test_local_changed_within_session() {
        let start = Utc::now() - Duration::hours(2);
        let local = start + Duration::minutes(10);
        let newer = remote(Some(local + Duration::minutes(1)));

        assert_eq!(
            decide(&newer, Some(local), start, false),
            SyncDecision::Skip(SyncOutcome::LocalChangedWithinSession)
        );
        assert_eq!(decide(&newer, Some(local), start, true), SyncDecision::Pull);
    }

    #[test]
    fn test_remote_newer_and_local_untouched() {
        let start = Utc::now();
        let local = start - Duration::days(1);
        assert_eq!(
            decide(&remote(Some(local + Duration::seconds(1))), Some(local), start, false),
            SyncDecision::Pull
        );
        assert_eq!(decide(&remote(Some(local)), None, start, false), SyncDecision::Pull);
    }

    #[test]
    fn test_outcome_text() {
        assert_eq!(SyncOutcome::LocalIsNewer.to_string(), "local is newer");
        assert_eq!(SyncOutcome::NotOnRemote.to_string(), "does not exist on remote");
    }
}
