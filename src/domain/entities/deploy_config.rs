use serde::{Deserialize, Serialize};

/// 起動時タスクの設定（`true`、遅延ミリ秒、または詳細設定）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StartupTrigger {
    Enabled(bool),
    Delay(u64),
    Detailed(StartupTask),
}

/// 起動時タスクの詳細
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupTask {
    /// 実行までの遅延（ミリ秒）
    #[serde(default)]
    pub delay: u64,

    /// 実行するコマンド（省略時は種別ごとの既定値）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl StartupTrigger {
    /// 有効な場合のタスク
    pub fn task(&self) -> Option<StartupTask> {
        match self {
            Self::Enabled(false) => None,
            Self::Enabled(true) => Some(StartupTask {
                delay: 0,
                command: None,
            }),
            Self::Delay(delay) => Some(StartupTask {
                delay: *delay,
                command: None,
            }),
            Self::Detailed(task) => Some(task.clone()),
        }
    }
}

/// 読み込んだ設定ドキュメント
///
/// `packages`/`targets`/`values` は継承やフィルタの処理前の生の宣言として保持し、
/// 解決は `ConfigResolver` が行う。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployConfig {
    #[serde(default)]
    pub packages: Vec<serde_json::Value>,

    #[serde(default)]
    pub targets: Vec<serde_json::Value>,

    #[serde(default)]
    pub values: Vec<serde_json::Value>,

    /// 他の設定ファイルの取り込み（パス文字列または `{ from, merge, ... }`）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<serde_json::Value>,

    /// 同期時にglobだけでパッケージを判定するか
    #[serde(default)]
    pub fast_check_on_sync: bool,

    /// ローカルがセッション中に変更されていても新しいリモートを取得するか
    #[serde(default)]
    pub always_sync_if_newer: bool,

    /// セッション開始時刻としてワークスペースの開始時刻を使うか
    #[serde(default)]
    pub use_workspace_start_time_for_sync_when_open: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_build_task_on_startup: Option<StartupTrigger>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_git_pull_on_startup: Option<StartupTrigger>,
}
