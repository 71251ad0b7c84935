use super::target::normalize_name;
use serde::{Deserialize, Deserializer, Serialize};

/// パッケージのボタン表示情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageButton {
    /// 表示テキスト
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// ツールチップ
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
}

/// ターゲットへの紐付け（`true`、ターゲット名、またはターゲット名のリスト）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetBinding {
    Enabled(bool),
    Target(String),
    Targets(Vec<String>),
}

impl Default for TargetBinding {
    fn default() -> Self {
        Self::Enabled(false)
    }
}

impl TargetBinding {
    /// 紐付けが有効か
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Enabled(enabled) => *enabled,
            Self::Target(name) => !name.trim().is_empty(),
            Self::Targets(names) => !names.is_empty(),
        }
    }

    /// 紐付けられたターゲット名（`true` の場合はパッケージの既定ターゲット）
    pub fn target_names(&self, package_targets: &[String]) -> Vec<String> {
        match self {
            Self::Enabled(true) => package_targets.to_vec(),
            Self::Enabled(false) => Vec::new(),
            Self::Target(name) => vec![name.clone()],
            Self::Targets(names) => names.clone(),
        }
    }
}

/// ファイルを開いた時の同期ポリシー
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SyncWhenOpen {
    Binding(TargetBinding),
    Detailed {
        #[serde(default)]
        target: Option<String>,

        #[serde(default, rename = "alwaysSyncIfNewer")]
        always_sync_if_newer: Option<bool>,
    },
}

impl SyncWhenOpen {
    /// 同期に使うターゲット名
    pub fn target_names(&self, package_targets: &[String]) -> Vec<String> {
        match self {
            Self::Binding(binding) => binding.target_names(package_targets),
            Self::Detailed {
                target: Some(name), ..
            } => vec![name.clone()],
            Self::Detailed { target: None, .. } => package_targets.to_vec(),
        }
    }

    /// パッケージ単位の「新しければ常に同期」設定
    pub fn always_sync_if_newer(&self) -> Option<bool> {
        match self {
            Self::Detailed {
                always_sync_if_newer,
                ..
            } => *always_sync_if_newer,
            Self::Binding(_) => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Binding(binding) => binding.is_enabled(),
            Self::Detailed { .. } => true,
        }
    }
}

/// ファイル選択規則と既定ターゲットをまとめたパッケージ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    /// パッケージ名
    pub name: String,

    /// 説明（オプション）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// 含めるファイルのglobパターン（空の場合は全て）
    #[serde(default, deserialize_with = "one_or_many")]
    pub files: Vec<String>,

    /// 除外するファイルのglobパターン
    #[serde(default, deserialize_with = "one_or_many")]
    pub exclude: Vec<String>,

    /// 既定のデプロイ先
    #[serde(default, deserialize_with = "one_or_many")]
    pub targets: Vec<String>,

    /// 保存時のデプロイ
    #[serde(default)]
    pub deploy_on_save: TargetBinding,

    /// ファイルを開いた時の同期
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_when_open: Option<SyncWhenOpen>,

    /// 同期時にglobだけで判定するか（全体設定を上書き）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_fast_check: Option<bool>,

    /// ボタン表示情報
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button: Option<PackageButton>,
}

impl Package {
    /// 新しいPackageインスタンスを作成
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            files: Vec::new(),
            exclude: Vec::new(),
            targets: Vec::new(),
            deploy_on_save: TargetBinding::default(),
            sync_when_open: None,
            use_fast_check: None,
            button: None,
        }
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_sync_when_open(mut self, policy: SyncWhenOpen) -> Self {
        self.sync_when_open = Some(policy);
        self
    }

    pub fn with_deploy_on_save(mut self, binding: TargetBinding) -> Self {
        self.deploy_on_save = binding;
        self
    }

    /// 比較用に正規化した名前
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
        None => Vec::new(),
    })
}
