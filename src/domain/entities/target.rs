use crate::domain::value_objects::{MappingRule, PluginType};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// デプロイ先の定義
///
/// 継承・インポート・フィルタの処理が済んだ、プラグインに渡される最終形。
/// 転送方式ごとの設定は `settings` に残り、各プラグインが自分の型へ変換する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// ターゲット名
    pub name: String,

    /// プラグイン種別
    #[serde(rename = "type", default)]
    pub target_type: PluginType,

    /// 説明（オプション）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// パスのマッピング規則（先頭から評価）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mappings: Vec<MappingRule>,

    /// デプロイ前に実行する操作
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub before_deploy: Vec<serde_json::Value>,

    /// デプロイ後に実行する操作
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deployed: Vec<serde_json::Value>,

    /// 転送方式固有の設定
    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl Target {
    /// 新しいTargetインスタンスを作成
    pub fn new(name: impl Into<String>, target_type: impl Into<PluginType>) -> Self {
        Self {
            name: name.into(),
            target_type: target_type.into(),
            description: None,
            mappings: Vec::new(),
            before_deploy: Vec::new(),
            deployed: Vec::new(),
            settings: serde_json::Map::new(),
        }
    }

    /// 設定値を追加
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// マッピング規則を追加
    pub fn with_mapping(mut self, rule: MappingRule) -> Self {
        self.mappings.push(rule);
        self
    }

    /// デプロイ前操作を追加
    pub fn with_before_deploy(mut self, operation: serde_json::Value) -> Self {
        self.before_deploy.push(operation);
        self
    }

    /// デプロイ後操作を追加
    pub fn with_deployed(mut self, operation: serde_json::Value) -> Self {
        self.deployed.push(operation);
        self
    }

    /// 比較用に正規化した名前
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    /// 転送方式固有の設定を型付きで取得
    pub fn typed_settings<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(self.settings.clone()))
    }
}

/// ターゲット名・パッケージ名の正規化
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct DirSettings {
        dir: String,
        #[serde(default)]
        empty: bool,
    }

    #[test]
    fn test_target_from_json_keeps_transport_settings() {
        let json = serde_json::json!({
            "name": "Web Server",
            "type": "LOCAL",
            "dir": "/out",
            "empty": true,
            "mappings": [{"source": "src/", "target": ""}]
        });

        let target: Target = serde_json::from_value(json).unwrap();
        assert_eq!(target.target_type.as_str(), "local");
        assert_eq!(target.normalized_name(), "web server");
        assert_eq!(target.mappings.len(), 1);

        let settings: DirSettings = target.typed_settings().unwrap();
        assert_eq!(settings.dir, "/out");
        assert!(settings.empty);
    }

    #[test]
    fn test_builder_helpers() {
        let target = Target::new("t1", "local")
            .with_setting("dir", "/out")
            .with_mapping(MappingRule::prefix("src/", ""));

        assert_eq!(target.settings["dir"], "/out");
        assert_eq!(target.mappings[0].source, "src/");
    }

    #[test]
    fn test_missing_name_is_rejected() {
        let json = serde_json::json!({"type": "local"});
        assert!(serde_json::from_value::<Target>(json).is_err());
    }
}
