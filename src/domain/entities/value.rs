use serde::{Deserialize, Serialize};

/// プレースホルダ `${name}` に代入される名前付きの値
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Value {
    /// 設定に書かれた固定値
    Static {
        name: String,
        #[serde(default)]
        value: serde_json::Value,
    },

    /// 他の値を参照して評価される式
    Code { name: String, code: String },

    /// 環境変数（`alias` を指定するとプレースホルダ名を変更できる）
    Env {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },

    /// ファイルの内容
    File { name: String, path: String },

    /// 実行環境から取得される組み込み値
    #[serde(skip_deserializing)]
    BuiltIn { name: String, value: String },
}

impl Value {
    /// 固定値を作成
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Static {
            name: name.into(),
            value: serde_json::Value::String(value.into()),
        }
    }

    /// 式の値を作成
    pub fn code(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Code {
            name: name.into(),
            code: code.into(),
        }
    }

    /// 組み込み値を作成
    pub fn built_in(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::BuiltIn {
            name: name.into(),
            value: value.into(),
        }
    }

    /// `values[]` の要素から値を構築（`type` 省略時は固定値）
    pub fn parse(raw: &serde_json::Value) -> Result<Self, serde_json::Error> {
        let mut raw = raw.clone();
        if let Some(object) = raw.as_object_mut() {
            object
                .entry("type")
                .or_insert_with(|| serde_json::Value::String("static".to_string()));
            if let Some(serde_json::Value::String(kind)) = object.get_mut("type") {
                *kind = kind.trim().to_lowercase();
            }
        }
        serde_json::from_value(raw)
    }

    /// プレースホルダとして参照される名前
    pub fn name(&self) -> &str {
        match self {
            Self::Env {
                alias: Some(alias), ..
            } if !alias.trim().is_empty() => alias,
            Self::Static { name, .. }
            | Self::Code { name, .. }
            | Self::Env { name, .. }
            | Self::File { name, .. }
            | Self::BuiltIn { name, .. } => name,
        }
    }

    /// 名前が一致するか（大文字小文字は区別しない）
    pub fn matches_name(&self, name: &str) -> bool {
        self.name().trim().eq_ignore_ascii_case(name.trim())
    }

    pub fn is_code(&self) -> bool {
        matches!(self, Self::Code { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_type_is_static() {
        let value = Value::parse(&json!({"name": "dir", "value": "/out"})).unwrap();
        assert_eq!(value, Value::text("dir", "/out"));
    }

    #[test]
    fn test_type_is_case_insensitive() {
        let value = Value::parse(&json!({"name": "x", "type": "Code", "code": "1 + 1"})).unwrap();
        assert!(value.is_code());
    }

    #[test]
    fn test_env_alias_is_placeholder_name() {
        let value = Value::parse(&json!({"type": "env", "name": "HOME", "alias": "home"})).unwrap();
        assert_eq!(value.name(), "home");
        assert!(value.matches_name("HOME"));
    }

    #[test]
    fn test_built_in_cannot_be_configured() {
        assert!(Value::parse(&json!({"type": "builtin", "name": "x", "value": "y"})).is_err());
    }
}
