use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// デプロイの前後に実行される副作用
///
/// 設定では `type` で種別を指定する。文字列のみの場合は `open` 操作の省略形。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DeployOperation {
    Http(HttpOperation),
    Sql(SqlOperation),
    Compile(CompileOperation),
    Open(OpenOperation),
    Wait(WaitOperation),
    WebDeploy(WebDeployOperation),
}

impl DeployOperation {
    /// 設定の生の値から操作を構築
    pub fn from_value(raw: &serde_json::Value) -> Result<Self, serde_json::Error> {
        match raw {
            serde_json::Value::String(target) => Ok(Self::Open(OpenOperation {
                target: target.clone(),
                ..OpenOperation::default()
            })),
            other => serde_json::from_value(other.clone()),
        }
    }

    /// 種別名
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Sql(_) => "sql",
            Self::Compile(_) => "compile",
            Self::Open(_) => "open",
            Self::Wait(_) => "wait",
            Self::WebDeploy(_) => "webdeploy",
        }
    }

    /// ログ用の短い説明
    pub fn describe(&self) -> String {
        match self {
            Self::Http(op) => format!("{} {}", op.method, op.url),
            Self::Sql(op) => format!("{} ({} statements)", op.engine, op.queries.len()),
            Self::Compile(op) => format!("compile with {}", op.compiler),
            Self::Open(op) => format!("open {}", op.target),
            Self::Wait(op) => format!("wait {}ms", op.time),
            Self::WebDeploy(op) => format!("msdeploy -verb:{}", op.verb),
        }
    }
}

/// HTTPリクエスト
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpOperation {
    pub url: String,

    #[serde(default = "default_http_method")]
    pub method: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// タイムアウト（ミリ秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

fn default_http_method() -> String {
    "GET".to_string()
}

/// SQLスクリプトの実行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlOperation {
    /// `mysql`, `sqlite`, `mssql`
    #[serde(default = "default_sql_engine")]
    pub engine: String,

    /// 接続URL（指定された場合は個別の接続情報より優先）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    #[serde(default)]
    pub queries: Vec<String>,
}

fn default_sql_engine() -> String {
    "mysql".to_string()
}

/// ソースのコンパイル
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOperation {
    /// `less`, `typescript`, `uglifyjs`
    pub compiler: String,

    #[serde(default)]
    pub files: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,

    /// コンパイラ実行ファイルの上書き
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,

    /// 出力ディレクトリ（省略時は入力ファイルの隣）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<String>,

    #[serde(default)]
    pub arguments: Vec<String>,
}

/// 外部プログラムやファイルを開く
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOperation {
    pub target: String,

    #[serde(default)]
    pub arguments: Vec<String>,

    /// 終了を待つか
    #[serde(default)]
    pub wait: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

/// 一定時間待機する
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitOperation {
    /// 待機時間（ミリ秒）
    #[serde(default = "default_wait_time")]
    pub time: u64,
}

fn default_wait_time() -> u64 {
    1000
}

/// Web Deploy (msdeploy) の実行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebDeployOperation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,

    #[serde(default = "default_webdeploy_verb")]
    pub verb: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,

    #[serde(default)]
    pub arguments: Vec<String>,
}

fn default_webdeploy_verb() -> String {
    "sync".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_is_open_shorthand() {
        let op = DeployOperation::from_value(&json!("notepad")).unwrap();
        match op {
            DeployOperation::Open(open) => {
                assert_eq!(open.target, "notepad");
                assert!(!open.wait);
            }
            other => panic!("unexpected operation {:?}", other),
        }
    }

    #[test]
    fn test_http_defaults() {
        let op = DeployOperation::from_value(&json!({
            "type": "http",
            "url": "https://example.com/hook"
        }))
        .unwrap();
        assert_eq!(op.kind(), "http");
        assert_eq!(op.describe(), "GET https://example.com/hook");
    }

    #[test]
    fn test_wait_and_sql() {
        let wait = DeployOperation::from_value(&json!({"type": "wait"})).unwrap();
        assert_eq!(wait, DeployOperation::Wait(WaitOperation { time: 1000 }));

        let sql = DeployOperation::from_value(&json!({
            "type": "sql",
            "engine": "sqlite",
            "url": "sqlite::memory:",
            "queries": ["SELECT 1"]
        }))
        .unwrap();
        assert_eq!(sql.kind(), "sql");
    }

    #[test]
    fn test_vscommand_is_rejected() {
        let result = DeployOperation::from_value(&json!({
            "type": "vscommand",
            "command": "workbench.action.files.save"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_webdeploy_tag() {
        let op = DeployOperation::from_value(&json!({
            "type": "webdeploy",
            "source": "contentPath=C:\\site"
        }))
        .unwrap();
        assert_eq!(op.kind(), "webdeploy");
        assert_eq!(op.describe(), "msdeploy -verb:sync");
    }
}
