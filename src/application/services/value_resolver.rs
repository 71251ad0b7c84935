use crate::domain::entities::Value;
use crate::domain::value_objects::platform::current_host_name;
use regex::Regex;
use std::collections::BTreeMap;
use std::error::Error as _;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, warn};

/// 値の解決に関するエラー
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValueError {
    #[error("Failed to evaluate value '{name}': {message}")]
    Evaluation { name: String, message: String },

    #[error("Failed to read value '{name}' from '{path}': {message}")]
    FileRead {
        name: String,
        path: String,
        message: String,
    },

    #[error("Invalid condition '{expression}': {message}")]
    Condition { expression: String, message: String },
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([^{}]*)\}").expect("valid placeholder pattern")
    })
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier pattern")
    })
}

/// `${name | fmt ...}` 形式のプレースホルダを値で置換するサービス
///
/// 値は先頭から検索され、最初に名前が一致したものが使われる。
#[derive(Debug, Clone, Default)]
pub struct ValueResolver {
    /// 優先度順の値
    values: Vec<Value>,

    /// `File` 値の相対パスの基準
    base_dir: Option<PathBuf>,
}

impl ValueResolver {
    /// 新しいValueResolverインスタンスを作成
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values,
            base_dir: None,
        }
    }

    /// 設定された値の後ろに組み込み値を加えて作成
    pub fn with_built_ins(workspace_root: &Path, configured: Vec<Value>) -> Self {
        let mut values = configured;
        values.extend(built_in_values(workspace_root));
        Self {
            values,
            base_dir: Some(workspace_root.to_path_buf()),
        }
    }

    /// 追加の値を先頭に置いた新しいリゾルバを返す
    pub fn with_values(&self, extra: Vec<Value>) -> Self {
        let mut values = extra;
        values.extend(self.values.iter().cloned());
        Self {
            values,
            base_dir: self.base_dir.clone(),
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// 名前で値を検索（大文字小文字は区別しない）
    pub fn find(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|value| value.matches_name(name))
    }

    /// テンプレートを解決する。評価に失敗したトークンはそのまま残す。
    pub fn resolve(&self, template: &str) -> String {
        self.substitute(template, |name, error| {
            warn!("Keeping placeholder '{}' unresolved: {}", name, error);
        })
    }

    /// テンプレートを解決する。値の評価失敗はエラーとして返す。
    pub fn try_resolve(&self, template: &str) -> Result<String, ValueError> {
        let mut first_error = None;
        let resolved = self.substitute(template, |_, error| {
            if first_error.is_none() {
                first_error = Some(error.clone());
            }
        });

        match first_error {
            Some(error) => Err(error),
            None => Ok(resolved),
        }
    }

    fn substitute<F>(&self, template: &str, mut on_error: F) -> String
    where
        F: FnMut(&str, &ValueError),
    {
        if !template.contains("${") {
            return template.to_string();
        }

        placeholder_pattern()
            .replace_all(template, |caps: &regex::Captures<'_>| {
                let token = &caps[0];
                let mut parts = caps[1].split('|').map(str::trim);
                let name = parts.next().unwrap_or_default();
                if name.is_empty() {
                    return token.to_string();
                }

                let Some(value) = self.find(name) else {
                    return token.to_string();
                };

                match self.value_of(value) {
                    Ok(Some(text)) => parts.fold(text, |acc, formatter| apply_formatter(acc, formatter)),
                    Ok(None) => token.to_string(),
                    Err(error) => {
                        on_error(name, &error);
                        token.to_string()
                    }
                }
            })
            .into_owned()
    }

    /// 値の文字列表現（環境変数が存在しない場合は `None`）
    pub fn value_of(&self, value: &Value) -> Result<Option<String>, ValueError> {
        match value {
            Value::Static { value, .. } => Ok(Some(json_to_text(value))),
            Value::BuiltIn { value, .. } => Ok(Some(value.clone())),
            Value::Env { name, .. } => Ok(std::env::var(name.trim()).ok()),
            Value::File { name, path } => {
                let path = self.resolve(path);
                let full_path = match &self.base_dir {
                    Some(base) => base.join(&path),
                    None => PathBuf::from(&path),
                };
                std::fs::read_to_string(&full_path)
                    .map(Some)
                    .map_err(|e| ValueError::FileRead {
                        name: name.clone(),
                        path: full_path.display().to_string(),
                        message: e.to_string(),
                    })
            }
            Value::Code { name, code } => {
                let template = format!("{{{{ {} }}}}", code);
                self.render(&template)
                    .map(Some)
                    .map_err(|message| ValueError::Evaluation {
                        name: name.clone(),
                        message,
                    })
            }
        }
    }

    /// 条件式を評価する
    pub fn evaluate_condition(&self, expression: &str) -> Result<bool, ValueError> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Ok(true);
        }

        let template = format!("{{% if {} %}}true{{% else %}}false{{% endif %}}", expression);
        let rendered = self.render(&template).map_err(|message| ValueError::Condition {
            expression: expression.to_string(),
            message,
        })?;
        debug!("Condition '{}' evaluated to {}", expression, rendered);
        Ok(rendered.trim() == "true")
    }

    fn render(&self, template: &str) -> Result<String, String> {
        let context = self.code_context();
        let mut tera = tera::Tera::default();
        tera.render_str(template, &context).map_err(|e| {
            let mut message = e.to_string();
            let mut source = e.source();
            while let Some(inner) = source {
                message = format!("{}: {}", message, inner);
                source = inner.source();
            }
            message
        })
    }

    /// 式から参照できる値（式の値自体は含めない）
    fn code_context(&self) -> tera::Context {
        let mut context = tera::Context::new();
        let mut all = BTreeMap::new();

        // 優先度の低いものから挿入し、先頭の値が残るようにする
        for value in self.values.iter().rev().filter(|v| !v.is_code()) {
            let text = match self.value_of(value) {
                Ok(Some(text)) => text,
                _ => continue,
            };
            let name = value.name().trim().to_string();
            if identifier_pattern().is_match(&name) {
                context.insert(name.as_str(), &text);
            }
            all.insert(name, text);
        }

        context.insert("values", &all);
        context
    }
}

/// 書式指定子を適用（未知のものは無視）
fn apply_formatter(text: String, formatter: &str) -> String {
    match formatter.to_lowercase().as_str() {
        "" => text,
        "trim" => text.trim().to_string(),
        "upper" => text.to_uppercase(),
        "lower" => text.to_lowercase(),
        "surround" => format!("\"{}\"", text),
        "leading_space" => {
            if text.is_empty() {
                text
            } else {
                format!(" {}", text)
            }
        }
        other => {
            debug!("Ignoring unknown formatter '{}'", other);
            text
        }
    }
}

fn json_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// 実行環境から取得する組み込み値
pub fn built_in_values(workspace_root: &Path) -> Vec<Value> {
    let env_first = |names: &[&str]| {
        names
            .iter()
            .find_map(|name| std::env::var(name).ok())
            .unwrap_or_default()
    };

    let cwd = std::env::current_dir()
        .map(|dir| dir.display().to_string())
        .unwrap_or_default();
    let eol = if cfg!(windows) { "\r\n" } else { "\n" };

    vec![
        Value::built_in("cwd", cwd),
        Value::built_in("EOL", eol),
        Value::built_in("homeDir", env_first(&["HOME", "USERPROFILE"])),
        Value::built_in("hostName", current_host_name()),
        Value::built_in("tempDir", std::env::temp_dir().display().to_string()),
        Value::built_in("workspaceRoot", workspace_root.display().to_string()),
        Value::built_in("user", env_first(&["USER", "USERNAME"])),
        Value::built_in("timestamp", chrono::Utc::now().to_rfc3339()),
    ]
}
