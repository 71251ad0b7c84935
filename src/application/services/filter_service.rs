use crate::application::services::value_resolver::ValueResolver;
use crate::domain::entities::Package;
use crate::domain::value_objects::platform::{
    current_host_name, current_platform, normalize_host_name, normalize_platform,
};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use thiserror::Error;
use tracing::{debug, warn};

/// フィルタに関するエラー
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FilterError {
    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// 含める/除外するglobパターンの組
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileFilter {
    pub files: Vec<String>,
    pub exclude: Vec<String>,
}

impl FileFilter {
    pub fn new(files: Vec<String>, exclude: Vec<String>) -> Self {
        Self { files, exclude }
    }

    /// パッケージのファイル選択規則から作成
    pub fn from_package(package: &Package) -> Self {
        Self::new(package.files.clone(), package.exclude.clone())
    }
}

/// コンパイル済みのglobフィルタ
///
/// `*` はディレクトリ区切りをまたがず、`**` はまたぐ。ドットファイルも対象。
#[derive(Debug, Clone)]
pub struct GlobFilter {
    include: GlobSet,
    exclude: GlobSet,
}

impl GlobFilter {
    /// フィルタをコンパイル（`files` が空の場合は全てを含める）
    pub fn new(filter: &FileFilter) -> Result<Self, FilterError> {
        let include = if filter.files.is_empty() {
            build_glob_set(&["**".to_string()])?
        } else {
            build_glob_set(&filter.files)?
        };
        let exclude = build_glob_set(&filter.exclude)?;
        Ok(Self { include, exclude })
    }

    /// ワークスペース相対パスが選択されるか（除外が優先）
    pub fn matches(&self, relative_path: &str) -> bool {
        let path = normalize_candidate(relative_path);
        if self.exclude.is_match(&path) {
            return false;
        }
        self.include.is_match(&path)
    }

    /// 選択されたパスだけを順序を保って返す
    pub fn filter_paths<S: AsRef<str>>(&self, paths: &[S]) -> Vec<String> {
        paths
            .iter()
            .map(AsRef::as_ref)
            .filter(|path| self.matches(path))
            .map(str::to_string)
            .collect()
    }
}

/// 一度だけ判定する場合のショートカット
pub fn matches(relative_path: &str, filter: &FileFilter) -> Result<bool, FilterError> {
    Ok(GlobFilter::new(filter)?.matches(relative_path))
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet, FilterError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let normalized = normalize_pattern(pattern);
        if normalized.is_empty() {
            continue;
        }

        let glob = GlobBuilder::new(&normalized)
            .literal_separator(true)
            .build()
            .map_err(|e| FilterError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
        builder.add(glob);
    }

    builder.build().map_err(|e| FilterError::InvalidPattern {
        pattern: patterns.join(", "),
        message: e.to_string(),
    })
}

fn normalize_pattern(pattern: &str) -> String {
    pattern
        .trim()
        .replace('\\', "/")
        .trim_start_matches('/')
        .to_string()
}

fn normalize_candidate(path: &str) -> String {
    let path = path.replace('\\', "/");
    let path = path.trim_start_matches("./").trim_start_matches('/');
    path.to_string()
}

/// `isFor`/`platforms`/`if` を持つ設定項目
pub trait ConditionalItem {
    /// 対象ホスト名（空の場合は全て）
    fn host_names(&self) -> Vec<String>;

    /// 対象プラットフォーム（空の場合は全て）
    fn platforms(&self) -> Vec<String>;

    /// 全て真である必要がある条件式
    fn conditions(&self) -> Vec<String>;
}

impl ConditionalItem for serde_json::Value {
    fn host_names(&self) -> Vec<String> {
        string_list(self.get("isFor"))
    }

    fn platforms(&self) -> Vec<String> {
        string_list(self.get("platforms"))
    }

    fn conditions(&self) -> Vec<String> {
        string_list(self.get("if"))
    }
}

/// 文字列または文字列の配列を読み取る
pub(crate) fn string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    match value {
        Some(serde_json::Value::String(text)) if !text.trim().is_empty() => vec![text.clone()],
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .filter(|text| !text.trim().is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// フィルタ判定に使う実行環境
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterEnvironment {
    pub host_name: String,
    pub platform: String,
}

impl FilterEnvironment {
    pub fn new(host_name: &str, platform: &str) -> Self {
        Self {
            host_name: normalize_host_name(host_name),
            platform: normalize_platform(platform),
        }
    }

    /// 現在のマシンの環境
    pub fn current() -> Self {
        Self::new(&current_host_name(), &current_platform())
    }
}

/// `isFor` で絞り込む
pub fn filter_by_host<T: ConditionalItem>(items: Vec<T>, host_name: &str) -> Vec<T> {
    let host_name = normalize_host_name(host_name);
    items
        .into_iter()
        .filter(|item| {
            let hosts = item.host_names();
            hosts.is_empty()
                || hosts
                    .iter()
                    .any(|candidate| normalize_host_name(candidate) == host_name)
        })
        .collect()
}

/// `platforms` で絞り込む
pub fn filter_by_platform<T: ConditionalItem>(items: Vec<T>, platform: &str) -> Vec<T> {
    let platform = normalize_platform(platform);
    items
        .into_iter()
        .filter(|item| {
            let platforms = item.platforms();
            platforms.is_empty()
                || platforms
                    .iter()
                    .any(|candidate| normalize_platform(candidate) == platform)
        })
        .collect()
}

/// `if` の条件式で絞り込む（評価できない条件は偽として扱う）
pub fn filter_by_conditions<T: ConditionalItem>(items: Vec<T>, resolver: &ValueResolver) -> Vec<T> {
    items
        .into_iter()
        .filter(|item| {
            item.conditions()
                .iter()
                .all(|condition| match resolver.evaluate_condition(condition) {
                    Ok(result) => result,
                    Err(e) => {
                        warn!("Dropping item with failing condition: {}", e);
                        false
                    }
                })
        })
        .collect()
}

/// isFor → platforms → if の順に全てのフィルタを適用
pub fn apply_all<T: ConditionalItem>(
    items: Vec<T>,
    environment: &FilterEnvironment,
    resolver: &ValueResolver,
) -> Vec<T> {
    let before = items.len();
    let items = filter_by_host(items, &environment.host_name);
    let items = filter_by_platform(items, &environment.platform);
    let items = filter_by_conditions(items, resolver);
    debug!(
        "Filters kept {} of {} items (host: {}, platform: {})",
        items.len(),
        before,
        environment.host_name,
        environment.platform
    );
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Value;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn filter(files: &[&str], exclude: &[&str]) -> GlobFilter {
        GlobFilter::new(&FileFilter::new(
            files.iter().map(|s| s.to_string()).collect(),
            exclude.iter().map(|s| s.to_string()).collect(),
        ))
        .unwrap()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let f = filter(&[], &[]);
        for path in ["a.txt", "src/deep/nested/file.rs", ".hidden", "dir/.env"] {
            assert!(f.matches(path), "{} should match", path);
        }
    }

    #[test]
    fn test_exclude_always_wins() {
        let f = filter(&["**/*.log", "*.log"], &["**/*.log"]);
        assert!(!f.matches("b.log"));
        assert!(!f.matches("logs/today.log"));
    }

    #[test]
    fn test_package_exclude_filters_list() {
        let f = filter(&[], &["**/*.log"]);
        assert_eq!(f.filter_paths(&["a.txt", "b.log"]), vec!["a.txt"]);
    }

    #[test]
    fn test_single_star_does_not_cross_directories() {
        let f = filter(&["*.txt"], &[]);
        assert!(f.matches("a.txt"));
        assert!(!f.matches("src/a.txt"));

        let f = filter(&["/src/**/*.txt"], &[]);
        assert!(f.matches("src/a.txt"));
        assert!(f.matches("src/x/y/a.txt"));
    }

    #[test]
    fn test_windows_separators_are_normalized() {
        let f = filter(&["src/*.txt"], &[]);
        assert!(f.matches("src\\a.txt"));
    }

    #[test]
    fn test_invalid_pattern_is_error() {
        let result = GlobFilter::new(&FileFilter::new(vec!["a[".to_string()], vec![]));
        assert!(matches!(result, Err(FilterError::InvalidPattern { .. })));
    }

    #[test]
    fn test_host_and_platform_filters() {
        let items = vec![
            json!({"name": "any"}),
            json!({"name": "mine", "isFor": ["BUILD-BOX"]}),
            json!({"name": "other", "isFor": "elsewhere"}),
            json!({"name": "win", "platforms": ["win32"]}),
            json!({"name": "linux", "platforms": ["Linux"]}),
        ];

        let env = FilterEnvironment::new("build-box", "linux");
        let kept = apply_all(items, &env, &ValueResolver::default());
        let names: Vec<_> = kept.iter().map(|v| v["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["any", "mine", "linux"]);
    }

    #[test]
    fn test_condition_filter() {
        let resolver = ValueResolver::new(vec![Value::text("stage", "prod")]);
        let items = vec![
            json!({"name": "prod", "if": "stage == \"prod\""}),
            json!({"name": "dev", "if": ["stage == \"dev\""]}),
            json!({"name": "broken", "if": "stage =="}),
        ];
        let kept = filter_by_conditions(items, &resolver);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0]["name"], "prod");
    }
}
