use crate::application::services::filter_service::{self, string_list, FilterEnvironment};
use crate::application::services::value_resolver::ValueResolver;
use crate::common::error::DeployError;
use crate::domain::entities::{normalize_name, DeployConfig, Package, Target, Value};
use crate::domain::value_objects::platform::normalize_host_name;
use crate::domain::value_objects::PluginType;
use crate::infrastructure::filesystem::config_store::ConfigStore;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as Json};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 解決処理の過程で使われ、最終的なオブジェクトからは取り除かれるキー
const RESOLVER_KEYS: &[&str] = &[
    "isFor",
    "platforms",
    "if",
    "sortOrder",
    "inheritFrom",
    "loadFrom",
    "applyValuesTo",
];

/// 解決を中断しない設定上の問題
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    /// 問題のある項目（ファイルパスや `target 'name'` など）
    pub subject: String,

    /// 問題の内容
    pub message: String,
}

impl ConfigIssue {
    pub fn new(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.subject, self.message)
    }
}

/// 解決済みの設定スナップショット
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    /// 全体設定（`packages`/`targets`/`values` はインポート後の生の宣言）
    pub settings: DeployConfig,

    /// 解決済みのターゲット（並び替え済み）
    pub targets: Vec<Target>,

    /// 解決済みのパッケージ（並び替え済み）
    pub packages: Vec<Package>,

    /// 設定された値（組み込み値は含まない）
    pub values: Vec<Value>,

    /// 解決中に見つかった問題
    pub issues: Vec<ConfigIssue>,

    /// 読み込んだ設定ファイル
    pub source: Option<PathBuf>,
}

impl ResolvedConfig {
    /// 名前でターゲットを検索（大文字小文字と前後の空白は無視）
    pub fn find_target(&self, name: &str) -> Option<&Target> {
        let name = normalize_name(name);
        self.targets.iter().find(|t| t.normalized_name() == name)
    }

    /// 名前でパッケージを検索
    pub fn find_package(&self, name: &str) -> Option<&Package> {
        let name = normalize_name(name);
        self.packages.iter().find(|p| p.normalized_name() == name)
    }

    /// 名前のリストからターゲットを引く。見つからない名前はエラー。
    pub fn targets_by_names<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Target>, DeployError> {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for name in names {
            let target = self
                .find_target(name.as_ref())
                .ok_or_else(|| DeployError::unknown_target(name.as_ref()))?;
            if seen.insert(target.normalized_name()) {
                targets.push(target.clone());
            }
        }
        Ok(targets)
    }

    /// 名前のリストからターゲットを引く。見つからない名前は警告して無視する。
    pub fn known_targets<S: AsRef<str>>(&self, names: &[S]) -> Vec<Target> {
        let mut seen = HashSet::new();
        names
            .iter()
            .filter_map(|name| {
                let target = self.find_target(name.as_ref());
                if target.is_none() {
                    warn!("Target '{}' is not defined", name.as_ref());
                }
                target
            })
            .filter(|target| seen.insert(target.normalized_name()))
            .cloned()
            .collect()
    }
}

/// ターゲット・パッケージリゾルバの設定
#[derive(Debug, Clone)]
pub struct ConfigResolverConfig {
    /// フィルタ判定に使う実行環境
    pub environment: FilterEnvironment,

    /// インポートと `loadFrom` の最大の入れ子の深さ
    pub max_depth: usize,
}

impl Default for ConfigResolverConfig {
    fn default() -> Self {
        Self {
            environment: FilterEnvironment::current(),
            max_depth: 16,
        }
    }
}

impl ConfigResolverConfig {
    pub fn with_environment(mut self, environment: FilterEnvironment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// 設定ドキュメントから最終的なターゲットとパッケージのリストを作るサービス
pub struct ConfigResolver {
    store: ConfigStore,
    workspace_root: PathBuf,
    config: ConfigResolverConfig,
}

impl ConfigResolver {
    /// 新しいConfigResolverインスタンスを作成
    pub fn new(workspace_root: impl Into<PathBuf>, config: ConfigResolverConfig) -> Self {
        Self {
            store: ConfigStore::new(),
            workspace_root: workspace_root.into(),
            config,
        }
    }

    /// 設定ファイルを読み込んで解決する。メインのファイルが読めない場合のみエラー。
    pub fn load(&self, path: &Path) -> Result<ResolvedConfig, DeployError> {
        let document = self.store.load_document(path).map_err(|e| {
            DeployError::config_error_with_source(format!("Cannot load {}", path.display()), e)
        })?;

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.workspace_root.clone());

        let mut resolved = self.resolve_document(document, &base_dir, Some(path))?;
        resolved.source = Some(path.to_path_buf());
        Ok(resolved)
    }

    /// ワークスペースの既定の設定ファイルを読み込む
    pub fn load_workspace(&self) -> Result<ResolvedConfig, DeployError> {
        let path = self
            .store
            .find_config_file(&self.workspace_root)
            .map_err(|e| DeployError::config_error_with_source("No configuration", e))?;
        self.load(&path)
    }

    /// 読み込み済みのドキュメントを解決する
    pub fn resolve_document(
        &self,
        document: Json,
        base_dir: &Path,
        source: Option<&Path>,
    ) -> Result<ResolvedConfig, DeployError> {
        let mut issues = Vec::new();

        // 1. インポートの適用
        let mut visited = HashSet::new();
        if let Some(source) = source {
            visited.insert(canonical(source));
        }
        let document = self.apply_imports(document, base_dir, &mut visited, 0, &mut issues);

        // 2. 全体設定の読み取り
        let settings: DeployConfig = serde_json::from_value(document)
            .map_err(|e| DeployError::config_error_with_source("Malformed configuration", e))?;

        // 3. 値の準備（条件式は値に依存するため、値にはホストとプラットフォームのみ適用）
        let raw_values = filter_service::filter_by_platform(
            filter_service::filter_by_host(settings.values.clone(), &self.config.environment.host_name),
            &self.config.environment.platform,
        );
        let values: Vec<Value> = raw_values
            .iter()
            .filter_map(|raw| match Value::parse(raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    issues.push(ConfigIssue::new(describe_entry("value", raw), e.to_string()));
                    None
                }
            })
            .collect();
        let resolver = ValueResolver::with_built_ins(&self.workspace_root, values.clone());

        // 4. ターゲットとパッケージの解決
        let targets: Vec<Target> =
            self.resolve_entries("target", &settings.targets, base_dir, &resolver, &mut issues);
        let packages: Vec<Package> =
            self.resolve_entries("package", &settings.packages, base_dir, &resolver, &mut issues);

        for target in &targets {
            if !PluginType::builtin().contains(&target.target_type.as_str()) {
                issues.push(ConfigIssue::new(
                    format!("target '{}'", target.name),
                    format!("unknown plugin type '{}'", target.target_type),
                ));
            }
        }

        for issue in &issues {
            warn!("Configuration issue: {}", issue);
        }
        info!(
            "Resolved {} targets and {} packages",
            targets.len(),
            packages.len()
        );

        Ok(ResolvedConfig {
            settings,
            targets,
            packages,
            values,
            issues,
            source: None,
        })
    }

    /// `imports[]` を再帰的に読み込み、取り込む側のドキュメントの下に統合する
    fn apply_imports(
        &self,
        mut document: Json,
        base_dir: &Path,
        visited: &mut HashSet<PathBuf>,
        depth: usize,
        issues: &mut Vec<ConfigIssue>,
    ) -> Json {
        let imports = match document.as_object_mut().and_then(|doc| doc.remove("imports")) {
            Some(Json::Array(imports)) => imports,
            Some(Json::String(path)) => vec![Json::String(path)],
            _ => return document,
        };

        let imports = filter_service::apply_all(
            imports
                .into_iter()
                .map(|entry| match entry {
                    Json::String(from) => serde_json::json!({ "from": from }),
                    other => other,
                })
                .collect(),
            &self.config.environment,
            &ValueResolver::with_built_ins(&self.workspace_root, Vec::new()),
        );

        for entry in imports {
            let Some(from) = entry.get("from").and_then(Json::as_str) else {
                issues.push(ConfigIssue::new("imports", "entry without 'from'"));
                continue;
            };
            let merge = entry.get("merge").and_then(Json::as_bool).unwrap_or(true);
            let path = base_dir.join(from);

            let Some(imported) = self.load_reference(&path, visited, depth, issues) else {
                continue;
            };
            let imported_dir = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| base_dir.to_path_buf());
            let imported = self.apply_imports(imported, &imported_dir, visited, depth + 1, issues);

            debug!("Importing {} (merge: {})", path.display(), merge);
            document = combine_documents(imported, document, merge);
        }

        document
    }

    /// 参照されたファイルを読み込む。失敗は問題として記録し `None` を返す。
    fn load_reference(
        &self,
        path: &Path,
        visited: &mut HashSet<PathBuf>,
        depth: usize,
        issues: &mut Vec<ConfigIssue>,
    ) -> Option<Json> {
        let subject = path.display().to_string();
        if depth >= self.config.max_depth {
            issues.push(ConfigIssue::new(subject, "nesting is too deep"));
            return None;
        }
        if !visited.insert(canonical(path)) {
            issues.push(ConfigIssue::new(subject, "circular reference ignored"));
            return None;
        }

        match self.store.load_document(path) {
            Ok(document) => Some(document),
            Err(e) => {
                issues.push(ConfigIssue::new(subject, e.to_string()));
                None
            }
        }
    }

    /// loadFrom → inheritFrom → 並び替え → フィルタ → applyValuesTo → 型変換
    fn resolve_entries<T: DeserializeOwned>(
        &self,
        kind: &str,
        raw: &[Json],
        base_dir: &Path,
        resolver: &ValueResolver,
        issues: &mut Vec<ConfigIssue>,
    ) -> Vec<T> {
        let mut entries = Vec::with_capacity(raw.len());
        for entry in raw {
            if !entry.is_object() {
                issues.push(ConfigIssue::new(kind, "entry is not an object"));
                continue;
            }
            let mut visited = HashSet::new();
            entries.push(self.apply_load_from(entry.clone(), base_dir, &mut visited, 0, issues));
        }

        let entries = apply_inheritance(kind, entries, issues);
        let entries = sort_entries(entries, &self.config.environment.host_name);
        let entries = filter_service::apply_all(entries, &self.config.environment, resolver);

        entries
            .into_iter()
            .map(|entry| apply_values_to(entry, resolver))
            .filter_map(|entry| {
                let subject = describe_entry(kind, &entry);
                match serde_json::from_value::<T>(strip_resolver_keys(entry)) {
                    Ok(item) => Some(item),
                    Err(e) => {
                        issues.push(ConfigIssue::new(subject, e.to_string()));
                        None
                    }
                }
            })
            .collect()
    }

    /// `loadFrom` のファイルを基底として統合する（子が優先）
    fn apply_load_from(
        &self,
        mut entry: Json,
        base_dir: &Path,
        visited: &mut HashSet<PathBuf>,
        depth: usize,
        issues: &mut Vec<ConfigIssue>,
    ) -> Json {
        let Some(Json::String(from)) = entry.as_object_mut().and_then(|obj| obj.remove("loadFrom"))
        else {
            return entry;
        };

        let path = base_dir.join(from.trim());
        let Some(base) = self.load_reference(&path, visited, depth, issues) else {
            return entry;
        };
        if !base.is_object() {
            issues.push(ConfigIssue::new(
                path.display().to_string(),
                "referenced document is not an object",
            ));
            return entry;
        }

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| base_dir.to_path_buf());
        let base = self.apply_load_from(base, &base_dir, visited, depth + 1, issues);
        deep_merge(&base, &entry)
    }
}

/// オブジェクトはキーごとに再帰的に統合し、それ以外（配列を含む）は上書きで置き換える
pub fn deep_merge(base: &Json, overlay: &Json) -> Json {
    match (base, overlay) {
        (Json::Object(base_map), Json::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in overlay_map {
                let next = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Json::Object(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}

/// インポートしたドキュメントを取り込む側の下に統合する
///
/// `targets`/`packages`/`values` は連結（インポート側が先）。その他のキーは
/// `merge` が有効なら再帰的に統合し、無効なら存在しないキーのみ補う。
fn combine_documents(imported: Json, document: Json, merge: bool) -> Json {
    let (mut imported, document) = match (imported, document) {
        (Json::Object(imported), Json::Object(document)) => (imported, document),
        (_, document) => return document,
    };

    let mut combined = Map::new();
    for key in ["targets", "packages", "values"] {
        let mut list = take_array(imported.remove(key));
        list.extend(take_array(document.get(key).cloned()));
        combined.insert(key.to_string(), Json::Array(list));
    }

    let mut rest = document;
    for key in ["targets", "packages", "values"] {
        rest.remove(key);
    }

    let merged = if merge {
        deep_merge(&Json::Object(imported), &Json::Object(rest))
    } else {
        let mut shallow = rest;
        for (key, value) in imported {
            shallow.entry(key).or_insert(value);
        }
        Json::Object(shallow)
    };

    if let Json::Object(merged) = merged {
        combined.extend(merged);
    }
    Json::Object(combined)
}

fn take_array(value: Option<Json>) -> Vec<Json> {
    match value {
        Some(Json::Array(items)) => items,
        _ => Vec::new(),
    }
}

/// `inheritFrom` に列挙された兄弟を基底として統合する
fn apply_inheritance(kind: &str, entries: Vec<Json>, issues: &mut Vec<ConfigIssue>) -> Vec<Json> {
    let mut by_name: HashMap<String, usize> = HashMap::new();
    for (index, entry) in entries.iter().enumerate() {
        by_name
            .entry(normalize_name(&entry_name(entry)))
            .or_insert(index);
    }

    let mut cache: HashMap<usize, Json> = HashMap::new();
    (0..entries.len())
        .map(|index| {
            let mut stack = Vec::new();
            resolve_inherited(kind, index, &entries, &by_name, &mut cache, &mut stack, issues)
        })
        .collect()
}

fn resolve_inherited(
    kind: &str,
    index: usize,
    entries: &[Json],
    by_name: &HashMap<String, usize>,
    cache: &mut HashMap<usize, Json>,
    stack: &mut Vec<usize>,
    issues: &mut Vec<ConfigIssue>,
) -> Json {
    if let Some(done) = cache.get(&index) {
        return done.clone();
    }

    let entry = &entries[index];
    let parents = string_list(entry.get("inheritFrom"));
    stack.push(index);

    let mut base = Json::Object(Map::new());
    for parent in &parents {
        let subject = describe_entry(kind, entry);
        let Some(&parent_index) = by_name.get(&normalize_name(parent)) else {
            issues.push(ConfigIssue::new(subject, format!("cannot inherit from unknown '{}'", parent)));
            continue;
        };
        if stack.contains(&parent_index) {
            issues.push(ConfigIssue::new(subject, format!("circular inheritance via '{}'", parent)));
            continue;
        }

        let resolved = resolve_inherited(kind, parent_index, entries, by_name, cache, stack, issues);
        let mut parent_value = resolved;
        if let Some(obj) = parent_value.as_object_mut() {
            // 名前と並び順は継承しない
            obj.remove("name");
            obj.remove("sortOrder");
        }
        base = deep_merge(&base, &parent_value);
    }

    stack.pop();
    let mut merged = deep_merge(&base, entry);
    if let Some(obj) = merged.as_object_mut() {
        obj.remove("inheritFrom");
    }
    cache.insert(index, merged.clone());
    merged
}

/// `sortOrder`（ホストごとのマップ可）→ 名前 → 宣言順で安定ソート
fn sort_entries(entries: Vec<Json>, host_name: &str) -> Vec<Json> {
    let mut keyed: Vec<(f64, String, usize, Json)> = entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            (
                sort_value(entry.get("sortOrder"), host_name),
                normalize_name(&entry_name(&entry)),
                index,
                entry,
            )
        })
        .collect();

    keyed.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.2.cmp(&b.2))
    });
    keyed.into_iter().map(|(_, _, _, entry)| entry).collect()
}

fn sort_value(sort_order: Option<&Json>, host_name: &str) -> f64 {
    match sort_order {
        Some(Json::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Json::Object(per_host)) => {
            let host_name = normalize_host_name(host_name);
            per_host
                .iter()
                .find(|(host, _)| normalize_host_name(host) == host_name)
                .or_else(|| per_host.iter().find(|(host, _)| host.trim().is_empty()))
                .and_then(|(_, value)| value.as_f64())
                .unwrap_or(0.0)
        }
        _ => 0.0,
    }
}

/// `applyValuesTo: { field: template }` を解決してフィールドへ代入する
fn apply_values_to(mut entry: Json, resolver: &ValueResolver) -> Json {
    let Some(Json::Object(assignments)) = entry.as_object_mut().and_then(|obj| obj.remove("applyValuesTo"))
    else {
        return entry;
    };

    if let Some(obj) = entry.as_object_mut() {
        for (field, template) in assignments {
            let value = match template {
                Json::String(text) => Json::String(resolver.resolve(&text)),
                other => other,
            };
            obj.insert(field, value);
        }
    }
    entry
}

fn strip_resolver_keys(mut entry: Json) -> Json {
    if let Some(obj) = entry.as_object_mut() {
        for key in RESOLVER_KEYS {
            obj.remove(*key);
        }
    }
    entry
}

fn entry_name(entry: &Json) -> String {
    entry
        .get("name")
        .and_then(Json::as_str)
        .unwrap_or_default()
        .to_string()
}

fn describe_entry(kind: &str, entry: &Json) -> String {
    let name = entry_name(entry);
    if name.is_empty() {
        format!("{} (unnamed)", kind)
    } else {
        format!("{} '{}'", kind, name)
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
