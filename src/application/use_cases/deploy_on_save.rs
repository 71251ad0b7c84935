use super::deploy_files::{DeployFilesUseCase, DeploySummary};
use crate::application::services::filter_service::{FileFilter, GlobFilter};
use crate::common::error::DeployError;
use crate::domain::entities::{normalize_name, Package, Target};
use crate::domain::value_objects::relative_to_workspace;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// 保存されたファイルを、`deployOnSave` が有効なパッケージのターゲットへデプロイするユースケース
pub struct DeployOnSaveUseCase {
    deploy: DeployFilesUseCase,
    packages: Vec<Package>,
}

impl DeployOnSaveUseCase {
    /// 新しいDeployOnSaveUseCaseインスタンスを作成
    pub fn new(deploy: DeployFilesUseCase, packages: Vec<Package>) -> Self {
        Self { deploy, packages }
    }

    pub fn deploy_files(&self) -> &DeployFilesUseCase {
        &self.deploy
    }

    /// 保存されたファイルのデプロイ先（パッケージの宣言順、重複なし）
    pub fn targets_for(&self, file: &Path) -> Vec<Target> {
        let env = self.deploy.environment();
        let file = if file.is_absolute() {
            file.to_path_buf()
        } else {
            env.workspace_root.join(file)
        };
        let Ok(relative) = relative_to_workspace(&file, &env.workspace_root) else {
            debug!("{} is outside the workspace", file.display());
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for package in &self.packages {
            if !package.deploy_on_save.is_enabled() {
                continue;
            }
            match GlobFilter::new(&FileFilter::from_package(package)) {
                Ok(filter) if filter.matches(&relative) => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!("Package '{}': {}", package.name, e);
                    continue;
                }
            }

            for name in package.deploy_on_save.target_names(&package.targets) {
                let wanted = normalize_name(&name);
                if !seen.insert(wanted.clone()) {
                    continue;
                }
                match env.targets.iter().find(|target| target.normalized_name() == wanted) {
                    Some(target) => targets.push(target.clone()),
                    None => warn!("Package '{}' deploys on save to unknown target '{}'", package.name, name),
                }
            }
        }
        targets
    }

    /// 保存イベントを処理する。対象のターゲットがなければ `None`。
    pub async fn on_save(&self, file: &Path) -> Result<Option<DeploySummary>, DeployError> {
        let targets = self.targets_for(file);
        if targets.is_empty() {
            debug!("No package deploys {} on save", file.display());
            return Ok(None);
        }
        self.deploy
            .deploy(&[file.to_path_buf()], &targets)
            .await
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::value_resolver::ValueResolver;
    use crate::application::session::DeploySession;
    use crate::application::use_cases::deploy_files::DeployEnvironment;
    use crate::domain::entities::TargetBinding;
    use crate::infrastructure::plugins::PluginRegistry;
    use std::sync::Arc;

    fn use_case(packages: Vec<Package>) -> DeployOnSaveUseCase {
        let env = DeployEnvironment::new(
            Arc::new(DeploySession::default()),
            Arc::new(PluginRegistry::with_builtin_plugins()),
            "/ws",
            ValueResolver::default(),
            vec![Target::new("Web Server", "test"), Target::new("backup", "test")],
        );
        DeployOnSaveUseCase::new(DeployFilesUseCase::new(env), packages)
    }

    fn package(name: &str, files: &[&str], binding: TargetBinding) -> Package {
        let mut package = Package::new(name);
        package.files = files.iter().map(|f| f.to_string()).collect();
        package.targets = vec!["web server".to_string()];
        package.deploy_on_save = binding;
        package
    }

    #[test]
    fn test_bound_targets() {
        let use_case = use_case(vec![
            package("site", &["**/*.html"], TargetBinding::Enabled(true)),
            package("all", &[], TargetBinding::Targets(vec!["backup".into(), "WEB SERVER".into()])),
            package("off", &["**/*.html"], TargetBinding::Enabled(false)),
        ]);

        let names: Vec<String> = use_case
            .targets_for(Path::new("index.html"))
            .into_iter()
            .map(|target| target.name)
            .collect();
        assert_eq!(names, vec!["Web Server".to_string(), "backup".to_string()]);

        let names: Vec<String> = use_case
            .targets_for(Path::new("/ws/css/site.css"))
            .into_iter()
            .map(|target| target.name)
            .collect();
        assert_eq!(names, vec!["backup".to_string(), "Web Server".to_string()]);
    }

    #[test]
    fn test_unknown_target_and_outside_file() {
        let use_case = use_case(vec![package(
            "site",
            &[],
            TargetBinding::Target("missing".to_string()),
        )]);
        assert!(use_case.targets_for(Path::new("index.html")).is_empty());
        assert!(use_case.targets_for(Path::new("/elsewhere/index.html")).is_empty());
    }

    #[tokio::test]
    async fn test_nothing_to_deploy() {
        let use_case = use_case(Vec::new());
        assert!(use_case.on_save(Path::new("index.html")).await.unwrap().is_none());
    }
}
