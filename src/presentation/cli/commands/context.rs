use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::application::services::resolver_service::{
    ConfigResolver, ConfigResolverConfig, ResolvedConfig,
};
use crate::application::session::DeploySession;
use crate::application::use_cases::DeployEnvironment;
use crate::domain::entities::Target;
use crate::infrastructure::plugins::PluginRegistry;
use crate::presentation::ui::DisplayHelper;

/// Loaded workspace shared by every command
pub struct CommandContext {
    pub workspace_root: PathBuf,
    pub config: ResolvedConfig,
    pub session: Arc<DeploySession>,
    pub registry: Arc<PluginRegistry>,
    pub display: DisplayHelper,
    pub verbose: bool,
}

impl CommandContext {
    /// Resolve the configuration of `workspace_root` (or the given file)
    pub fn load(
        workspace_root: &Path,
        config_file: Option<&Path>,
        display: DisplayHelper,
        verbose: bool,
    ) -> Result<Self> {
        let resolver = ConfigResolver::new(workspace_root, ConfigResolverConfig::default());
        let config = match config_file {
            Some(path) => {
                let path = if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    workspace_root.join(path)
                };
                resolver.load(&path)
            }
            None => resolver.load_workspace(),
        }
        .with_context(|| format!("Failed to load configuration of {}", workspace_root.display()))?;

        debug!(
            "Loaded {} target(s) and {} package(s) from {:?}",
            config.targets.len(),
            config.packages.len(),
            config.source
        );

        Ok(Self {
            workspace_root: workspace_root.to_path_buf(),
            config,
            session: Arc::new(DeploySession::new(Utc::now())),
            registry: Arc::new(PluginRegistry::with_builtin_plugins()),
            display,
            verbose,
        })
    }

    pub fn environment(&self) -> DeployEnvironment {
        DeployEnvironment::from_config(
            &self.config,
            self.workspace_root.clone(),
            Arc::clone(&self.session),
            Arc::clone(&self.registry),
        )
    }

    /// Print the problems found while resolving the configuration
    pub fn report_issues(&self) {
        for issue in &self.config.issues {
            self.display.warning(&issue.to_string());
        }
    }

    /// Cancel the running operation on Ctrl-C
    pub fn cancel_on_ctrl_c(&self) -> JoinHandle<()> {
        let session = Arc::clone(&self.session);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if session.cancel_current() {
                    eprintln!("Cancelling...");
                }
            }
        })
    }

    /// Targets named on the command line
    pub fn targets(&self, names: &[String]) -> Result<Vec<Target>> {
        Ok(self.config.targets_by_names(names)?)
    }

    /// Absolute path of a file named on the command line
    pub fn absolute(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.workspace_root.join(file)
        }
    }
}
