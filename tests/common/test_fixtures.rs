//! Scratch workspaces and configurations for integration tests

use multideploy::application::services::{
    ConfigResolver, ConfigResolverConfig, ResolvedConfig, ValueResolver,
};
use multideploy::application::session::DeploySession;
use multideploy::application::use_cases::DeployEnvironment;
use multideploy::domain::entities::Target;
use multideploy::infrastructure::plugins::{DeployPlugin, PluginRegistry};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A temporary workspace directory with helpers to populate it
pub struct WorkspaceFixture {
    pub temp_dir: TempDir,
}

impl WorkspaceFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    /// Write a file (creating parent directories) and return its absolute path
    pub fn write_file(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    pub fn read_file(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).expect("Failed to read file")
    }

    /// Write `multideploy.json` with the given document
    pub fn write_config(&self, document: &serde_json::Value) -> PathBuf {
        let content = serde_json::to_string_pretty(document).expect("Failed to serialize config");
        self.write_file("multideploy.json", &content)
    }

    pub fn resolve(&self) -> ResolvedConfig {
        ConfigResolver::new(self.root(), ConfigResolverConfig::default())
            .load_workspace()
            .expect("Failed to resolve configuration")
    }
}

impl Default for WorkspaceFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry serving only the given plugins
pub fn registry_with(plugins: Vec<Arc<dyn DeployPlugin>>) -> Arc<PluginRegistry> {
    let mut registry = PluginRegistry::new();
    for plugin in plugins {
        registry.register(plugin);
    }
    Arc::new(registry)
}

/// Deploy environment over the fixture with a fresh session
pub fn environment(
    workspace: &WorkspaceFixture,
    registry: Arc<PluginRegistry>,
    targets: Vec<Target>,
) -> DeployEnvironment {
    DeployEnvironment::new(
        Arc::new(DeploySession::default()),
        registry,
        workspace.root().to_path_buf(),
        ValueResolver::with_built_ins(workspace.root(), Vec::new()),
        targets,
    )
}
