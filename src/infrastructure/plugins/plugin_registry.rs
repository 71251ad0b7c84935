use super::plugin_interface::{DeployPlugin, PluginCapabilities};
use super::{
    app::AppPlugin, archive::ArchivePlugin, batch::BatchPlugin, ftp::FtpPlugin,
    http::HttpPlugin, local::LocalPlugin, sftp::SftpPlugin, test::TestPlugin,
};
use crate::domain::entities::Target;
use crate::domain::value_objects::PluginType;
use std::sync::Arc;
use tracing::debug;

/// Plugins selected for one target
#[derive(Clone)]
pub struct TargetPlugins {
    pub target: Target,
    pub plugins: Vec<Arc<dyn DeployPlugin>>,
}

/// Fixed set of transport plugins, resolved by target type
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn DeployPlugin>>,
}

impl PluginRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every compiled-in plugin
    pub fn with_builtin_plugins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LocalPlugin::new()));
        registry.register(Arc::new(ArchivePlugin::tar_gz()));
        registry.register(Arc::new(ArchivePlugin::zip()));
        registry.register(Arc::new(SftpPlugin::new()));
        registry.register(Arc::new(FtpPlugin::new()));
        registry.register(Arc::new(HttpPlugin::new()));
        registry.register(Arc::new(AppPlugin::new()));
        registry.register(Arc::new(BatchPlugin::new()));
        registry.register(Arc::new(TestPlugin::new()));
        #[cfg(feature = "s3")]
        registry.register(Arc::new(super::s3::S3Plugin::new()));
        registry
    }

    pub fn register(&mut self, plugin: Arc<dyn DeployPlugin>) {
        debug!("Registering '{}' plugin", plugin.plugin_type());
        self.plugins.push(plugin);
    }

    pub fn plugins(&self) -> &[Arc<dyn DeployPlugin>] {
        &self.plugins
    }

    /// Every plugin serving the type of `target`, wildcard plugins included
    pub fn resolve(&self, target: &Target) -> Vec<Arc<dyn DeployPlugin>> {
        self.plugins
            .iter()
            .filter(|plugin| plugin.plugin_type().serves(&target.target_type))
            .cloned()
            .collect()
    }

    pub fn resolve_plugins(&self, targets: &[Target]) -> Vec<TargetPlugins> {
        targets
            .iter()
            .map(|target| TargetPlugins {
                target: target.clone(),
                plugins: self.resolve(target),
            })
            .collect()
    }

    /// Capabilities of every plugin serving `target`, `None` when nothing serves it
    pub fn capabilities(&self, target: &Target) -> Option<PluginCapabilities> {
        self.resolve(target)
            .iter()
            .map(|plugin| plugin.capabilities())
            .reduce(PluginCapabilities::union)
    }

    /// Whether any plugin serves `plugin_type`
    pub fn supports(&self, plugin_type: &PluginType) -> bool {
        self.plugins
            .iter()
            .any(|plugin| plugin.plugin_type().serves(plugin_type))
    }
}
