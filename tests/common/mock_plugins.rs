//! Plugins for driving the deploy engine in tests

use async_trait::async_trait;
use mockall::mock;
use multideploy::domain::entities::Target;
use multideploy::domain::value_objects::PluginType;
use multideploy::infrastructure::plugins::{
    DeployContext, DeployPlugin, FileRef, PluginCapabilities, PluginError, RemoteFileInfo,
};
use std::sync::Mutex;

mock! {
    /// Plugin with per-call expectations
    pub Plugin {}

    #[async_trait]
    impl DeployPlugin for Plugin {
        fn plugin_type(&self) -> PluginType;
        fn capabilities(&self) -> PluginCapabilities;

        async fn deploy_file(
            &self,
            file: &FileRef,
            target: &Target,
            ctx: &DeployContext,
        ) -> Result<(), PluginError>;

        async fn pull_file(
            &self,
            file: &FileRef,
            target: &Target,
            ctx: &DeployContext,
        ) -> Result<(), PluginError>;

        async fn get_file_info(
            &self,
            file: &FileRef,
            target: &Target,
            ctx: &DeployContext,
        ) -> Result<RemoteFileInfo, PluginError>;
    }
}

/// Mock serving `plugin_type` with full capabilities
pub fn mock_plugin(plugin_type: &'static str) -> MockPlugin {
    let mut plugin = MockPlugin::new();
    plugin
        .expect_plugin_type()
        .returning(move || PluginType::new(plugin_type));
    plugin
        .expect_capabilities()
        .returning(PluginCapabilities::full);
    plugin
}

/// Records deployed target paths and fails the files whose relative path is listed
pub struct FailingOn {
    plugin_type: &'static str,
    failing: Vec<String>,
    pub deployed: Mutex<Vec<String>>,
}

impl FailingOn {
    pub fn new(plugin_type: &'static str, failing: &[&str]) -> Self {
        Self {
            plugin_type,
            failing: failing.iter().map(|path| path.to_string()).collect(),
            deployed: Mutex::new(Vec::new()),
        }
    }

    /// Plugin that never fails
    pub fn recording(plugin_type: &'static str) -> Self {
        Self::new(plugin_type, &[])
    }

    pub fn deployed(&self) -> Vec<String> {
        self.deployed.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeployPlugin for FailingOn {
    fn plugin_type(&self) -> PluginType {
        PluginType::new(self.plugin_type)
    }

    async fn deploy_file(
        &self,
        file: &FileRef,
        _target: &Target,
        _ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        if self.failing.contains(&file.relative_path) {
            return Err(PluginError::Transfer(format!("refused {}", file.relative_path)));
        }
        self.deployed.lock().unwrap().push(file.target_path.clone());
        Ok(())
    }
}

/// Cancels the running operation right after the first file
pub struct CancelAfterFirst {
    pub deployed: Mutex<Vec<String>>,
}

impl CancelAfterFirst {
    pub fn new() -> Self {
        Self {
            deployed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DeployPlugin for CancelAfterFirst {
    fn plugin_type(&self) -> PluginType {
        PluginType::new(PluginType::TEST)
    }

    async fn deploy_file(
        &self,
        file: &FileRef,
        _target: &Target,
        ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        let mut deployed = self.deployed.lock().unwrap();
        deployed.push(file.relative_path.clone());
        if deployed.len() == 1 {
            ctx.session.cancel_current();
        }
        Ok(())
    }
}
