//! Transport plugins
//!
//! Every plugin implements [`DeployPlugin`] and is registered once in the
//! [`PluginRegistry`]. Settings are read per call from the target's free-form
//! settings into a typed struct of the plugin.

pub mod app;
pub mod archive;
pub mod batch;
pub mod ftp;
pub mod http;
pub mod local;
pub mod plugin_interface;
pub mod plugin_registry;
#[cfg(feature = "s3")]
pub mod s3;
pub mod sftp;

pub use plugin_interface::{
    run_plugin, DeployContext, DeployPlugin, FileCompletion, FileRef, FileTask,
    PluginCapabilities, PluginError, RemoteFileInfo,
};
pub use plugin_registry::{PluginRegistry, TargetPlugins};

use crate::domain::entities::Target;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use validator::Validate;

/// Read and validate the typed settings of a target
pub(crate) fn settings_of<T>(target: &Target) -> Result<T, PluginError>
where
    T: DeserializeOwned + Validate,
{
    let settings: T = target
        .typed_settings()
        .map_err(|e| PluginError::invalid_settings(target, e))?;
    settings
        .validate()
        .map_err(|e| PluginError::invalid_settings(target, e))?;
    Ok(settings)
}

/// Resolve placeholders in a local path setting, relative paths are taken from the workspace root
pub(crate) fn resolve_local_dir(ctx: &DeployContext, dir: &str) -> PathBuf {
    let resolved = PathBuf::from(ctx.values.resolve(dir));
    if resolved.is_absolute() {
        resolved
    } else {
        ctx.workspace_root.join(resolved)
    }
}

/// Join a `/`-separated target path below `base`
pub(crate) fn join_target_path(base: &Path, target_path: &str) -> PathBuf {
    target_path
        .split('/')
        .filter(|part| !part.is_empty())
        .fold(base.to_path_buf(), |path, part| path.join(part))
}

/// Join a remote directory and a `/`-separated target path
pub(crate) fn join_remote_path(dir: &str, target_path: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let target_path = target_path.trim_start_matches('/');
    if dir.is_empty() {
        format!("/{}", target_path)
    } else {
        format!("{}/{}", dir, target_path)
    }
}

pub(crate) fn system_time_to_utc(time: SystemTime) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::<chrono::Utc>::from(time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_target_path() {
        let path = join_target_path(Path::new("/out"), "css/site.css");
        assert_eq!(path, PathBuf::from("/out/css/site.css"));
    }

    #[test]
    fn test_join_remote_path() {
        assert_eq!(join_remote_path("/var/www/", "a/b.txt"), "/var/www/a/b.txt");
        assert_eq!(join_remote_path("", "a.txt"), "/a.txt");
    }
}
