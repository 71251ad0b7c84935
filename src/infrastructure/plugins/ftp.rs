use super::plugin_interface::{
    DeployContext, DeployPlugin, FileRef, PluginCapabilities, PluginError, RemoteFileInfo,
};
use super::settings_of;
use crate::application::services::value_resolver::ValueResolver;
use crate::domain::entities::Target;
use crate::domain::value_objects::PluginType;
use crate::infrastructure::process::{CommandExecutor, ExecutionConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;
use url::Url;
use validator::Validate;

/// curl exit codes meaning the remote file does not exist
const CURL_FILE_NOT_FOUND: [i32; 2] = [19, 78];

/// Settings of an `ftp` target
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FtpSettings {
    #[validate(length(min = 1))]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Remote root directory, relative paths start at the login directory
    #[serde(default = "default_dir")]
    pub dir: String,

    /// Require TLS (explicit FTPS)
    #[serde(default)]
    pub secure: bool,

    /// Connection timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

fn default_port() -> u16 {
    21
}

fn default_dir() -> String {
    "/".to_string()
}

impl FtpSettings {
    /// Remote path of a file as shown to the user
    fn remote_path(&self, values: &ValueResolver, file: &FileRef) -> String {
        let dir = values.resolve(&self.dir);
        let parts: Vec<&str> = dir
            .split('/')
            .chain(file.target_path.split('/'))
            .filter(|part| !part.is_empty())
            .collect();
        if dir.starts_with('/') {
            format!("/{}", parts.join("/"))
        } else {
            parts.join("/")
        }
    }

    /// URL of a file
    ///
    /// An absolute path gets a leading `%2F` segment. Without it the path is
    /// taken relative to the login directory.
    fn file_url(&self, values: &ValueResolver, file: &FileRef) -> Result<Url, PluginError> {
        let base = format!("ftp://{}:{}/", values.resolve(&self.host), self.port);
        let mut url = Url::parse(&base)
            .map_err(|e| PluginError::Transfer(format!("invalid FTP address '{}': {}", base, e)))?;

        let remote_path = self.remote_path(values, file);
        let mut parts: Vec<String> = remote_path
            .split('/')
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();
        if remote_path.starts_with('/') {
            if let Some(first) = parts.first_mut() {
                // Encoded as %2F by the segment setter
                first.insert(0, '/');
            }
        }
        url.path_segments_mut()
            .map_err(|_| PluginError::Transfer(format!("'{}' cannot hold a path", base)))?
            .clear()
            .extend(&parts);
        Ok(url)
    }

    fn curl_args(&self) -> Vec<String> {
        let mut args = vec!["--silent".to_string(), "--show-error".to_string()];
        if self.secure {
            args.push("--ssl-reqd".to_string());
        }
        if let Some(timeout) = self.timeout {
            args.push("--connect-timeout".to_string());
            args.push(timeout.to_string());
        }
        if self.user.is_some() {
            args.push("--config".to_string());
            args.push("-".to_string());
        }
        args
    }

    /// curl config read from stdin, keeps the password off the command line
    fn curl_config(&self, values: &ValueResolver) -> Option<String> {
        let user = values.resolve(self.user.as_ref()?);
        let password = self
            .password
            .as_deref()
            .map(|password| values.resolve(password))
            .unwrap_or_default();
        Some(format!(
            "user = \"{}\"\n",
            escape_config_value(&format!("{}:{}", user, password))
        ))
    }

    fn execution_config(&self, values: &ValueResolver, ctx: &DeployContext) -> ExecutionConfig {
        let config = ExecutionConfig::new().with_cancellation(ctx.cancellation.clone());
        match self.curl_config(values) {
            Some(input) => config.with_stdin(input),
            None => config,
        }
    }
}

/// Escape a double quoted curl config value
fn escape_config_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Transfers files with the system `curl` client
#[derive(Debug, Default)]
pub struct FtpPlugin;

impl FtpPlugin {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeployPlugin for FtpPlugin {
    fn plugin_type(&self) -> PluginType {
        PluginType::new(PluginType::FTP)
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities::full()
    }

    async fn deploy_file(
        &self,
        file: &FileRef,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        let settings: FtpSettings = settings_of(target)?;
        let values = ctx.file_values(file, target);
        let url = settings.file_url(&values, file)?;

        debug!("Uploading {} -> {}", file.local_path.display(), url);
        let mut args = settings.curl_args();
        args.push("--ftp-create-dirs".to_string());
        args.push("--upload-file".to_string());
        args.push(file.local_path.display().to_string());
        args.push(url.to_string());

        CommandExecutor::execute_checked("curl", &args, &settings.execution_config(&values, ctx)).await?;
        Ok(())
    }

    async fn pull_file(
        &self,
        file: &FileRef,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        let settings: FtpSettings = settings_of(target)?;
        let values = ctx.file_values(file, target);
        let url = settings.file_url(&values, file)?;

        debug!("Downloading {} -> {}", url, file.local_path.display());
        let mut args = settings.curl_args();
        args.push("--create-dirs".to_string());
        args.push("--output".to_string());
        args.push(file.local_path.display().to_string());
        args.push(url.to_string());

        CommandExecutor::execute_checked("curl", &args, &settings.execution_config(&values, ctx)).await?;
        Ok(())
    }

    async fn get_file_info(
        &self,
        file: &FileRef,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<RemoteFileInfo, PluginError> {
        let settings: FtpSettings = settings_of(target)?;
        let values = ctx.file_values(file, target);
        let url = settings.file_url(&values, file)?;
        let remote_path = settings.remote_path(&values, file);

        let mut args = settings.curl_args();
        args.push("--head".to_string());
        args.push(url.to_string());

        let result =
            CommandExecutor::execute_program("curl", &args, &settings.execution_config(&values, ctx)).await?;
        if CURL_FILE_NOT_FOUND.contains(&result.exit_code) {
            return Ok(RemoteFileInfo::missing(remote_path));
        }
        let result = result.into_success("curl")?;
        Ok(parse_head_output(&result.stdout, &remote_path))
    }
}

/// Read `Last-Modified` and `Content-Length` from `curl --head` output
fn parse_head_output(output: &str, path: &str) -> RemoteFileInfo {
    let mut modify_time = None;
    let mut size = None;

    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "last-modified" => {
                modify_time = DateTime::parse_from_rfc2822(value)
                    .ok()
                    .map(|time| time.with_timezone(&Utc));
            }
            "content-length" => size = value.parse().ok(),
            _ => {}
        }
    }

    RemoteFileInfo::found(path, modify_time, size)
}
