use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("File system operation failed: {message}")]
    FileSystemError {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Configuration error: {message}")]
    ConfigError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Target '{target}' is unknown")]
    UnknownTarget { target: String },

    #[error("Package '{package}' is unknown")]
    UnknownPackage { package: String },

    #[error("Operation before deploying to '{target}' failed: {message}")]
    BeforeDeployFailed { target: String, message: String },

    #[error("Operation cancelled")]
    Cancelled,
}

impl DeployError {
    pub fn filesystem_error_with_source(
        message: impl Into<String>,
        path: Option<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::FileSystemError {
            message: message.into(),
            path,
            source: Some(source),
        }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_error_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ConfigError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn unknown_target(target: impl Into<String>) -> Self {
        Self::UnknownTarget {
            target: target.into(),
        }
    }

    pub fn unknown_package(package: impl Into<String>) -> Self {
        Self::UnknownPackage {
            package: package.into(),
        }
    }

    pub fn before_deploy_failed(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BeforeDeployFailed {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Whether this error only reports a user cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<std::io::Error> for DeployError {
    fn from(error: std::io::Error) -> Self {
        Self::filesystem_error_with_source("File system operation failed", None, error)
    }
}

impl From<serde_json::Error> for DeployError {
    fn from(error: serde_json::Error) -> Self {
        Self::config_error_with_source("Malformed configuration", error)
    }
}
