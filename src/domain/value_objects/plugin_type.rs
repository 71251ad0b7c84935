use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Normalized type tag that binds a target to its transport plugins
///
/// The tag is compared case-insensitively and without surrounding whitespace.
/// An empty tag marks a wildcard plugin that serves every target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub struct PluginType(String);

impl PluginType {
    pub const LOCAL: &'static str = "local";
    pub const ARCHIVE: &'static str = "archive";
    pub const ZIP: &'static str = "zip";
    pub const SFTP: &'static str = "sftp";
    pub const FTP: &'static str = "ftp";
    pub const S3: &'static str = "s3";
    pub const HTTP: &'static str = "http";
    pub const APP: &'static str = "app";
    pub const BATCH: &'static str = "batch";
    pub const TEST: &'static str = "test";

    /// Create a normalized plugin type
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_lowercase())
    }

    /// The wildcard type, matching every target
    pub fn wildcard() -> Self {
        Self(String::new())
    }

    /// Whether this is the wildcard type
    pub fn is_wildcard(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a plugin of this type serves a target of `target_type`
    pub fn serves(&self, target_type: &PluginType) -> bool {
        self.is_wildcard() || self == target_type
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// All type tags served by compiled-in plugins
    pub fn builtin() -> &'static [&'static str] {
        &[
            Self::LOCAL,
            Self::ARCHIVE,
            Self::ZIP,
            Self::SFTP,
            Self::FTP,
            #[cfg(feature = "s3")]
            Self::S3,
            Self::HTTP,
            Self::APP,
            Self::BATCH,
            Self::TEST,
        ]
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_wildcard() {
            write!(f, "*")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for PluginType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<String> for PluginType {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for PluginType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<PluginType> for String {
    fn from(value: PluginType) -> Self {
        value.0
    }
}
