use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Config store related errors
#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error("No configuration file found in {0}")]
    NotFound(String),

    #[error("Failed to read '{path}': {message}")]
    ReadFailed { path: String, message: String },

    #[error("Failed to parse '{path}': {message}")]
    ParseFailed { path: String, message: String },

    #[error("Unsupported configuration format: {0}")]
    UnsupportedFormat(String),
}

/// File names looked up in the workspace root, in order
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "multideploy.json",
    "multideploy.yaml",
    "multideploy.yml",
    ".multideploy/config.json",
];

/// Document format, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Result<Self, ConfigStoreError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "json" => Ok(Self::Json),
            "yml" | "yaml" => Ok(Self::Yaml),
            _ => Err(ConfigStoreError::UnsupportedFormat(
                path.display().to_string(),
            )),
        }
    }
}

/// Reads configuration documents from disk
#[derive(Debug, Clone, Default)]
pub struct ConfigStore;

impl ConfigStore {
    pub fn new() -> Self {
        Self
    }

    /// Locate the configuration file of a workspace
    pub fn find_config_file(&self, workspace_root: &Path) -> Result<PathBuf, ConfigStoreError> {
        DEFAULT_CONFIG_FILES
            .iter()
            .map(|name| workspace_root.join(name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| ConfigStoreError::NotFound(workspace_root.display().to_string()))
    }

    /// Load a JSON or YAML document as a generic JSON tree
    pub fn load_document(&self, path: &Path) -> Result<serde_json::Value, ConfigStoreError> {
        let format = DocumentFormat::from_path(path)?;
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigStoreError::ReadFailed {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        debug!("Loaded {} bytes from {}", content.len(), path.display());
        self.parse_document(&content, format)
            .map_err(|message| ConfigStoreError::ParseFailed {
                path: path.display().to_string(),
                message,
            })
    }

    /// Parse document text
    pub fn parse_document(
        &self,
        content: &str,
        format: DocumentFormat,
    ) -> Result<serde_json::Value, String> {
        if content.trim().is_empty() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }

        match format {
            DocumentFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            DocumentFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_config_prefers_json() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("multideploy.yaml"), "targets: []").unwrap();
        std::fs::write(dir.path().join("multideploy.json"), "{}").unwrap();

        let store = ConfigStore::new();
        let found = store.find_config_file(dir.path()).unwrap();
        assert!(found.ends_with("multideploy.json"));
    }

    #[test]
    fn test_missing_config() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            ConfigStore::new().find_config_file(dir.path()),
            Err(ConfigStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_load_yaml_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deploy.yml");
        std::fs::write(
            &path,
            "targets:\n  - name: t1\n    type: local\n    dir: /out\n",
        )
        .unwrap();

        let doc = ConfigStore::new().load_document(&path).unwrap();
        assert_eq!(doc["targets"][0]["dir"], "/out");
    }

    #[test]
    fn test_parse_errors_and_formats() {
        let dir = TempDir::new().unwrap();
        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();

        let store = ConfigStore::new();
        assert!(matches!(
            store.load_document(&broken),
            Err(ConfigStoreError::ParseFailed { .. })
        ));
        assert!(matches!(
            store.load_document(&dir.path().join("config.toml")),
            Err(ConfigStoreError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            store.load_document(&dir.path().join("absent.json")),
            Err(ConfigStoreError::ReadFailed { .. })
        ));
    }
}
