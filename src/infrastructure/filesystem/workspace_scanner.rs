use crate::application::services::filter_service::{FileFilter, GlobFilter};
use crate::common::error::DeployError;
use crate::common::result::DeployResult;
use crate::domain::entities::Package;
use crate::domain::value_objects::relative_to_workspace;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Enumerates workspace files selected by glob filters
#[derive(Debug, Clone)]
pub struct WorkspaceScanner {
    root: PathBuf,
}

impl WorkspaceScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every file of the workspace matching `filter`, sorted by path
    pub fn scan(&self, filter: &FileFilter) -> DeployResult<Vec<PathBuf>> {
        let globs = GlobFilter::new(filter)
            .map_err(|e| DeployError::config_error_with_source("Invalid file filter", e))?;

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = relative_to_workspace(entry.path(), &self.root) else {
                continue;
            };
            if globs.matches(&relative) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        debug!("Found {} file(s) in {}", files.len(), self.root.display());
        Ok(files)
    }

    /// Files of one package
    pub fn package_files(&self, package: &Package) -> DeployResult<Vec<PathBuf>> {
        self.scan(&FileFilter::from_package(package))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        for file in ["index.html", "css/site.css", "css/vendor/reset.css", ".env", "notes.md"] {
            let path = dir.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, file).unwrap();
        }
        dir
    }

    fn relative(root: &Path, files: Vec<PathBuf>) -> Vec<String> {
        files
            .iter()
            .map(|file| relative_to_workspace(file, root).unwrap())
            .collect()
    }

    #[test]
    fn test_scan_with_include_and_exclude() {
        let ws = workspace();
        let scanner = WorkspaceScanner::new(ws.path());
        let filter = FileFilter::new(
            vec!["**/*.css".to_string(), "*.html".to_string()],
            vec!["css/vendor/**".to_string()],
        );

        let files = relative(ws.path(), scanner.scan(&filter).unwrap());
        assert_eq!(files, vec!["css/site.css", "index.html"]);
    }

    #[test]
    fn test_package_without_files_takes_everything() {
        let ws = workspace();
        let scanner = WorkspaceScanner::new(ws.path());
        let package = Package::new("all").with_exclude(vec!["*.md".to_string()]);

        let files = relative(ws.path(), scanner.package_files(&package).unwrap());
        assert_eq!(files, vec![".env", "css/site.css", "css/vendor/reset.css", "index.html"]);
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let ws = workspace();
        let scanner = WorkspaceScanner::new(ws.path());
        let filter = FileFilter::new(vec!["[".to_string()], Vec::new());
        assert!(matches!(scanner.scan(&filter), Err(DeployError::ConfigError { .. })));
    }
}
