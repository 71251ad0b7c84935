use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};
use thiserror::Error;

/// Path mapping errors
#[derive(Debug, Error, PartialEq)]
pub enum MappingError {
    #[error("File '{file}' is not inside the workspace '{root}'")]
    OutsideWorkspace { file: String, root: String },

    #[error("Invalid mapping pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// One source → target rewrite rule of a target
///
/// `source` is either a literal prefix of the workspace-relative path or,
/// with `isRegex`, a regular expression whose captures (`$1`, `${name}`) can
/// be used in `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRule {
    pub source: String,

    #[serde(default)]
    pub target: String,

    #[serde(default)]
    pub is_regex: bool,
}

impl MappingRule {
    pub fn prefix(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            is_regex: false,
        }
    }

    pub fn regex(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            is_regex: true,
        }
    }

    /// Apply this rule, `None` when it does not match
    fn apply(&self, relative_path: &str) -> Result<Option<String>, MappingError> {
        if self.is_regex {
            let re = Regex::new(&self.source).map_err(|e| MappingError::InvalidPattern {
                pattern: self.source.clone(),
                reason: e.to_string(),
            })?;

            if !re.is_match(relative_path) {
                return Ok(None);
            }
            Ok(Some(
                re.replacen(relative_path, 1, self.target.as_str())
                    .into_owned(),
            ))
        } else {
            let source = self.source.trim_start_matches('/');
            Ok(relative_path
                .strip_prefix(source)
                .map(|rest| format!("{}{}", self.target, rest)))
        }
    }
}

/// Map a workspace-relative path through ordered rules, first match wins
///
/// A path no rule matches is returned unchanged.
pub fn map_path(relative_path: &str, rules: &[MappingRule]) -> Result<String, MappingError> {
    for rule in rules {
        if let Some(mapped) = rule.apply(relative_path)? {
            return Ok(normalize_relative(&mapped));
        }
    }
    Ok(normalize_relative(relative_path))
}

/// Compute the `/`-separated path of `file` relative to `root`
pub fn relative_to_workspace(file: &Path, root: &Path) -> Result<String, MappingError> {
    let outside = || MappingError::OutsideWorkspace {
        file: file.display().to_string(),
        root: root.display().to_string(),
    };

    let relative = pathdiff::diff_paths(file, root).ok_or_else(outside)?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return Err(outside()),
        }
    }

    if parts.is_empty() {
        return Err(outside());
    }
    Ok(parts.join("/"))
}

fn normalize_relative(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}
