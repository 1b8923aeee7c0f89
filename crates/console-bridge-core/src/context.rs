//! Project context used to rank tabs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Caller-supplied hints about the project being debugged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionContext {
    /// URL patterns (regex, or substring if not a valid regex).
    #[serde(default)]
    pub url_patterns: Vec<String>,
    /// Working directory of the project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
    /// Expected dev-server ports.
    #[serde(default)]
    pub ports: Vec<u16>,
    /// Expected hosts.
    #[serde(default)]
    pub domains: Vec<String>,
}

impl SuggestionContext {
    /// Create a context with just a working directory.
    #[must_use]
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: Some(working_directory.into()),
            ..Self::default()
        }
    }

    /// Lowercase project name derived from the working directory.
    #[must_use]
    pub fn project_name(&self) -> Option<String> {
        self.working_directory.as_deref().and_then(project_name)
    }
}

/// Final path segment of `dir`, lowercased.
#[must_use]
pub fn project_name(dir: &Path) -> Option<String> {
    dir.file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .filter(|name| !name.is_empty())
}
