//! Override shapes applied by the external configuration loader.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::file::collect::CollectRequest;

/// Boolean-like override parsing: case-insensitive `true`, `1`, or `yes`
/// enable, anything else disables.
pub fn parse_bool_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Environment-sourced defaults for directory collection. The loader that
/// reads the actual variables lives outside this crate; only the shape and
/// application order are fixed here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectorOverrides {
    /// Overrides the default of `CollectRequest::ignore_gitignore`.
    #[serde(default)]
    pub ignore_gitignore: Option<bool>,

    /// Overrides the default gitignore file location.
    #[serde(default)]
    pub gitignore_file: Option<PathBuf>,
}

impl CollectorOverrides {
    /// Applies the overrides to a request that still carries defaults.
    /// Explicit per-request values are expected to be set after this.
    pub fn apply(&self, request: &mut CollectRequest) {
        if let Some(ignore_gitignore) = self.ignore_gitignore {
            request.ignore_gitignore = ignore_gitignore;
        }
        if let Some(gitignore_file) = &self.gitignore_file {
            request.gitignore_file = Some(gitignore_file.clone());
        }
    }
}
