use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Enforcement strictness for path containment checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Any resolved path is allowed silently.
    Permissive,
    /// Paths outside the base directory are allowed, but each unique
    /// resolved path gets one security notice.
    #[default]
    Warn,
    /// Paths outside the base directory and allow-list are rejected with a
    /// typed error.
    Strict,
}

/// Configuration for path containment enforcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Root directory all paths are expected to live under.
    pub base_dir: PathBuf,

    /// Directories exempt from base-directory containment. Entries are
    /// fixed once a manager is constructed.
    #[serde(default)]
    pub allowed_dirs: Vec<PathBuf>,

    /// Individual files exempt from base-directory containment.
    #[serde(default)]
    pub allowed_files: Vec<PathBuf>,

    #[serde(default)]
    pub mode: SecurityMode,

    /// Suppresses per-path security notices and the end-of-run summary.
    #[serde(default)]
    pub suppress_warnings: bool,

    /// Controls the consolidated summary line emitted when two or more
    /// distinct paths triggered notices.
    #[serde(default = "default_true")]
    pub warning_summary: bool,
}

fn default_true() -> bool {
    true
}

impl SecurityConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            allowed_dirs: Vec::new(),
            allowed_files: Vec::new(),
            mode: SecurityMode::default(),
            suppress_warnings: false,
            warning_summary: true,
        }
    }

    pub fn with_mode(mut self, mode: SecurityMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn allow_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.allowed_dirs.push(dir.into());
        self
    }

    pub fn allow_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.allowed_files.push(file.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_defaults() {
        let config: SecurityConfig =
            serde_json::from_str(r#"{"base_dir": "/project"}"#).unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/project"));
        assert_eq!(config.mode, SecurityMode::Warn);
        assert!(config.warning_summary);
        assert!(!config.suppress_warnings);
        assert!(config.allowed_dirs.is_empty());
    }

    #[test]
    fn mode_serializes_snake_case() {
        let json = serde_json::to_string(&SecurityMode::Strict).unwrap();
        assert_eq!(json, r#""strict""#);
    }
}
