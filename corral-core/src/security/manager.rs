//! Mode-based allow/deny façade over the symlink resolver.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;

use crate::security::error::PathSecurityError;
use crate::security::resolver::{ResolverConfig, SymlinkResolver};
use crate::security::types::{SecurityConfig, SecurityMode};

/// Decides whether candidate paths may be exposed to downstream consumers.
///
/// Combines a base directory, an allow-list, and an enforcement mode. All
/// warning state is owned by the instance, so independent managers never
/// leak notices into each other.
pub struct PathSecurityManager {
    config: SecurityConfig,
    base_dir: PathBuf,
    allowed_dirs: Vec<PathBuf>,
    allowed_files: Vec<PathBuf>,
    resolver: SymlinkResolver,
    warned: Mutex<HashSet<PathBuf>>,
}

impl PathSecurityManager {
    pub fn new(config: SecurityConfig) -> anyhow::Result<Self> {
        Self::with_resolver(config, SymlinkResolver::new(ResolverConfig::default()))
    }

    pub fn with_resolver(config: SecurityConfig, resolver: SymlinkResolver) -> anyhow::Result<Self> {
        let base_dir = config
            .base_dir
            .canonicalize()
            .with_context(|| format!("base directory {:?} is not usable", config.base_dir))?;
        // Allow-list entries may not exist yet; canonicalize the ones that do
        // so containment compares resolved paths against resolved roots.
        let allowed_dirs = config
            .allowed_dirs
            .iter()
            .map(|d| d.canonicalize().unwrap_or_else(|_| d.clone()))
            .collect();
        let allowed_files = config
            .allowed_files
            .iter()
            .map(|f| f.canonicalize().unwrap_or_else(|_| f.clone()))
            .collect();
        Ok(Self {
            config,
            base_dir,
            allowed_dirs,
            allowed_files,
            resolver,
            warned: Mutex::new(HashSet::new()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn mode(&self) -> SecurityMode {
        self.config.mode
    }

    pub fn resolver(&self) -> &SymlinkResolver {
        &self.resolver
    }

    /// Applies the configured enforcement mode to `candidate`.
    ///
    /// Resolver bound violations and malformed shapes propagate in every
    /// mode; they indicate attack or exhaustion, not a policy decision.
    pub fn is_path_allowed(&self, candidate: &Path) -> Result<bool, PathSecurityError> {
        let resolved = self.resolve(candidate)?;
        if self.is_contained(&resolved) {
            return Ok(true);
        }
        match self.config.mode {
            SecurityMode::Permissive => Ok(true),
            SecurityMode::Warn => {
                self.warn_once(candidate, &resolved);
                Ok(true)
            }
            SecurityMode::Strict => Err(PathSecurityError::OutsideAllowlist {
                path: resolved,
                base_dir: self.base_dir.clone(),
            }),
        }
    }

    /// Pure containment verdict with no policy side effects. Bulk collection
    /// uses this to drop out-of-bounds entries in every mode.
    pub fn contained(&self, candidate: &Path) -> Result<bool, PathSecurityError> {
        let resolved = self.resolve(candidate)?;
        Ok(self.is_contained(&resolved))
    }

    /// Emits one consolidated line when two or more distinct paths triggered
    /// notices over this manager's lifetime. Silent for zero or one. Returns
    /// whether a summary line was actually emitted.
    pub fn log_security_summary(&self) -> bool {
        if self.config.suppress_warnings || !self.config.warning_summary {
            return false;
        }
        let count = lock(&self.warned).len();
        if count < 2 {
            return false;
        }
        tracing::warn!(
            "Security summary: {count} files outside {} were used this run. \
             Add --allow-dir entries or switch to permissive mode to silence \
             per-file notices.",
            self.base_dir.display()
        );
        true
    }

    /// Number of distinct resolved paths that triggered a notice since
    /// construction or the last reset.
    pub fn notice_count(&self) -> usize {
        lock(&self.warned).len()
    }

    /// Clears the warned-path set; notices will fire again for paths seen
    /// before the reset.
    pub fn reset_warning_tracking(&self) {
        lock(&self.warned).clear();
    }

    fn resolve(&self, candidate: &Path) -> Result<PathBuf, PathSecurityError> {
        let absolute = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.base_dir.join(candidate)
        };
        self.resolver.resolve(&absolute)
    }

    fn is_contained(&self, resolved: &Path) -> bool {
        if resolved.starts_with(&self.base_dir) {
            return true;
        }
        if self.allowed_dirs.iter().any(|dir| resolved.starts_with(dir)) {
            return true;
        }
        self.allowed_files.iter().any(|file| resolved == file)
    }

    fn warn_once(&self, candidate: &Path, resolved: &Path) {
        let first_occurrence = lock(&self.warned).insert(resolved.to_path_buf());
        if !first_occurrence || self.config.suppress_warnings {
            return;
        }
        let hint = origin_hint(resolved)
            .map(|h| format!(" ({h})"))
            .unwrap_or_default();
        let parent = resolved.parent().unwrap_or(resolved);
        tracing::warn!(
            "Security Notice: {} {} is outside {}{hint}. To allow: \
             --allow-dir {} | --allow-file {} | --security-mode permissive",
            candidate.display(),
            resolved.display(),
            self.base_dir.display(),
            parent.display(),
            resolved.display(),
        );
    }
}

/// Best-effort guess at where an out-of-bounds file came from, to make the
/// notice actionable.
fn origin_hint(resolved: &Path) -> Option<&'static str> {
    if let Some(downloads) = dirs::download_dir() {
        if resolved.starts_with(downloads) {
            return Some("looks like a downloaded file");
        }
    }
    if let Some(desktop) = dirs::desktop_dir() {
        if resolved.starts_with(desktop) {
            return Some("looks like a desktop file");
        }
    }
    if resolved.starts_with(std::env::temp_dir()) {
        return Some("looks like a temporary file");
    }
    let shapes = ["downloads", "desktop", "tmp", "temp"];
    for component in resolved.components() {
        let name = component.as_os_str().to_string_lossy().to_lowercase();
        if shapes.contains(&name.as_str()) {
            return Some("lives in a transient location");
        }
    }
    None
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
