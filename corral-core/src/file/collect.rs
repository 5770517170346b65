//! Bulk directory collection with security, glob, extension, and gitignore
//! filtering. Output is sorted so repeated runs over an unchanged tree are
//! byte-identical across platforms.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use globset::GlobBuilder;
use walkdir::WalkDir;

use crate::file::ignore::GitignoreMatcher;
use crate::security::manager::PathSecurityManager;

/// A file cleared for downstream use. Excluded entries never appear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub absolute_path: PathBuf,
    pub relative_path: PathBuf,
    pub size: u64,
}

/// One directory-collection request.
#[derive(Debug, Clone)]
pub struct CollectRequest {
    pub directory: PathBuf,
    pub recursive: bool,
    /// Optional glob filter. Patterns without a separator match file names;
    /// patterns with one match the path relative to `directory`.
    pub pattern: Option<String>,
    /// Disables gitignore filtering entirely.
    pub ignore_gitignore: bool,
    /// Ignore-file to use instead of `directory/.gitignore`.
    pub gitignore_file: Option<PathBuf>,
    /// When set, only files with one of these extensions are collected.
    pub allowed_extensions: Option<Vec<String>>,
}

impl CollectRequest {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            recursive: true,
            pattern: None,
            ignore_gitignore: false,
            gitignore_file: None,
            allowed_extensions: None,
        }
    }
}

/// Walks a directory and produces the filtered, deterministic descriptor
/// list. Entries failing containment are dropped silently; resolver
/// exhaustion aborts the whole collection.
pub struct DirectoryCollector<'a> {
    security: &'a PathSecurityManager,
}

impl<'a> DirectoryCollector<'a> {
    pub fn new(security: &'a PathSecurityManager) -> Self {
        Self { security }
    }

    pub fn collect(&self, request: &CollectRequest) -> Result<Vec<FileDescriptor>> {
        let directory = &request.directory;
        if !directory.exists() {
            bail!("Directory not found: {}", directory.display());
        }
        if !directory.is_dir() {
            bail!("Path is not a directory: {}", directory.display());
        }

        let ignore = if request.ignore_gitignore {
            GitignoreMatcher::default()
        } else {
            let ignore_path = request
                .gitignore_file
                .clone()
                .unwrap_or_else(|| directory.join(".gitignore"));
            GitignoreMatcher::load(&ignore_path)
        };

        let glob = match &request.pattern {
            Some(pattern) => {
                let matcher = GlobBuilder::new(pattern)
                    .literal_separator(pattern.contains('/'))
                    .build()
                    .with_context(|| format!("invalid glob pattern: {pattern}"))?
                    .compile_matcher();
                Some((matcher, pattern.contains('/')))
            }
            None => None,
        };

        let extensions: Option<Vec<String>> = request.allowed_extensions.as_ref().map(|exts| {
            exts.iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect()
        });

        let max_depth = if request.recursive { usize::MAX } else { 1 };
        let mut excluded_by_gitignore = 0usize;
        let mut files = Vec::new();

        let walker = WalkDir::new(directory)
            .max_depth(max_depth)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.file_name().to_string_lossy() != ".git");

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read directory entry");
                    continue;
                }
            };
            let path = entry.path();
            if entry.file_type().is_dir() {
                continue;
            }

            match self.security.contained(path) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(path = %path.display(), "dropping entry outside allowed roots");
                    continue;
                }
                Err(e) if e.is_resource_exhaustion() => {
                    return Err(e).context("collection aborted by resolver bound");
                }
                Err(e) => {
                    tracing::debug!(path = %path.display(), reason = e.reason().code(),
                        "dropping malformed entry");
                    continue;
                }
            }

            let relative = match path.strip_prefix(directory) {
                Ok(relative) => relative,
                Err(_) => continue,
            };

            if let Some((matcher, match_full_path)) = &glob {
                let candidate: &Path = if *match_full_path {
                    relative
                } else {
                    Path::new(entry.file_name())
                };
                if !matcher.is_match(candidate) {
                    continue;
                }
            }

            if let Some(extensions) = &extensions {
                let ext = path
                    .extension()
                    .map(|e| e.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                if !extensions.contains(&ext) {
                    continue;
                }
            }

            if ignore.matches(relative, false) {
                excluded_by_gitignore += 1;
                continue;
            }

            // Re-validate at the last moment; the tree may have changed
            // since the walk saw this entry.
            let metadata = match std::fs::metadata(path) {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "entry vanished mid-walk");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }

            files.push(FileDescriptor {
                absolute_path: path.to_path_buf(),
                relative_path: relative.to_path_buf(),
                size: metadata.len(),
            });
        }

        if !request.ignore_gitignore && excluded_by_gitignore > 0 {
            tracing::info!(
                "{excluded_by_gitignore} entries excluded by gitignore rules \
                 (pass --no-gitignore to include them)"
            );
        }

        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(files)
    }
}
