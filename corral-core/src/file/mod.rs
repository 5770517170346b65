//! Filtered, security-checked file discovery.
//!
//! `ignore.rs` holds the ordered gitignore rule engine; `collect.rs` walks
//! directories through the path security manager and produces descriptor
//! lists for the attachment layer; `config.rs` carries the override shapes
//! an external configuration loader applies.

use std::path::Path;

use crate::file::collect::FileDescriptor;

pub mod collect;
pub mod config;
pub mod ignore;

/// Narrow capability interface the templating/attachment layer consumes.
/// Anything with a path, a size, and readable content qualifies; tests can
/// implement it on plain structs without touching the filesystem.
pub trait FileSource {
    fn path(&self) -> &Path;
    fn size(&self) -> u64;
    fn content(&self) -> anyhow::Result<String>;
}

impl FileSource for FileDescriptor {
    fn path(&self) -> &Path {
        &self.absolute_path
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn content(&self) -> anyhow::Result<String> {
        use anyhow::Context;
        std::fs::read_to_string(&self.absolute_path)
            .with_context(|| format!("Failed to read file: {}", self.absolute_path.display()))
    }
}
