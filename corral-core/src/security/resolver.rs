//! Symlink resolution with hard resource bounds.
//!
//! Every resolution is a per-call state machine: admission slot, then per
//! hop depth -> time -> op-count checks, then the link is followed. Any
//! violated bound raises a typed error with its own reason code; a partially
//! resolved path is never returned. Admission is reject-not-queue so a
//! flood of resolutions fails fast instead of building a backlog.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::security::error::PathSecurityError;
use crate::security::patterns::{
    alternate_data_stream, control_or_homoglyph, reserved_device_name, Deadline,
};

/// Resource bounds for a [`SymlinkResolver`].
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Maximum symlink hops in a single resolution.
    pub max_depth: usize,
    /// Maximum in-flight resolutions across the process; excess callers are
    /// rejected immediately, never queued.
    pub max_concurrent_requests: usize,
    /// Wall-clock budget per resolution.
    pub max_processing_time: Duration,
    /// Budget of stat/readlink calls per resolution.
    pub max_filesystem_ops: usize,
    /// When set, every call is padded to at least this duration so chain
    /// depth cannot be inferred from response time.
    pub min_response_time: Option<Duration>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_concurrent_requests: 50,
            max_processing_time: Duration::from_secs(5),
            max_filesystem_ops: 200,
            min_response_time: None,
        }
    }
}

/// Running totals across all resolutions, cleared by [`SymlinkResolver::reset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverMetrics {
    pub requests: u64,
    pub filesystem_ops: u64,
}

#[derive(Debug)]
pub struct SymlinkResolver {
    config: ResolverConfig,
    in_flight: Mutex<usize>,
    metrics: Mutex<ResolverMetrics>,
}

impl SymlinkResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            in_flight: Mutex::new(0),
            metrics: Mutex::new(ResolverMetrics::default()),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Fully resolves `candidate` through symlinks under the configured
    /// bounds. Nonexistent trailing components resolve lexically, so a
    /// containment verdict can still be produced for paths yet to be
    /// created.
    pub fn resolve(&self, candidate: &Path) -> Result<PathBuf, PathSecurityError> {
        let started = Instant::now();
        let result = self.resolve_bounded(candidate, started);
        // Rejected calls are padded too; only successful calls pad while
        // holding their slot (inside resolve_bounded).
        self.pad(started);
        result
    }

    /// Convenience check: true when `path` resolves without violating any
    /// bound or shape rule.
    pub fn is_symlink_safe(&self, path: &Path) -> bool {
        self.resolve(path).is_ok()
    }

    pub fn metrics(&self) -> ResolverMetrics {
        *lock(&self.metrics)
    }

    /// Clears the running totals. The in-flight count is live state mirrored
    /// by outstanding slot guards and is left alone.
    pub fn reset(&self) {
        *lock(&self.metrics) = ResolverMetrics::default();
    }

    fn resolve_bounded(
        &self,
        candidate: &Path,
        started: Instant,
    ) -> Result<PathBuf, PathSecurityError> {
        self.validate_shape(candidate)?;
        let _slot = self.admit()?;
        lock(&self.metrics).requests += 1;

        let mut state = ResolutionState {
            config: &self.config,
            candidate,
            depth: 0,
            fs_ops: 0,
            started,
        };
        let result = self.walk_components(candidate, &mut state);
        lock(&self.metrics).filesystem_ops += state.fs_ops as u64;
        // The call is in flight until it returns, so the pad runs while the
        // admission slot is still held.
        self.pad(started);
        result
    }

    fn pad(&self, started: Instant) {
        if let Some(min) = self.config.min_response_time {
            let elapsed = started.elapsed();
            if elapsed < min {
                std::thread::sleep(min - elapsed);
            }
        }
    }

    /// Structural rejection of malformed path shapes before any filesystem
    /// access. Uses the bounded matcher with the resolution time budget;
    /// a matching timeout fails closed as a resolution timeout.
    fn validate_shape(&self, candidate: &Path) -> Result<(), PathSecurityError> {
        let raw = candidate.to_string_lossy();
        if raw.contains('\0') {
            return Err(PathSecurityError::NullByte {
                path: candidate.to_path_buf(),
            });
        }
        if let Some(rest) = raw.strip_prefix(r"\\") {
            let parts = rest.split(['\\', '/']).filter(|p| !p.is_empty()).count();
            if parts < 2 {
                return Err(PathSecurityError::IncompleteUnc {
                    path: candidate.to_path_buf(),
                });
            }
        }

        let deadline = Deadline::after(self.config.max_processing_time);
        let timeout = |_| PathSecurityError::Timeout {
            path: candidate.to_path_buf(),
            budget: self.config.max_processing_time,
        };
        for component in candidate.components() {
            let Component::Normal(name) = component else {
                continue;
            };
            let name = name.to_string_lossy();
            if reserved_device_name()
                .is_match(&name, &deadline)
                .map_err(timeout)?
            {
                return Err(PathSecurityError::ReservedDeviceName {
                    path: candidate.to_path_buf(),
                });
            }
            if alternate_data_stream()
                .is_match(&name, &deadline)
                .map_err(timeout)?
            {
                return Err(PathSecurityError::AlternateDataStream {
                    path: candidate.to_path_buf(),
                });
            }
            if control_or_homoglyph()
                .is_match(&name, &deadline)
                .map_err(timeout)?
            {
                // Matching happens on real bytes, so lookalike characters
                // cannot escape containment; surface them for diagnostics.
                tracing::warn!(
                    component = %name,
                    "path component contains control or homoglyph characters"
                );
            }
        }
        Ok(())
    }

    fn admit(&self) -> Result<SlotGuard<'_>, PathSecurityError> {
        let mut in_flight = lock(&self.in_flight);
        if *in_flight >= self.config.max_concurrent_requests {
            return Err(PathSecurityError::ConcurrencyLimit {
                limit: self.config.max_concurrent_requests,
            });
        }
        *in_flight += 1;
        Ok(SlotGuard { resolver: self })
    }

    fn walk_components(
        &self,
        candidate: &Path,
        state: &mut ResolutionState<'_>,
    ) -> Result<PathBuf, PathSecurityError> {
        let absolute = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            // Callers normally join relative candidates onto a base first;
            // this is a fallback for direct use.
            std::env::current_dir().unwrap_or_default().join(candidate)
        };

        let mut resolved = PathBuf::new();
        let mut pending: VecDeque<OsString> = VecDeque::new();
        enqueue(&mut resolved, &mut pending, &absolute, false);

        while let Some(part) = pending.pop_front() {
            if part == ".." {
                // Applied after earlier components were link-resolved, so
                // `link/..` refers to the link target's parent.
                resolved.pop();
                continue;
            }
            let next = resolved.join(&part);
            state.count_op()?;
            match fs::symlink_metadata(&next) {
                Ok(metadata) if metadata.file_type().is_symlink() => {
                    state.depth += 1;
                    state.check_depth()?;
                    state.count_op()?;
                    // A link we cannot read cannot be fully resolved, so
                    // the call fails rather than returning the link's own
                    // location as the real path.
                    let target = read_target(&next)?;
                    if target.is_absolute() {
                        resolved = PathBuf::new();
                    }
                    enqueue_front(&mut resolved, &mut pending, &target);
                }
                // Nonexistent or plain entries extend the resolved prefix.
                _ => resolved = next,
            }
            state.check_time()?;
        }

        Ok(resolved)
    }
}

/// Per-call counters, bounded by the resolver configuration. Lives for
/// exactly one resolution.
struct ResolutionState<'a> {
    config: &'a ResolverConfig,
    candidate: &'a Path,
    depth: usize,
    fs_ops: usize,
    started: Instant,
}

impl ResolutionState<'_> {
    fn check_depth(&self) -> Result<(), PathSecurityError> {
        if self.depth > self.config.max_depth {
            return Err(PathSecurityError::MaxDepth {
                path: self.candidate.to_path_buf(),
                max_depth: self.config.max_depth,
            });
        }
        Ok(())
    }

    fn check_time(&self) -> Result<(), PathSecurityError> {
        if self.started.elapsed() > self.config.max_processing_time {
            return Err(PathSecurityError::Timeout {
                path: self.candidate.to_path_buf(),
                budget: self.config.max_processing_time,
            });
        }
        Ok(())
    }

    fn count_op(&mut self) -> Result<(), PathSecurityError> {
        self.fs_ops += 1;
        if self.fs_ops > self.config.max_filesystem_ops {
            return Err(PathSecurityError::OpLimit {
                path: self.candidate.to_path_buf(),
                max_ops: self.config.max_filesystem_ops,
            });
        }
        self.check_time()
    }
}

#[derive(Debug)]
struct SlotGuard<'a> {
    resolver: &'a SymlinkResolver,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        *lock(&self.resolver.in_flight) -= 1;
    }
}

fn read_target(link: &Path) -> Result<PathBuf, PathSecurityError> {
    fs::read_link(link).map_err(|e| {
        tracing::warn!(path = %link.display(), error = %e, "failed to read symlink");
        PathSecurityError::UnreadableLink {
            path: link.to_path_buf(),
        }
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Splits `path` into a root prefix on `resolved` and pending components.
fn enqueue(resolved: &mut PathBuf, pending: &mut VecDeque<OsString>, path: &Path, front: bool) {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => resolved.push(prefix.as_os_str()),
            Component::RootDir => resolved.push(std::path::MAIN_SEPARATOR_STR),
            Component::CurDir => {}
            Component::ParentDir => parts.push(OsString::from("..")),
            Component::Normal(name) => parts.push(name.to_os_string()),
        }
    }
    if front {
        for part in parts.into_iter().rev() {
            pending.push_front(part);
        }
    } else {
        pending.extend(parts);
    }
}

/// Queues a symlink target ahead of the remaining components.
fn enqueue_front(resolved: &mut PathBuf, pending: &mut VecDeque<OsString>, target: &Path) {
    enqueue(resolved, pending, target, true);
}
