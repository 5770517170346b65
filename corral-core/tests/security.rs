//! End-to-end behavior of the access-control layer: containment across
//! modes, bounded symlink resolution, deterministic collection, and
//! credential redaction.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use serde_json::json;

use corral_core::{
    CollectRequest, CredentialSanitizer, DirectoryCollector, GitignoreMatcher,
    PathSecurityManager, ResolverConfig, SecurityConfig, SecurityMode, SymlinkResolver,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Workspace {
    _temp: tempfile::TempDir,
    base: PathBuf,
    outside_file: PathBuf,
}

fn workspace() -> Workspace {
    let temp = tempfile::tempdir().unwrap();
    let base = temp.path().join("project");
    fs::create_dir(&base).unwrap();
    fs::write(base.join("readme.md"), "# project").unwrap();
    fs::create_dir(base.join("src")).unwrap();
    fs::write(base.join("src/main.rs"), "fn main() {}").unwrap();

    let outside_file = temp.path().join("outside.txt");
    fs::write(&outside_file, "elsewhere").unwrap();

    Workspace {
        _temp: temp,
        base,
        outside_file,
    }
}

#[test]
fn contained_paths_allowed_in_every_mode() {
    init_tracing();
    let ws = workspace();
    for mode in [
        SecurityMode::Permissive,
        SecurityMode::Warn,
        SecurityMode::Strict,
    ] {
        let manager =
            PathSecurityManager::new(SecurityConfig::new(&ws.base).with_mode(mode)).unwrap();
        assert!(manager.is_path_allowed(&ws.base.join("readme.md")).unwrap());
        assert!(manager
            .is_path_allowed(&ws.base.join("src/main.rs"))
            .unwrap());
    }
}

#[test]
fn outside_paths_per_mode_contract() {
    init_tracing();
    let ws = workspace();

    let strict =
        PathSecurityManager::new(SecurityConfig::new(&ws.base).with_mode(SecurityMode::Strict))
            .unwrap();
    let err = strict.is_path_allowed(&ws.outside_file).unwrap_err();
    assert_eq!(err.reason().code(), "PATH_OUTSIDE_ALLOWLIST");
    let message = err.to_string();
    assert!(message.contains("--allow-dir"));
    assert!(message.contains("--allow-file"));
    assert!(message.contains("--security-mode permissive"));

    let warn =
        PathSecurityManager::new(SecurityConfig::new(&ws.base).with_mode(SecurityMode::Warn))
            .unwrap();
    for _ in 0..5 {
        assert!(warn.is_path_allowed(&ws.outside_file).unwrap());
    }
    // One notice per unique resolved path, however many times it is seen,
    // and a single notice is not enough for the consolidated summary.
    assert_eq!(warn.notice_count(), 1);
    assert!(!warn.log_security_summary());

    let second_outside = ws.outside_file.with_file_name("other_outside.txt");
    fs::write(&second_outside, "elsewhere too").unwrap();
    assert!(warn.is_path_allowed(&second_outside).unwrap());
    assert_eq!(warn.notice_count(), 2);
    assert!(warn.log_security_summary());

    let permissive = PathSecurityManager::new(
        SecurityConfig::new(&ws.base).with_mode(SecurityMode::Permissive),
    )
    .unwrap();
    assert!(permissive.is_path_allowed(&ws.outside_file).unwrap());
    assert_eq!(permissive.notice_count(), 0);
}

#[test]
fn allow_list_overrides_containment_in_strict_mode() {
    init_tracing();
    let ws = workspace();
    let manager = PathSecurityManager::new(
        SecurityConfig::new(&ws.base)
            .with_mode(SecurityMode::Strict)
            .allow_file(&ws.outside_file),
    )
    .unwrap();
    assert!(manager.is_path_allowed(&ws.outside_file).unwrap());
}

#[test]
fn gitignore_ordering_is_strictly_positional() {
    let keep = GitignoreMatcher::from_lines(["*", "!important.log"]);
    assert!(!keep.matches(Path::new("important.log"), false));

    let reignore = GitignoreMatcher::from_lines(["*", "!important.log", "**/*"]);
    assert!(reignore.matches(Path::new("important.log"), false));

    let pyc = GitignoreMatcher::from_lines(["*.pyc"]);
    assert!(pyc.matches(Path::new("x.pyc"), false));
    assert!(!pyc.matches(Path::new("x.py"), false));
}

#[cfg(unix)]
#[test]
fn symlink_depth_bound_is_configuration_driven() {
    init_tracing();
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().canonicalize().unwrap();
    let target = root.join("real.txt");
    fs::write(&target, "x").unwrap();
    std::os::unix::fs::symlink(&target, root.join("l1")).unwrap();
    std::os::unix::fs::symlink(root.join("l1"), root.join("l2")).unwrap();
    std::os::unix::fs::symlink(root.join("l2"), root.join("l3")).unwrap();

    let lenient = SymlinkResolver::new(ResolverConfig::default());
    assert_eq!(lenient.resolve(&root.join("l3")).unwrap(), target);

    let tight = SymlinkResolver::new(ResolverConfig {
        max_depth: 2,
        ..ResolverConfig::default()
    });
    let err = tight.resolve(&root.join("l3")).unwrap_err();
    assert_eq!(err.reason().code(), "SYMLINK_MAX_DEPTH");
}

#[test]
fn third_simultaneous_resolution_is_rejected() {
    init_tracing();
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().canonicalize().unwrap();
    fs::write(root.join("a.txt"), "x").unwrap();

    // The pad keeps the two admitted calls in flight long enough for the
    // third to observe a full gate.
    let resolver = Arc::new(SymlinkResolver::new(ResolverConfig {
        max_concurrent_requests: 2,
        min_response_time: Some(Duration::from_millis(500)),
        ..ResolverConfig::default()
    }));
    let barrier = Arc::new(Barrier::new(3));

    let mut handles = Vec::new();
    for _ in 0..3 {
        let resolver = Arc::clone(&resolver);
        let barrier = Arc::clone(&barrier);
        let path = root.join("a.txt");
        handles.push(std::thread::spawn(move || {
            barrier.wait();
            resolver.resolve(&path)
        }));
    }

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let rejected: Vec<_> = results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .map(|e| e.reason().code())
        .collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
    assert_eq!(rejected, vec!["SYMLINK_CONCURRENCY_LIMIT"]);
}

#[cfg(unix)]
#[test]
fn collection_drops_ignored_and_escaping_entries() {
    init_tracing();
    let ws = workspace();
    fs::write(ws.base.join("third.txt"), "3").unwrap();
    fs::write(ws.base.join("build.log"), "x").unwrap();
    fs::write(ws.base.join("src/debug.log"), "x").unwrap();
    fs::write(ws.base.join(".gitignore"), "*.log\n.gitignore\n").unwrap();
    std::os::unix::fs::symlink(&ws.outside_file, ws.base.join("escape.txt")).unwrap();

    let manager =
        PathSecurityManager::new(SecurityConfig::new(&ws.base).with_mode(SecurityMode::Warn))
            .unwrap();
    let collector = DirectoryCollector::new(&manager);
    let files = collector.collect(&CollectRequest::new(&ws.base)).unwrap();

    let relative: Vec<_> = files
        .iter()
        .map(|f| f.relative_path.to_string_lossy().into_owned())
        .collect();
    // 3 allowed files, 2 gitignored, 1 outside the allow-list: exactly the
    // allowed three remain, sorted.
    assert_eq!(relative, vec!["readme.md", "src/main.rs", "third.txt"]);
}

#[test]
fn collection_is_deterministic() {
    init_tracing();
    let ws = workspace();
    fs::write(ws.base.join("zeta.txt"), "z").unwrap();
    fs::write(ws.base.join("alpha.txt"), "a").unwrap();

    let manager =
        PathSecurityManager::new(SecurityConfig::new(&ws.base).with_mode(SecurityMode::Warn))
            .unwrap();
    let collector = DirectoryCollector::new(&manager);
    let request = CollectRequest::new(&ws.base);

    let first = collector.collect(&request).unwrap();
    let second = collector.collect(&request).unwrap();
    assert_eq!(first, second);
    let sorted: Vec<_> = first.iter().map(|f| f.relative_path.clone()).collect();
    let mut expected = sorted.clone();
    expected.sort();
    assert_eq!(sorted, expected);
}

#[test]
fn sanitizer_redacts_text_and_structured_payloads() {
    let sanitizer = CredentialSanitizer::default();

    let text = sanitizer.sanitize_text("key sk-abcDEF1234567890abcdef leaked");
    assert!(!text.contains("sk-abc"));

    let payload = json!({"api_key": "sk-abcDEF1234567890abcdef", "file": "a.txt"});
    let clean = sanitizer.sanitize_value(&payload);
    assert_eq!(clean["api_key"], json!("[REDACTED]"));
    assert_eq!(clean["file"], json!("a.txt"));
}
