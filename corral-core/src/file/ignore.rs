//! Gitignore-style exclusion rules with strictly positional semantics.
//!
//! Rules are kept in declaration order and every rule is evaluated per
//! path; the verdict belongs to the last rule whose pattern structurally
//! matches. A negation flips an earlier ignore, and a broader rule declared
//! after the negation wins again. There is no specificity grouping.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::security::error::MatchTimeoutError;
use crate::security::patterns::{Deadline, SafePattern};

/// Wall-clock budget for evaluating one path against the whole rule list.
const MATCH_BUDGET: Duration = Duration::from_millis(500);

/// One parsed ignore line in declaration order.
pub struct IgnoreRule {
    pattern: String,
    negated: bool,
    dir_only: bool,
    anchored: bool,
    matcher: SafePattern,
}

impl IgnoreRule {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let (negated, rest) = match line.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        let (dir_only, rest) = match rest.strip_suffix('/') {
            Some(rest) => (true, rest),
            None => (false, rest),
        };
        let (leading_slash, rest) = match rest.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, rest),
        };
        if rest.is_empty() {
            return None;
        }
        // A slash anywhere in the body also anchors the pattern to the root,
        // matching the reference tool.
        let anchored = leading_slash || rest.contains('/');

        let mut regex = String::from("^");
        if !anchored {
            regex.push_str("(?:[^/]*/)*");
        }
        translate_glob(rest, &mut regex);
        regex.push('$');

        let matcher = match SafePattern::new(&regex) {
            Ok(matcher) => matcher,
            Err(e) => {
                tracing::debug!(pattern = line, error = %e, "skipping unparseable ignore rule");
                return None;
            }
        };

        Some(Self {
            pattern: rest.to_string(),
            negated,
            dir_only,
            anchored,
            matcher,
        })
    }

    pub fn is_negation(&self) -> bool {
        self.negated
    }

    pub fn is_directory_only(&self) -> bool {
        self.dir_only
    }

    pub fn is_root_anchored(&self) -> bool {
        self.anchored
    }

    /// Structural match: the path itself, or any ancestor directory (a
    /// matched directory ignores everything beneath it).
    fn hits(&self, path: &str, is_dir: bool, deadline: &Deadline) -> Result<bool, MatchTimeoutError> {
        if self.matcher.is_match(path, deadline)? && (!self.dir_only || is_dir) {
            return Ok(true);
        }
        let mut ancestor = path;
        while let Some(idx) = ancestor.rfind('/') {
            ancestor = &ancestor[..idx];
            if self.matcher.is_match(ancestor, deadline)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl fmt::Debug for IgnoreRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IgnoreRule")
            .field("pattern", &self.pattern)
            .field("negated", &self.negated)
            .field("dir_only", &self.dir_only)
            .field("anchored", &self.anchored)
            .finish()
    }
}

/// Immutable, thread-safe matcher over an ordered rule list.
#[derive(Debug, Default)]
pub struct GitignoreMatcher {
    rules: Vec<IgnoreRule>,
}

impl GitignoreMatcher {
    /// Reads an ignore file. A missing, unreadable, or non-UTF-8 source
    /// yields an empty, inert matcher; ignore files never abort a run.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(source) => Self::from_lines(source.lines()),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "no ignore rules loaded");
                Self::default()
            }
        }
    }

    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let rules = lines.into_iter().filter_map(IgnoreRule::parse).collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[IgnoreRule] {
        &self.rules
    }

    /// Last-match-wins verdict for a path relative to the matcher root.
    /// Deterministic for identical inputs. A matching timeout fails closed:
    /// the path is reported ignored.
    pub fn matches(&self, relative: &Path, is_dir: bool) -> bool {
        if self.rules.is_empty() {
            return false;
        }
        let text = normalize(relative);
        let deadline = Deadline::after(MATCH_BUDGET);

        let mut ignored = false;
        for rule in &self.rules {
            match rule.hits(&text, is_dir, &deadline) {
                Ok(true) => ignored = !rule.negated,
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!(path = %relative.display(), error = %e,
                        "ignore evaluation timed out; excluding path");
                    return true;
                }
            }
        }
        ignored
    }
}

fn normalize(relative: &Path) -> String {
    let text = relative.to_string_lossy().replace('\\', "/");
    text.trim_start_matches("./").trim_matches('/').to_string()
}

/// Translates one glob body into the regex buffer. `*` and `?` never cross
/// a separator; `**` spans segments.
fn translate_glob(glob: &str, out: &mut String) {
    let mut chars = glob.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        out.push_str("(?:[^/]+/)*");
                    } else {
                        out.push_str(".*");
                    }
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == ']' {
                        closed = true;
                        break;
                    }
                    class.push(inner);
                }
                if closed && !class.is_empty() {
                    out.push('[');
                    if let Some(rest) = class.strip_prefix('!') {
                        out.push('^');
                        out.push_str(rest);
                    } else {
                        out.push_str(&class);
                    }
                    out.push(']');
                } else {
                    // Unterminated class matches literally.
                    out.push_str(&regex::escape("["));
                    out.push_str(&regex::escape(&class));
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
}
