//! Bounded-time text matching primitives.
//!
//! Two lines of defense against pathological inputs: patterns are compiled
//! through a linear-time engine with hard size caps, and every match call
//! carries an explicit [`Deadline`]. Budget exhaustion surfaces as
//! [`MatchTimeoutError`], never as "no match".

use std::borrow::Cow;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::{Regex, RegexBuilder};

use crate::security::error::MatchTimeoutError;

/// Compiled NFA/DFA size caps. A pattern that blows past these is rejected
/// at construction instead of being allowed to chew memory at match time.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Inputs larger than this are rejected outright (fail closed) rather than
/// matched; none of our call sites legitimately feed larger haystacks.
const MAX_HAYSTACK_BYTES: usize = 4 << 20;

/// Wall-clock budget for a single matching unit of work.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    end: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            end: Instant::now() + budget,
            budget,
        }
    }

    pub fn check(&self) -> Result<(), MatchTimeoutError> {
        if Instant::now() >= self.end {
            return Err(MatchTimeoutError {
                budget: self.budget,
            });
        }
        Ok(())
    }

    fn exhausted(&self) -> MatchTimeoutError {
        MatchTimeoutError {
            budget: self.budget,
        }
    }
}

/// A pattern safe to run against untrusted input.
#[derive(Debug, Clone)]
pub struct SafePattern {
    regex: Regex,
}

impl SafePattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern)
            .size_limit(REGEX_SIZE_LIMIT)
            .dfa_size_limit(REGEX_SIZE_LIMIT)
            .build()?;
        Ok(Self { regex })
    }

    pub fn is_match(&self, haystack: &str, deadline: &Deadline) -> Result<bool, MatchTimeoutError> {
        self.admit(haystack, deadline)?;
        Ok(self.regex.is_match(haystack))
    }

    /// Returns the first matching span, used to pull structured blocks out
    /// of free-form text.
    pub fn find<'h>(
        &self,
        haystack: &'h str,
        deadline: &Deadline,
    ) -> Result<Option<&'h str>, MatchTimeoutError> {
        self.admit(haystack, deadline)?;
        Ok(self.regex.find(haystack).map(|m| m.as_str()))
    }

    pub fn replace_all<'h>(
        &self,
        haystack: &'h str,
        replacement: &str,
        deadline: &Deadline,
    ) -> Result<Cow<'h, str>, MatchTimeoutError> {
        self.admit(haystack, deadline)?;
        Ok(self.regex.replace_all(haystack, replacement))
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    fn admit(&self, haystack: &str, deadline: &Deadline) -> Result<(), MatchTimeoutError> {
        deadline.check()?;
        if haystack.len() > MAX_HAYSTACK_BYTES {
            return Err(deadline.exhausted());
        }
        Ok(())
    }
}

fn compiled(cell: &'static OnceLock<SafePattern>, pattern: &str) -> &'static SafePattern {
    cell.get_or_init(|| {
        SafePattern::new(pattern).unwrap_or_else(|e| panic!("builtin pattern {pattern:?}: {e}"))
    })
}

/// Windows reserved device names, matched per path component. `CON.txt` is
/// just as reserved as `CON`.
pub(crate) fn reserved_device_name() -> &'static SafePattern {
    static CELL: OnceLock<SafePattern> = OnceLock::new();
    compiled(&CELL, r"(?i)^(CON|PRN|AUX|NUL|COM[1-9]|LPT[1-9])(\..*)?$")
}

/// NTFS alternate data stream shape inside a path component (`file.txt:hidden`).
pub(crate) fn alternate_data_stream() -> &'static SafePattern {
    static CELL: OnceLock<SafePattern> = OnceLock::new();
    compiled(&CELL, r"^[^:]+:[^:\\/]+(:\$[A-Za-z]+)?$")
}

/// Control characters and slash/backslash homoglyphs that visually disguise
/// traversal. Covers C0/C1 controls plus the common Unicode solidus lookalikes.
pub(crate) fn control_or_homoglyph() -> &'static SafePattern {
    static CELL: OnceLock<SafePattern> = OnceLock::new();
    compiled(
        &CELL,
        "[\u{0001}-\u{001f}\u{007f}-\u{009f}\u{2044}\u{2215}\u{29f5}\u{29f8}\u{29f9}\u{fe68}\u{ff0f}\u{ff3c}]",
    )
}
