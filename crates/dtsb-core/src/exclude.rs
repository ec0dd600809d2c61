//! Module specifiers that must be left untouched.
//!
//! Patterns are matched against the raw specifier text before any resolution
//! happens. Matching is an unanchored search, so `aws-cdk` excludes both
//! `aws-cdk` and `@aws-cdk/core`; use `^`/`$` to anchor.

use anyhow::{Context, Result};
use regex::Regex;

#[derive(Debug, Clone)]
pub struct ExcludePattern {
    regex: Regex,
}

impl ExcludePattern {
    /// Compile a pattern from its source text.
    pub fn new(source: &str) -> Result<Self> {
        let regex = Regex::new(source)
            .with_context(|| format!("invalid exclude pattern '{}'", source))?;
        Ok(ExcludePattern { regex })
    }

    pub fn is_match(&self, specifier: &str) -> bool {
        self.regex.is_match(specifier)
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl From<Regex> for ExcludePattern {
    fn from(regex: Regex) -> Self {
        ExcludePattern { regex }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    patterns: Vec<ExcludePattern>,
}

impl ExcludeSet {
    /// The first pattern matching `specifier`, if any.
    pub fn find(&self, specifier: &str) -> Option<&ExcludePattern> {
        self.patterns
            .iter()
            .find(|pattern| pattern.is_match(specifier))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl FromIterator<ExcludePattern> for ExcludeSet {
    fn from_iter<T: IntoIterator<Item = ExcludePattern>>(iter: T) -> Self {
        ExcludeSet {
            patterns: iter.into_iter().collect(),
        }
    }
}
