//! Per-run bookkeeping shared by the whole recursive walk.

use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::copier::CopiedDependency;
use crate::scanner::{Position, Span};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleErrorKind {
    UnresolvedModule,
    MissingTypesEntry { manifest: PathBuf },
    MissingTypesFile { manifest: PathBuf, types: PathBuf },
}

/// A reference that could not be bundled. The specifier is left as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleError {
    pub kind: BundleErrorKind,
    pub specifier: String,
    /// The declaration file containing the reference.
    pub file: PathBuf,
    /// Span of the specifier literal in `file`.
    pub span: Span,
    pub position: Position,
}

impl BundleError {
    pub fn unresolved(specifier: &str, file: &Path, span: Span, position: Position) -> Self {
        BundleError {
            kind: BundleErrorKind::UnresolvedModule,
            specifier: specifier.to_string(),
            file: file.to_path_buf(),
            span,
            position,
        }
    }
}

impl fmt::Display for BundleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            BundleErrorKind::UnresolvedModule => {
                write!(f, "unable to resolve import module: {}", self.specifier)
            }
            BundleErrorKind::MissingTypesEntry { manifest } => write!(
                f,
                "package manifest {} does not declare a types entry for module: {}",
                manifest.display(),
                self.specifier
            ),
            BundleErrorKind::MissingTypesFile { manifest, types } => write!(
                f,
                "package manifest {} points at missing types entry {} for module: {}",
                manifest.display(),
                types.display(),
                self.specifier
            ),
        }
    }
}

impl std::error::Error for BundleError {}

#[derive(Debug, Default)]
pub struct ResolutionCache {
    /// Internal files already visited, canonicalized when possible.
    handled: FxHashSet<PathBuf>,
    /// Dependency copies made this run, keyed by specifier.
    copied: FxHashMap<String, CopiedDependency>,
    errors: Vec<BundleError>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `path` was already handled.
    pub fn mark_handled(&mut self, path: &Path) -> bool {
        self.handled.insert(cache_key(path))
    }

    pub fn is_handled(&self, path: &Path) -> bool {
        self.handled.contains(&cache_key(path))
    }

    pub fn handled_count(&self) -> usize {
        self.handled.len()
    }

    pub fn copied(&self, specifier: &str) -> Option<&CopiedDependency> {
        self.copied.get(specifier)
    }

    pub fn record_copy(&mut self, copy: CopiedDependency) -> &CopiedDependency {
        let specifier = copy.specifier.clone();
        self.copied.entry(specifier).or_insert(copy)
    }

    /// Copies made this run, in specifier order.
    pub fn copied_dependencies(&self) -> Vec<&CopiedDependency> {
        let mut copies: Vec<_> = self.copied.values().collect();
        copies.sort_by(|left, right| left.specifier.cmp(&right.specifier));
        copies
    }

    pub fn record_error(&mut self, error: BundleError) {
        self.errors.push(error);
    }

    pub fn errors(&self) -> &[BundleError] {
        &self.errors
    }
}

fn cache_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
