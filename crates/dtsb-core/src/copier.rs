//! Copies an external dependency's declaration tree into the output folder.

use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::resolver::{DEPENDENCY_ROOT, is_relative_specifier};

pub const DECLARATION_GLOB: &str = "**/*.d.ts";

/// A dependency tree copied into the output folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedDependency {
    /// The specifier the copy was made for.
    pub specifier: String,
    /// Directory that was copied (the parent of the resolved entry).
    pub source_root: PathBuf,
    /// `out_dir/<name>`.
    pub target_root: PathBuf,
    /// What rewritten specifiers should point at: the copy directory, or the
    /// copied entry without its declaration extension.
    pub import_target: PathBuf,
    /// Number of declaration files copied.
    pub files: usize,
}

pub fn declaration_matcher() -> Result<GlobMatcher> {
    Ok(Glob::new(DECLARATION_GLOB)
        .context("invalid declaration glob")?
        .compile_matcher())
}

/// Copy every `*.d.ts` below the directory holding `resolved_entry` into
/// `out_dir/<name>`, keeping relative positions. Existing files are
/// overwritten.
pub fn copy_dependency(
    specifier: &str,
    resolved_entry: &Path,
    out_dir: &Path,
) -> Result<CopiedDependency> {
    let source_root = resolved_entry
        .parent()
        .with_context(|| format!("{} has no parent directory", resolved_entry.display()))?
        .to_path_buf();
    let target_root = out_dir.join(copy_name(specifier, &source_root));

    fs::create_dir_all(&target_root)
        .with_context(|| format!("failed to create {}", target_root.display()))?;

    let matcher = declaration_matcher()?;
    let mut files = 0usize;
    for entry in WalkDir::new(&source_root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", source_root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(&source_root)
            .with_context(|| format!("{} escapes {}", entry.path().display(), source_root.display()))?;
        if !matcher.is_match(relative) {
            continue;
        }

        let destination = target_root.join(relative);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::copy(entry.path(), &destination).with_context(|| {
            format!(
                "failed to copy {} to {}",
                entry.path().display(),
                destination.display()
            )
        })?;
        trace!(file = %relative.display(), "copied declaration");
        files += 1;
    }

    let import_target = match entry_stem(resolved_entry) {
        Some(stem) if stem != "index" => target_root.join(stem),
        _ => target_root.clone(),
    };

    debug!(
        specifier,
        from = %source_root.display(),
        to = %target_root.display(),
        files,
        "copied dependency declarations"
    );

    Ok(CopiedDependency {
        specifier: specifier.to_string(),
        source_root,
        target_root,
        import_target,
        files,
    })
}

/// Folder name under the output directory. Package specifiers are used
/// verbatim; path specifiers use the part of the source below the last
/// `node_modules` so the copy cannot land outside the output directory.
fn copy_name(specifier: &str, source_root: &Path) -> PathBuf {
    if !is_relative_specifier(specifier) && !Path::new(specifier).is_absolute() {
        return PathBuf::from(specifier);
    }

    let components: Vec<Component> = source_root.components().collect();
    let after_root = components
        .iter()
        .rposition(|component| component.as_os_str() == DEPENDENCY_ROOT)
        .map_or(&components[..0], |index| &components[index + 1..]);
    after_root
        .iter()
        .filter(|component| matches!(component, Component::Normal(_)))
        .collect()
}

/// `index.d.ts` → `index`, `lib/util.d.mts` → `util`.
fn entry_stem(entry: &Path) -> Option<&str> {
    let name = entry.file_name()?.to_str()?;
    [".d.ts", ".d.mts", ".d.cts", ".ts", ".tsx", ".mts", ".cts"]
        .iter()
        .find_map(|ext| name.strip_suffix(ext))
        .or(Some(name))
}
