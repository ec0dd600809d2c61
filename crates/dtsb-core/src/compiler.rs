//! The recursive declaration walk.
//!
//! Starting from an entry file, every top-level import and export is
//! resolved. Project files are visited recursively and left untouched;
//! references to installed dependencies are rewritten to point at a copy of
//! the dependency's declarations under the output directory.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info_span, trace, warn};

use crate::cache::{BundleError, BundleErrorKind, ResolutionCache};
use crate::config::ResolvedCompilerOptions;
use crate::copier::copy_dependency;
use crate::editor::TextEditor;
use crate::exclude::ExcludeSet;
use crate::resolver::{
    ModuleResolver, ResolutionOutcome, UnresolvedReason, normalize_path, relative_module_specifier,
};
use crate::scanner::{DeclarationUnit, ModuleReference, Position};

/// Everything that stays fixed for one run.
struct TraversalContext<'a> {
    resolver: ModuleResolver,
    excludes: &'a ExcludeSet,
    out_dir: PathBuf,
}

/// Bundle the declaration graph rooted at `entry`.
///
/// Recoverable problems are recorded in `cache` and also returned; I/O and
/// scan failures abort the run.
pub fn compile(
    entry: &Path,
    options: &ResolvedCompilerOptions,
    out_dir: &Path,
    excludes: &ExcludeSet,
    cache: &mut ResolutionCache,
) -> Result<Vec<BundleError>> {
    let entry = absolute(entry)?;
    let context = TraversalContext {
        resolver: ModuleResolver::new(options),
        excludes,
        out_dir: absolute(out_dir)?,
    };

    cache.mark_handled(&entry);
    compile_file(&context, &entry, cache)?;
    Ok(cache.errors().to_vec())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    let path = std::path::absolute(path)
        .with_context(|| format!("failed to resolve {}", path.display()))?;
    Ok(normalize_path(&path))
}

fn compile_file(context: &TraversalContext<'_>, path: &Path, cache: &mut ResolutionCache) -> Result<()> {
    let span = info_span!("compile", file = %path.display());
    let _enter = span.enter();

    let unit = DeclarationUnit::read(path)?;
    let containing_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut editor = TextEditor::new(unit.source.as_str());

    for reference in unit.references() {
        if let Some(pattern) = context.excludes.find(&reference.text) {
            debug!(specifier = %reference.text, pattern = pattern.as_str(), "excluded");
            continue;
        }

        match context.resolver.resolve(&reference.text, path) {
            ResolutionOutcome::Unresolved { specifier, reason } => {
                let error = unresolved_error(&unit, reference, specifier, reason);
                warn!(file = %path.display(), "{}", error);
                cache.record_error(error);
            }
            ResolutionOutcome::Internal(resolved) => {
                if resolved.starts_with(&context.out_dir) {
                    trace!(resolved = %resolved.display(), "skipping bundled copy");
                    continue;
                }
                if !cache.mark_handled(&resolved) {
                    trace!(resolved = %resolved.display(), "already handled");
                    continue;
                }
                compile_file(context, &resolved, cache)?;
            }
            ResolutionOutcome::External(resolved) => {
                cache.mark_handled(&resolved);
                let import_target = match cache.copied(&reference.text) {
                    Some(copy) => copy.import_target.clone(),
                    None => {
                        let copy = copy_dependency(&reference.text, &resolved, &context.out_dir)?;
                        cache.record_copy(copy).import_target.clone()
                    }
                };

                let rewritten = relative_module_specifier(containing_dir, &import_target);
                let literal = format!("{quote}{rewritten}{quote}", quote = reference.quote);
                editor.replace(reference.span.start, reference.span.end, &literal)?;
                trace!(from = %reference.text, to = %rewritten, "rewrote specifier");
            }
        }
    }

    if editor.save(path)? {
        debug!("saved rewritten declarations");
    }
    Ok(())
}

fn unresolved_error(
    unit: &DeclarationUnit,
    reference: &ModuleReference,
    specifier: String,
    reason: UnresolvedReason,
) -> BundleError {
    let kind = match reason {
        UnresolvedReason::NotFound => BundleErrorKind::UnresolvedModule,
        UnresolvedReason::MissingTypesEntry { manifest } => {
            BundleErrorKind::MissingTypesEntry { manifest }
        }
        UnresolvedReason::MissingTypesFile { manifest, types } => {
            BundleErrorKind::MissingTypesFile { manifest, types }
        }
    };
    BundleError {
        kind,
        specifier,
        file: unit.path.clone(),
        span: reference.span,
        position: Position::of_offset(&unit.source, reference.span.start),
    }
}
