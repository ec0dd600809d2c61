//! Build-pipeline glue: options, entry discovery and the after-emit hook.
//!
//! A host build runs [`DtsBundlePlugin::after_emit`] once its declaration
//! output has been written. Problems with single references are reported as
//! warnings on the [`Compilation`]; anything that stops the run is reported
//! as one error. The hook itself never fails.

use anyhow::{Result, bail};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::cache::{BundleError, ResolutionCache};
use crate::compiler::compile;
use crate::config::{CompilerOptions, DEFAULT_CONFIG_NAME, load_config};
use crate::copier::{CopiedDependency, declaration_matcher};
use crate::exclude::{ExcludePattern, ExcludeSet};
use crate::package_json::{MANIFEST_NAME, read_package_json};
use crate::resolver::{DEPENDENCY_ROOT, normalize_path};
use crate::scanner::Position;

/// Output folder for dependency copies, relative to the build output path.
pub const DEFAULT_OUT_DIR: &str = "obvi-types";

#[derive(Debug, Clone)]
pub struct BundleOptions {
    /// Entry declaration file. Discovered when unset.
    pub entry: Option<PathBuf>,
    /// tsconfig file name or path; searched for upwards from its directory.
    pub config: PathBuf,
    /// Overrides applied on top of the loaded tsconfig.
    pub compiler_options: CompilerOptions,
    pub out: PathBuf,
    pub excludes: Vec<ExcludePattern>,
}

impl Default for BundleOptions {
    fn default() -> Self {
        BundleOptions {
            entry: None,
            config: PathBuf::from(DEFAULT_CONFIG_NAME),
            compiler_options: CompilerOptions::default(),
            out: PathBuf::from(DEFAULT_OUT_DIR),
            excludes: Vec::new(),
        }
    }
}

/// A warning attached to a compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildMessage {
    pub message: String,
    pub file: Option<PathBuf>,
    pub position: Option<Position>,
}

impl BuildMessage {
    pub fn new(message: impl Into<String>) -> Self {
        BuildMessage {
            message: message.into(),
            file: None,
            position: None,
        }
    }
}

impl From<BundleError> for BuildMessage {
    fn from(error: BundleError) -> Self {
        BuildMessage {
            message: error.to_string(),
            file: Some(error.file),
            position: Some(error.position),
        }
    }
}

impl fmt::Display for BuildMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.position) {
            (Some(file), Some(position)) => write!(
                f,
                "{}:{}:{}: {}",
                file.display(),
                position.line,
                position.column,
                self.message
            ),
            (Some(file), None) => write!(f, "{}: {}", file.display(), self.message),
            _ => f.write_str(&self.message),
        }
    }
}

/// The host build's view of one run.
#[derive(Debug)]
pub struct Compilation {
    /// Directory relative options are resolved against.
    pub context: PathBuf,
    /// Where the host wrote its output, declaration files included.
    pub output_path: PathBuf,
    pub warnings: Vec<BuildMessage>,
    pub errors: Vec<anyhow::Error>,
}

impl Compilation {
    pub fn new(context: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Compilation {
            context: context.into(),
            output_path: output_path.into(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// What one bundling pass did.
#[derive(Debug, Clone)]
pub struct BundleReport {
    pub entry: PathBuf,
    pub out_dir: PathBuf,
    pub copied: Vec<CopiedDependency>,
    pub errors: Vec<BundleError>,
}

#[derive(Debug, Clone, Default)]
pub struct DtsBundlePlugin {
    options: BundleOptions,
}

impl DtsBundlePlugin {
    pub fn new(options: BundleOptions) -> Self {
        DtsBundlePlugin { options }
    }

    pub fn options(&self) -> &BundleOptions {
        &self.options
    }

    /// Run one bundling pass and report its outcome on `compilation`.
    pub fn after_emit(&self, compilation: &mut Compilation) -> Option<BundleReport> {
        match self.bundle(compilation) {
            Ok(report) => {
                compilation
                    .warnings
                    .extend(report.errors.iter().cloned().map(BuildMessage::from));
                Some(report)
            }
            Err(err) => {
                error!(error = %format!("{:#}", err), "declaration bundling failed");
                compilation.errors.push(err);
                None
            }
        }
    }

    pub fn bundle(&self, compilation: &mut Compilation) -> Result<BundleReport> {
        let entry = self.find_type_entry(compilation)?;
        let config_path = resolve_against(&compilation.context, &self.options.config);
        let options = load_config(&config_path, &self.options.compiler_options)?;
        let excludes: ExcludeSet = self.options.excludes.iter().cloned().collect();
        let out_dir = self.out_dir(compilation);

        info!(
            entry = %entry.display(),
            out_dir = %out_dir.display(),
            excludes = excludes.len(),
            "bundling declarations"
        );
        let mut cache = ResolutionCache::new();
        let errors = compile(&entry, &options, &out_dir, &excludes, &mut cache)?;
        let copied = cache
            .copied_dependencies()
            .into_iter()
            .cloned()
            .collect::<Vec<_>>();
        info!(
            copied = copied.len(),
            files = cache.handled_count(),
            errors = errors.len(),
            "bundled declarations"
        );

        Ok(BundleReport {
            entry,
            out_dir,
            copied,
            errors,
        })
    }

    fn output_path(&self, compilation: &Compilation) -> PathBuf {
        resolve_against(&compilation.context, &compilation.output_path)
    }

    fn out_dir(&self, compilation: &Compilation) -> PathBuf {
        normalize_path(&self.output_path(compilation).join(&self.options.out))
    }

    /// The explicit entry, the output manifest's `types`, or a guess.
    pub fn find_type_entry(&self, compilation: &mut Compilation) -> Result<PathBuf> {
        if let Some(entry) = &self.options.entry {
            return Ok(resolve_against(&compilation.context, entry));
        }

        let output_path = self.output_path(compilation);
        let manifest_path = output_path.join(MANIFEST_NAME);
        if manifest_path.is_file() {
            match read_package_json(&manifest_path) {
                Ok(manifest) => {
                    if let Some(types) = manifest.types_entry() {
                        return Ok(normalize_path(&output_path.join(types)));
                    }
                }
                Err(err) => debug!(error = %format!("{:#}", err), "ignoring output manifest"),
            }
        }

        if let Some(guess) = first_declaration(&output_path, &self.out_dir(compilation))? {
            let message = format!(
                "guessing types entrypoint {}; setting entry option is recommended",
                guess.display()
            );
            warn!("{}", message);
            compilation.warnings.push(BuildMessage::new(message));
            return Ok(guess);
        }

        bail!("unable to determine entry point path")
    }
}

fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&base.join(path))
    }
}

/// First declaration file below `root` in sorted walk order, ignoring
/// installed packages and earlier dependency copies.
fn first_declaration(root: &Path, out_dir: &Path) -> Result<Option<PathBuf>> {
    if !root.is_dir() {
        return Ok(None);
    }

    let matcher = declaration_matcher()?;
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.path() != out_dir && entry.file_name() != DEPENDENCY_ROOT
        });

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if matcher.is_match(relative) {
            return Ok(Some(entry.path().to_path_buf()));
        }
    }
    Ok(None)
}
