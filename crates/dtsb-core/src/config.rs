//! tsconfig loading and module-resolution options.
//!
//! Only the options that influence module resolution are modelled; every
//! other field in a tsconfig is accepted and ignored.

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::resolver::normalize_path;

pub const DEFAULT_CONFIG_NAME: &str = "tsconfig.json";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TsConfig {
    #[serde(default)]
    pub extends: Option<Extends>,
    #[serde(default)]
    pub compiler_options: Option<CompilerOptions>,
}

/// `extends` accepts a single path or, since TypeScript 5.0, a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Extends {
    One(String),
    Many(Vec<String>),
}

impl Extends {
    fn into_vec(self) -> Vec<String> {
        match self {
            Extends::One(value) => vec![value],
            Extends::Many(values) => values,
        }
    }
}

/// Raw `compilerOptions`, also used for caller-supplied overrides.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompilerOptions {
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub module_resolution: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub paths: Option<HashMap<String, Vec<String>>>,
    #[serde(default)]
    pub type_roots: Option<Vec<String>>,
    #[serde(default)]
    pub custom_conditions: Option<Vec<String>>,
    /// Directory of the config that declared `paths`, when it was inherited
    /// through `extends`.
    #[serde(skip)]
    pub paths_dir: Option<PathBuf>,
}

impl CompilerOptions {
    /// Options set in `overrides` win over `self`.
    pub fn merged_with(self, overrides: CompilerOptions) -> CompilerOptions {
        let (paths, paths_dir) = match overrides.paths {
            Some(paths) => (Some(paths), overrides.paths_dir),
            None => (self.paths, self.paths_dir),
        };
        CompilerOptions {
            module: overrides.module.or(self.module),
            module_resolution: overrides.module_resolution.or(self.module_resolution),
            base_url: overrides.base_url.or(self.base_url),
            paths,
            type_roots: overrides.type_roots.or(self.type_roots),
            custom_conditions: overrides.custom_conditions.or(self.custom_conditions),
            paths_dir,
        }
    }

    /// Make path-valued options absolute against `dir`, the directory of the
    /// config file that declared them.
    fn rebased_onto(mut self, dir: &Path) -> CompilerOptions {
        let rebase = |value: String| {
            if value.trim().is_empty() {
                value
            } else {
                normalize_path(&dir.join(value.trim()))
                    .to_string_lossy()
                    .into_owned()
            }
        };
        self.base_url = self.base_url.map(rebase);
        self.type_roots = self
            .type_roots
            .map(|roots| roots.into_iter().map(rebase).collect());
        if self.paths.is_some() && self.paths_dir.is_none() {
            self.paths_dir = Some(normalize_path(dir));
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModuleResolutionKind {
    Classic,
    #[default]
    Node,
    Node16,
    NodeNext,
    Bundler,
}

impl ModuleResolutionKind {
    pub fn parse(value: &str) -> Result<Self> {
        let kind = match normalize_option(value).as_str() {
            "classic" => ModuleResolutionKind::Classic,
            "node" | "node10" => ModuleResolutionKind::Node,
            "node16" => ModuleResolutionKind::Node16,
            "nodenext" => ModuleResolutionKind::NodeNext,
            "bundler" => ModuleResolutionKind::Bundler,
            _ => bail!("unsupported compilerOptions.moduleResolution '{}'", value),
        };
        Ok(kind)
    }

    /// Whether package.json `exports` participate in resolution.
    pub fn supports_exports(self) -> bool {
        matches!(
            self,
            ModuleResolutionKind::Node16
                | ModuleResolutionKind::NodeNext
                | ModuleResolutionKind::Bundler
        )
    }
}

/// A `compilerOptions.paths` entry, split around its single `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    pub pattern: String,
    prefix: String,
    suffix: String,
    pub targets: Vec<String>,
}

impl PathMapping {
    pub fn new(pattern: &str, targets: Vec<String>) -> Self {
        let pattern = pattern.trim().replace('\\', "/");
        let (prefix, suffix) = match pattern.split_once('*') {
            Some((prefix, suffix)) => (prefix.to_string(), suffix.to_string()),
            None => (pattern.clone(), String::new()),
        };
        PathMapping {
            pattern,
            prefix,
            suffix,
            targets: targets
                .into_iter()
                .map(|target| target.trim().replace('\\', "/"))
                .collect(),
        }
    }

    /// Text captured by the `*`, or an empty string for an exact match.
    pub fn match_specifier(&self, specifier: &str) -> Option<String> {
        if !self.pattern.contains('*') {
            return (self.pattern == specifier).then(String::new);
        }

        let rest = specifier.strip_prefix(self.prefix.as_str())?;
        let captured = rest.strip_suffix(self.suffix.as_str())?;
        Some(captured.to_string())
    }

    pub fn specificity(&self) -> usize {
        self.prefix.len() + self.suffix.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedCompilerOptions {
    pub module_resolution: ModuleResolutionKind,
    pub base_url: Option<PathBuf>,
    /// Ordered most specific first.
    pub paths: Vec<PathMapping>,
    /// Directory `paths` targets are resolved against.
    pub paths_base: PathBuf,
    pub type_roots: Vec<PathBuf>,
    pub custom_conditions: Vec<String>,
    /// The tsconfig these options were loaded from, if any.
    pub config_path: Option<PathBuf>,
}

/// Turn raw options into absolute, validated resolution options.
///
/// Relative paths are resolved against `base_dir`, normally the directory of
/// the tsconfig file.
pub fn resolve_compiler_options(
    options: &CompilerOptions,
    base_dir: &Path,
) -> Result<ResolvedCompilerOptions> {
    let base_dir = normalize_path(base_dir);
    let mut resolved = ResolvedCompilerOptions {
        paths_base: options
            .paths_dir
            .as_deref()
            .map(normalize_path)
            .unwrap_or_else(|| base_dir.clone()),
        ..Default::default()
    };

    let explicit_resolution = options
        .module_resolution
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    resolved.module_resolution = match explicit_resolution {
        Some(value) => ModuleResolutionKind::parse(value)?,
        None => default_resolution_for_module(options.module.as_deref()),
    };

    if let Some(base_url) = options
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        let base_url = normalize_path(&base_dir.join(base_url));
        resolved.paths_base = base_url.clone();
        resolved.base_url = Some(base_url);
    }

    if let Some(paths) = options.paths.as_ref() {
        resolved.paths = build_path_mappings(paths);
    }

    resolved.type_roots = match options.type_roots.as_ref() {
        Some(roots) => roots
            .iter()
            .map(|root| root.trim())
            .filter(|root| !root.is_empty())
            .map(|root| normalize_path(&base_dir.join(root)))
            .collect(),
        None => default_type_roots(&base_dir),
    };

    if let Some(conditions) = options.custom_conditions.as_ref() {
        resolved.custom_conditions = conditions.clone();
    }

    Ok(resolved)
}

fn default_resolution_for_module(module: Option<&str>) -> ModuleResolutionKind {
    match module.map(normalize_option).as_deref() {
        Some("node16") => ModuleResolutionKind::Node16,
        Some("nodenext") => ModuleResolutionKind::NodeNext,
        Some("preserve") => ModuleResolutionKind::Bundler,
        _ => ModuleResolutionKind::Node,
    }
}

/// Every `node_modules/@types` directory from `base_dir` up to the root.
fn default_type_roots(base_dir: &Path) -> Vec<PathBuf> {
    base_dir
        .ancestors()
        .map(|dir| dir.join("node_modules").join("@types"))
        .filter(|candidate| candidate.is_dir())
        .collect()
}

fn build_path_mappings(paths: &HashMap<String, Vec<String>>) -> Vec<PathMapping> {
    let mut mappings: Vec<PathMapping> = paths
        .iter()
        .filter(|(_, targets)| !targets.is_empty())
        .map(|(pattern, targets)| PathMapping::new(pattern, targets.clone()))
        .collect();
    mappings.sort_by(|left, right| {
        right
            .specificity()
            .cmp(&left.specificity())
            .then_with(|| left.pattern.cmp(&right.pattern))
    });
    mappings
}

/// Load `config`, merge `overrides` over it, and resolve the result.
///
/// `config` names a tsconfig file; it is searched for in its directory and
/// every parent directory. When none exists the overrides alone are used.
pub fn load_config(config: &Path, overrides: &CompilerOptions) -> Result<ResolvedCompilerOptions> {
    let search_dir = match config.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = config
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_CONFIG_NAME);
    let search_dir = std::path::absolute(&search_dir)
        .with_context(|| format!("failed to resolve {}", search_dir.display()))?;

    let Some(config_path) = find_config_file(&search_dir, file_name) else {
        debug!(
            dir = %search_dir.display(),
            file = file_name,
            "no tsconfig found, using overrides only"
        );
        return resolve_compiler_options(overrides, &search_dir);
    };

    debug!(config = %config_path.display(), "loading tsconfig");
    let tsconfig = load_tsconfig(&config_path)?;
    let merged = tsconfig
        .compiler_options
        .unwrap_or_default()
        .merged_with(overrides.clone());
    let config_dir = config_path
        .parent()
        .ok_or_else(|| anyhow!("tsconfig has no parent directory"))?;

    let mut resolved = resolve_compiler_options(&merged, config_dir)
        .with_context(|| format!("invalid compiler options in {}", config_path.display()))?;
    resolved.config_path = Some(config_path);
    Ok(resolved)
}

/// Walk from `start` towards the root looking for `file_name`.
pub fn find_config_file(start: &Path, file_name: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(file_name))
        .find(|candidate| candidate.is_file())
}

pub fn parse_tsconfig(source: &str) -> Result<TsConfig> {
    let json = strip_jsonc(source);
    serde_json::from_str(&json).context("failed to parse tsconfig JSON")
}

/// Read a tsconfig and fold in everything it `extends`.
pub fn load_tsconfig(path: &Path) -> Result<TsConfig> {
    let mut visiting = HashSet::new();
    load_tsconfig_inner(path, &mut visiting)
}

fn load_tsconfig_inner(path: &Path, visiting: &mut HashSet<PathBuf>) -> Result<TsConfig> {
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if !visiting.insert(canonical.clone()) {
        bail!("tsconfig extends cycle detected at {}", canonical.display());
    }

    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read tsconfig: {}", path.display()))?;
    let mut config = parse_tsconfig(&source)
        .with_context(|| format!("failed to parse tsconfig: {}", path.display()))?;

    if let Some(extends) = config.extends.take() {
        // Later entries in an `extends` list override earlier ones.
        let mut inherited = CompilerOptions::default();
        for specifier in extends.into_vec() {
            let base_path = resolve_extends_path(path, &specifier)?;
            let base = load_tsconfig_inner(&base_path, visiting)?;
            let base_dir = base_path.parent().unwrap_or_else(|| Path::new("."));
            let options = base.compiler_options.unwrap_or_default().rebased_onto(base_dir);
            inherited = inherited.merged_with(options);
        }
        let own = config.compiler_options.take().unwrap_or_default();
        config.compiler_options = Some(inherited.merged_with(own));
    }

    visiting.remove(&canonical);
    Ok(config)
}

/// Relative and absolute `extends` values are file paths; anything else is a
/// package looked up in `node_modules` directories above the config.
fn resolve_extends_path(current: &Path, extends: &str) -> Result<PathBuf> {
    let base_dir = current
        .parent()
        .ok_or_else(|| anyhow!("tsconfig has no parent directory"))?;

    let with_json = |path: PathBuf| {
        if path.extension().is_none() {
            path.with_extension("json")
        } else {
            path
        }
    };

    let candidate = PathBuf::from(extends);
    if extends.starts_with("./") || extends.starts_with("../") || candidate.is_absolute() {
        return Ok(with_json(base_dir.join(candidate)));
    }

    for dir in base_dir.ancestors() {
        let package_path = dir.join("node_modules").join(extends);
        if package_path.is_dir() {
            let nested = package_path.join(DEFAULT_CONFIG_NAME);
            if nested.is_file() {
                return Ok(nested);
            }
        }
        let file = with_json(package_path);
        if file.is_file() {
            return Ok(file);
        }
    }

    bail!(
        "cannot find base tsconfig '{}' extended by {}",
        extends,
        current.display()
    )
}

fn normalize_option(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !matches!(ch, '-' | '_') && !ch.is_whitespace())
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

/// Reduce JSON-with-comments to plain JSON: drop `//` and `/* */` comments
/// and commas that directly precede `}` or `]`.
fn strip_jsonc(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut pending_comma: Option<usize> = None;

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                pending_comma = None;
                out.push(ch);
                let mut escaped = false;
                for inner in chars.by_ref() {
                    out.push(inner);
                    if escaped {
                        escaped = false;
                    } else if inner == '\\' {
                        escaped = true;
                    } else if inner == '"' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = '\0';
                for inner in chars.by_ref() {
                    if previous == '*' && inner == '/' {
                        break;
                    }
                    if inner == '\n' {
                        out.push('\n');
                    }
                    previous = inner;
                }
            }
            ',' => {
                pending_comma = Some(out.len());
                out.push(ch);
            }
            '}' | ']' => {
                if let Some(index) = pending_comma.take() {
                    out.remove(index);
                }
                out.push(ch);
            }
            _ if ch.is_whitespace() => out.push(ch),
            _ => {
                pending_comma = None;
                out.push(ch);
            }
        }
    }

    out
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
