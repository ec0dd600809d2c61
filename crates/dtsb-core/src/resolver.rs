//! Module resolution for declaration files.
//!
//! Resolution runs in two stages. The standard stage follows the configured
//! `moduleResolution` rules (path mappings, relative and absolute paths,
//! `baseUrl`, `node_modules` lookup, type roots). When it fails but the lookup
//! did find an installed package on the way, the installed-package stage
//! resolves the specifier the way a runtime would and then reads the nearest
//! package manifest's `types` field.
//!
//! The resolved path decides classification: anything below a `node_modules`
//! directory is an external dependency, everything else belongs to the project.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace};

use crate::config::{ModuleResolutionKind, PathMapping, ResolvedCompilerOptions};
use crate::package_json::{MANIFEST_NAME, PackageExports, PackageJson, read_package_json};

/// Directory name that marks installed third-party packages.
pub const DEPENDENCY_ROOT: &str = "node_modules";

/// Extensions tried, in order, for an extensionless candidate.
const TS_EXTENSION_CANDIDATES: [&str; 7] = ["ts", "tsx", "d.ts", "mts", "cts", "d.mts", "d.cts"];
/// Extensions a runtime would try when loading a package file.
const RUNTIME_EXTENSION_CANDIDATES: [&str; 3] = ["js", "json", "node"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// No candidate location exists for the specifier.
    NotFound,
    /// The installed package was found but its manifest names no types entry.
    MissingTypesEntry { manifest: PathBuf },
    /// The manifest's types entry names a file that does not exist.
    MissingTypesFile { manifest: PathBuf, types: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Unresolved {
        specifier: String,
        reason: UnresolvedReason,
    },
    /// A project file, to be processed in place.
    Internal(PathBuf),
    /// A file inside an installed dependency, to be copied.
    External(PathBuf),
}

impl ResolutionOutcome {
    /// Classify an absolute resolved path.
    pub fn from_resolved(path: PathBuf) -> Self {
        if is_dependency_path(&path) {
            ResolutionOutcome::External(path)
        } else {
            ResolutionOutcome::Internal(path)
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ResolutionOutcome::Internal(path) | ResolutionOutcome::External(path) => Some(path),
            ResolutionOutcome::Unresolved { .. } => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.path().is_some()
    }
}

/// Locations found during a single standard lookup that show a package is
/// installed even though no declaration file was reached.
#[derive(Debug, Default)]
struct Lookup {
    affecting_locations: Vec<PathBuf>,
}

impl Lookup {
    fn record(&mut self, path: &Path) {
        if !self.affecting_locations.iter().any(|known| known == path) {
            self.affecting_locations.push(path.to_path_buf());
        }
    }
}

/// Resolves module specifiers against a fixed set of compiler options.
#[derive(Debug, Clone)]
pub struct ModuleResolver {
    resolution_kind: ModuleResolutionKind,
    base_url: Option<PathBuf>,
    path_mappings: Vec<PathMapping>,
    paths_base: PathBuf,
    type_roots: Vec<PathBuf>,
    /// Active `exports` conditions.
    conditions: Vec<String>,
}

impl ModuleResolver {
    pub fn new(options: &ResolvedCompilerOptions) -> Self {
        let mut conditions = options.custom_conditions.clone();
        let defaults: &[&str] = match options.module_resolution {
            ModuleResolutionKind::Bundler => &["types", "import", "require", "default"],
            _ => &["types", "import", "require", "node", "default"],
        };
        for condition in defaults {
            if !conditions.iter().any(|known| known == condition) {
                conditions.push((*condition).to_string());
            }
        }

        ModuleResolver {
            resolution_kind: options.module_resolution,
            base_url: options.base_url.clone(),
            path_mappings: options.paths.clone(),
            paths_base: options.paths_base.clone(),
            type_roots: options.type_roots.clone(),
            conditions,
        }
    }

    /// Resolve `specifier` as written in `containing_file`.
    pub fn resolve(&self, specifier: &str, containing_file: &Path) -> ResolutionOutcome {
        let containing_dir = containing_file.parent().unwrap_or_else(|| Path::new("."));
        let mut lookup = Lookup::default();

        if let Some(resolved) = self.resolve_standard(specifier, containing_dir, &mut lookup) {
            let resolved = normalize_path(&resolved);
            trace!(specifier, resolved = %resolved.display(), "resolved module");
            return ResolutionOutcome::from_resolved(resolved);
        }

        if lookup.affecting_locations.is_empty() {
            return ResolutionOutcome::Unresolved {
                specifier: specifier.to_string(),
                reason: UnresolvedReason::NotFound,
            };
        }

        debug!(
            specifier,
            affecting = lookup.affecting_locations.len(),
            "standard resolution failed, trying installed package manifest"
        );
        match self.resolve_installed_package(specifier, containing_dir) {
            Ok(resolved) => ResolutionOutcome::from_resolved(normalize_path(&resolved)),
            Err(reason) => ResolutionOutcome::Unresolved {
                specifier: specifier.to_string(),
                reason,
            },
        }
    }

    fn resolve_standard(
        &self,
        specifier: &str,
        containing_dir: &Path,
        lookup: &mut Lookup,
    ) -> Option<PathBuf> {
        if is_relative_specifier(specifier) {
            return self.try_file_or_directory(&containing_dir.join(specifier), lookup);
        }
        if Path::new(specifier).is_absolute() {
            return self.try_file_or_directory(Path::new(specifier), lookup);
        }

        if let Some(resolved) = self.try_path_mappings(specifier, lookup) {
            return Some(resolved);
        }

        if let Some(base_url) = &self.base_url
            && let Some(resolved) = self.try_file_or_directory(&base_url.join(specifier), lookup)
        {
            return Some(resolved);
        }

        match self.resolution_kind {
            ModuleResolutionKind::Classic => self.resolve_classic(specifier, containing_dir, lookup),
            _ => self.resolve_bare_specifier(specifier, containing_dir, lookup),
        }
    }

    /// Only the most specific matching pattern is tried.
    fn try_path_mappings(&self, specifier: &str, lookup: &mut Lookup) -> Option<PathBuf> {
        let (mapping, captured) = self.path_mappings.iter().find_map(|mapping| {
            mapping
                .match_specifier(specifier)
                .map(|captured| (mapping, captured))
        })?;

        mapping.targets.iter().find_map(|target| {
            let candidate = self.paths_base.join(target.replace('*', &captured));
            self.try_file_or_directory(&candidate, lookup)
        })
    }

    /// Classic resolution: look for the file in every ancestor directory,
    /// then fall back to type roots.
    fn resolve_classic(
        &self,
        specifier: &str,
        containing_dir: &Path,
        lookup: &mut Lookup,
    ) -> Option<PathBuf> {
        containing_dir
            .ancestors()
            .find_map(|dir| self.try_file(&dir.join(specifier)))
            .or_else(|| self.resolve_from_type_roots(specifier, lookup))
    }

    fn resolve_bare_specifier(
        &self,
        specifier: &str,
        containing_dir: &Path,
        lookup: &mut Lookup,
    ) -> Option<PathBuf> {
        let (package_name, subpath) = parse_package_specifier(specifier);

        for dir in containing_dir.ancestors() {
            // `node_modules/node_modules` is never a lookup location.
            if dir.file_name().is_some_and(|name| name == DEPENDENCY_ROOT) {
                continue;
            }
            let package_dir = dir.join(DEPENDENCY_ROOT).join(&package_name);
            if !package_dir.is_dir() {
                continue;
            }
            lookup.record(&package_dir);
            if let Some(resolved) = self.resolve_package(&package_dir, subpath.as_deref(), lookup) {
                return Some(resolved);
            }
        }

        self.resolve_from_type_roots(specifier, lookup)
    }

    fn resolve_from_type_roots(&self, specifier: &str, lookup: &mut Lookup) -> Option<PathBuf> {
        let (package_name, subpath) = parse_package_specifier(specifier);
        let types_name = types_package_name(&package_name);

        self.type_roots.iter().find_map(|root| {
            let package_dir = root.join(&types_name);
            if !package_dir.is_dir() {
                return None;
            }
            lookup.record(&package_dir);
            self.resolve_package(&package_dir, subpath.as_deref(), lookup)
        })
    }

    fn resolve_package(
        &self,
        package_dir: &Path,
        subpath: Option<&str>,
        lookup: &mut Lookup,
    ) -> Option<PathBuf> {
        let manifest = self.read_manifest(package_dir, lookup);

        if let Some(manifest) = manifest.as_ref() {
            if self.resolution_kind.supports_exports()
                && let Some(exports) = manifest.exports.as_ref()
            {
                // `exports` is authoritative once present.
                let key = subpath.map_or_else(|| ".".to_string(), |sub| format!("./{}", sub));
                return self.resolve_exports(package_dir, exports, &key);
            }

            if let Some(types_versions) = manifest.types_versions.as_ref()
                && let Some(resolved) = self.resolve_types_versions(
                    package_dir,
                    subpath.unwrap_or("index"),
                    types_versions,
                    lookup,
                )
            {
                return Some(resolved);
            }
        }

        match subpath {
            Some(subpath) => self.try_file_or_directory(&package_dir.join(subpath), lookup),
            None => self.try_package_entry(package_dir, manifest.as_ref()),
        }
    }

    fn resolve_exports(
        &self,
        package_dir: &Path,
        exports: &PackageExports,
        subpath: &str,
    ) -> Option<PathBuf> {
        match exports {
            PackageExports::Object(map) if exports.is_subpath_map() => {
                if let Some(target) = map.get(subpath) {
                    return self.resolve_export_target(package_dir, target, None);
                }

                let mut best: Option<(usize, String, &PackageExports)> = None;
                for (pattern, target) in map {
                    let Some(captured) = match_star_pattern(pattern, subpath) else {
                        continue;
                    };
                    let prefix_len = pattern.find('*').unwrap_or(pattern.len());
                    if best.as_ref().is_none_or(|(len, _, _)| prefix_len > *len) {
                        best = Some((prefix_len, captured, target));
                    }
                }
                let (_, captured, target) = best?;
                self.resolve_export_target(package_dir, target, Some(&captured))
            }
            _ if subpath == "." => self.resolve_export_target(package_dir, exports, None),
            _ => None,
        }
    }

    fn resolve_export_target(
        &self,
        package_dir: &Path,
        target: &PackageExports,
        captured: Option<&str>,
    ) -> Option<PathBuf> {
        match target {
            PackageExports::Null(()) => None,
            PackageExports::Path(path) => {
                let path = match captured {
                    Some(captured) => path.replace('*', captured),
                    None => path.clone(),
                };
                self.try_file(&package_dir.join(path.trim_start_matches("./")))
            }
            PackageExports::Array(targets) => targets
                .iter()
                .find_map(|target| self.resolve_export_target(package_dir, target, captured)),
            PackageExports::Object(conditions) => conditions
                .iter()
                .filter(|(condition, _)| self.conditions.contains(condition))
                .find_map(|(_, target)| self.resolve_export_target(package_dir, target, captured)),
        }
    }

    /// Use the first version range that applies to a current compiler.
    fn resolve_types_versions(
        &self,
        package_dir: &Path,
        subpath: &str,
        types_versions: &serde_json::Value,
        lookup: &mut Lookup,
    ) -> Option<PathBuf> {
        let paths = types_versions
            .as_object()?
            .iter()
            .find(|(range, _)| range.as_str() == "*" || range.starts_with('>'))
            .and_then(|(_, paths)| paths.as_object())?;

        let mut best: Option<(usize, String)> = None;
        for (pattern, targets) in paths {
            let Some(captured) = match_star_pattern(pattern, subpath) else {
                continue;
            };
            let target = match targets {
                serde_json::Value::String(target) => target.as_str(),
                serde_json::Value::Array(targets) => {
                    match targets.first().and_then(|value| value.as_str()) {
                        Some(target) => target,
                        None => continue,
                    }
                }
                _ => continue,
            };
            if best.as_ref().is_none_or(|(len, _)| pattern.len() > *len) {
                best = Some((pattern.len(), target.replace('*', &captured)));
            }
        }

        let (_, target) = best?;
        self.try_file_or_directory(&package_dir.join(target.trim_start_matches("./")), lookup)
    }

    /// Resolve `path` as a declaration file, substituting or appending
    /// TypeScript extensions.
    fn try_file(&self, path: &Path) -> Option<PathBuf> {
        let file_name = path.file_name()?.to_str()?;

        if has_ts_extension(file_name) && path.is_file() {
            return Some(path.to_path_buf());
        }

        if let Some((stem, extension)) = file_name.rsplit_once('.') {
            let replacements: &[&str] = match extension {
                "js" => &["ts", "tsx", "d.ts"],
                "jsx" => &["tsx", "d.ts"],
                "mjs" => &["mts", "d.mts"],
                "cjs" => &["cts", "d.cts"],
                _ => &[],
            };
            if let Some(found) = replacements
                .iter()
                .map(|ext| path.with_file_name(format!("{}.{}", stem, ext)))
                .find(|candidate| candidate.is_file())
            {
                return Some(found);
            }
        }

        TS_EXTENSION_CANDIDATES
            .iter()
            .map(|ext| append_extension(path, ext))
            .find(|candidate| candidate.is_file())
    }

    fn try_index(&self, dir: &Path) -> Option<PathBuf> {
        if dir.is_dir() {
            self.try_file(&dir.join("index"))
        } else {
            None
        }
    }

    fn try_file_or_directory(&self, path: &Path, lookup: &mut Lookup) -> Option<PathBuf> {
        self.try_file(path).or_else(|| self.try_directory(path, lookup))
    }

    fn try_directory(&self, dir: &Path, lookup: &mut Lookup) -> Option<PathBuf> {
        if !dir.is_dir() {
            return None;
        }
        let manifest = self.read_manifest(dir, lookup);
        self.try_package_entry(dir, manifest.as_ref())
    }

    /// `types`/`typings`, then `main`, then `index`.
    fn try_package_entry(&self, dir: &Path, manifest: Option<&PackageJson>) -> Option<PathBuf> {
        if let Some(manifest) = manifest {
            for entry in [manifest.types_entry(), manifest.main.as_deref()]
                .into_iter()
                .flatten()
            {
                let target = dir.join(entry);
                if let Some(resolved) = self.try_file(&target).or_else(|| self.try_index(&target)) {
                    return Some(resolved);
                }
            }
        }
        self.try_index(dir)
    }

    fn read_manifest(&self, dir: &Path, lookup: &mut Lookup) -> Option<PackageJson> {
        let manifest_path = dir.join(MANIFEST_NAME);
        if !manifest_path.is_file() {
            return None;
        }
        lookup.record(&manifest_path);
        match read_package_json(&manifest_path) {
            Ok(manifest) => Some(manifest),
            Err(err) => {
                debug!(error = %format!("{:#}", err), "ignoring unreadable package manifest");
                None
            }
        }
    }

    /// Resolve the specifier to the file a runtime would load, then use the
    /// `types` entry of the closest manifest inside that package.
    fn resolve_installed_package(
        &self,
        specifier: &str,
        containing_dir: &Path,
    ) -> Result<PathBuf, UnresolvedReason> {
        let physical = if is_relative_specifier(specifier) {
            resolve_runtime_path(&containing_dir.join(specifier))
        } else if Path::new(specifier).is_absolute() {
            resolve_runtime_path(Path::new(specifier))
        } else {
            containing_dir
                .ancestors()
                .filter(|dir| !dir.file_name().is_some_and(|name| name == DEPENDENCY_ROOT))
                .find_map(|dir| resolve_runtime_path(&dir.join(DEPENDENCY_ROOT).join(specifier)))
        };
        let physical = physical.ok_or(UnresolvedReason::NotFound)?;

        let manifest_path = physical
            .ancestors()
            .take_while(|dir| !dir.file_name().is_some_and(|name| name == DEPENDENCY_ROOT))
            .map(|dir| dir.join(MANIFEST_NAME))
            .find(|candidate| candidate.is_file())
            .ok_or(UnresolvedReason::NotFound)?;
        let manifest_dir = manifest_path
            .parent()
            .ok_or(UnresolvedReason::NotFound)?
            .to_path_buf();

        let types_entry = read_package_json(&manifest_path)
            .ok()
            .and_then(|manifest| manifest.types_entry().map(str::to_string));
        let Some(types_entry) = types_entry else {
            return Err(UnresolvedReason::MissingTypesEntry {
                manifest: manifest_path,
            });
        };

        let target = manifest_dir.join(types_entry);
        debug!(
            specifier,
            manifest = %manifest_path.display(),
            types = %target.display(),
            "resolved through package manifest"
        );
        self.try_file(&target)
            .or_else(|| self.try_index(&target))
            .ok_or(UnresolvedReason::MissingTypesFile {
                manifest: manifest_path,
                types: target,
            })
    }
}

/// Runtime lookup of a file or directory: exact file, runtime extensions,
/// then the directory's `main` or `index.js`. An existing directory without
/// either is returned as is.
fn resolve_runtime_path(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    if let Some(found) = RUNTIME_EXTENSION_CANDIDATES
        .iter()
        .map(|ext| append_extension(path, ext))
        .find(|candidate| candidate.is_file())
    {
        return Some(found);
    }
    if !path.is_dir() {
        return None;
    }

    let main = read_package_json(&path.join(MANIFEST_NAME))
        .ok()
        .and_then(|manifest| manifest.main)
        .map(|main| path.join(main));
    if let Some(main) = main {
        if main.is_file() {
            return Some(main);
        }
        if let Some(found) = RUNTIME_EXTENSION_CANDIDATES
            .iter()
            .map(|ext| append_extension(&main, ext))
            .find(|candidate| candidate.is_file())
        {
            return Some(found);
        }
    }

    let index = path.join("index.js");
    if index.is_file() {
        return Some(index);
    }
    Some(path.to_path_buf())
}

fn has_ts_extension(file_name: &str) -> bool {
    [".ts", ".tsx", ".mts", ".cts"]
        .iter()
        .any(|ext| file_name.ends_with(ext))
}

/// `foo.service` + `d.ts` is `foo.service.d.ts`, unlike `Path::with_extension`.
fn append_extension(path: &Path, extension: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

pub fn is_relative_specifier(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// Whether `path` lies inside an installed dependency.
pub fn is_dependency_path(path: &Path) -> bool {
    path.components()
        .any(|component| component.as_os_str() == DEPENDENCY_ROOT)
}

/// Split `@scope/pkg/sub/path` into (`@scope/pkg`, `sub/path`).
pub fn parse_package_specifier(specifier: &str) -> (String, Option<String>) {
    let name_segments = if specifier.starts_with('@') { 2 } else { 1 };
    let mut parts = specifier.splitn(name_segments + 1, '/');
    let name = parts
        .by_ref()
        .take(name_segments)
        .collect::<Vec<_>>()
        .join("/");
    let subpath = parts.next().filter(|rest| !rest.is_empty()).map(str::to_string);
    (name, subpath)
}

/// `@scope/pkg` lives in `@types/scope__pkg`.
fn types_package_name(package_name: &str) -> String {
    match package_name.strip_prefix('@') {
        Some(scoped) => scoped.replace('/', "__"),
        None => package_name.to_string(),
    }
}

/// Match a pattern with at most one `*`, returning the captured text.
fn match_star_pattern(pattern: &str, subject: &str) -> Option<String> {
    let Some((prefix, suffix)) = pattern.split_once('*') else {
        return (pattern == subject).then(String::new);
    };
    if subject.len() < prefix.len() + suffix.len() {
        return None;
    }
    subject
        .strip_prefix(prefix)?
        .strip_suffix(suffix)
        .map(str::to_string)
}

/// Lexically resolve `.` and `..` components without touching the
/// filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// A module specifier for `target` as imported from a file in `from_dir`:
/// forward slashes and always starting with `./` or `../`.
pub fn relative_module_specifier(from_dir: &Path, target: &Path) -> String {
    let from = normalize_path(from_dir);
    let target = normalize_path(target);
    let from: Vec<Component> = from.components().collect();
    let target: Vec<Component> = target.components().collect();

    let common = from
        .iter()
        .zip(&target)
        .take_while(|(left, right)| left == right)
        .count();

    let mut parts: Vec<String> = vec!["..".to_string(); from.len() - common];
    parts.extend(
        target[common..]
            .iter()
            .map(|component| component.as_os_str().to_string_lossy().into_owned()),
    );

    let joined = parts.join("/");
    if joined.is_empty() {
        ".".to_string()
    } else if joined == ".." || joined.starts_with("../") {
        joined
    } else {
        format!("./{}", joined)
    }
}

#[cfg(test)]
#[path = "tests/resolver_tests.rs"]
mod tests;
