//! End-to-end bundling runs against fake projects with installed packages.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

use dtsb_core::{
    BundleErrorKind, BundleOptions, Compilation, DtsBundlePlugin, ExcludePattern, ExcludeSet,
    ResolutionCache, ResolvedCompilerOptions, compile,
};

const INDEX: &str = "export * as kms from \"aws-cdk-lib/aws-kms\";\nexport { default as sqs } from \"./sqs\";\n";
const SQS: &str = "import * as sqs from \"aws-cdk-lib/aws-sqs\";
declare class Queue extends sqs.Queue {
}
declare const _default: typeof sqs & {
    Queue: typeof Queue;
};
export default _default;
";

fn write_file(root: &Path, name: &str, contents: &str) -> PathBuf {
    let path = root.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    path
}

fn read(root: &Path, name: &str) -> String {
    fs::read_to_string(root.join(name)).unwrap()
}

/// A project whose build emitted `dist/index.d.ts` and `dist/sqs.d.ts`, with
/// `aws-cdk-lib` installed.
fn create_cdk_project(root: &Path) {
    write_file(
        root,
        "tsconfig.json",
        r#"{
  // emitted by the host build
  "compilerOptions": {"declaration": true, "outDir": "dist", "moduleResolution": "node",},
}"#,
    );
    write_file(
        root,
        "node_modules/aws-cdk-lib/package.json",
        r#"{"name": "aws-cdk-lib", "version": "2.0.0", "main": "index.js", "types": "index.d.ts"}"#,
    );
    write_file(
        root,
        "node_modules/aws-cdk-lib/index.d.ts",
        "export * as aws_kms from './aws-kms';\nexport * as aws_sqs from './aws-sqs';\n",
    );
    write_file(
        root,
        "node_modules/aws-cdk-lib/aws-kms/index.d.ts",
        "export * from './lib';\n",
    );
    write_file(
        root,
        "node_modules/aws-cdk-lib/aws-kms/lib/index.d.ts",
        "export declare class Key {\n}\n",
    );
    write_file(root, "node_modules/aws-cdk-lib/aws-kms/lib/index.js", "");
    write_file(
        root,
        "node_modules/aws-cdk-lib/aws-sqs/index.d.ts",
        "export declare class Queue {\n}\nexport interface QueueProps {\n}\n",
    );
    write_file(root, "dist/index.d.ts", INDEX);
    write_file(root, "dist/sqs.d.ts", SQS);
    write_file(root, "dist/main.js", "");
}

fn write_dep(root: &Path) {
    write_file(
        root,
        "node_modules/dep/package.json",
        r#"{"name": "dep", "types": "index.d.ts"}"#,
    );
    write_file(root, "node_modules/dep/index.d.ts", "export declare const value: number;\n");
}

fn plugin_with_entry() -> DtsBundlePlugin {
    DtsBundlePlugin::new(BundleOptions {
        entry: Some(PathBuf::from("dist/index.d.ts")),
        ..Default::default()
    })
}

fn run_compile(entry: &Path, out_dir: &Path, excludes: &ExcludeSet) -> ResolutionCache {
    let mut cache = ResolutionCache::new();
    compile(
        entry,
        &ResolvedCompilerOptions::default(),
        out_dir,
        excludes,
        &mut cache,
    )
    .unwrap();
    cache
}

fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .map(|entry| entry.unwrap())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            (
                entry.path().strip_prefix(root).unwrap().to_path_buf(),
                fs::read(entry.path()).unwrap(),
            )
        })
        .collect()
}

#[test]
fn test_rewrites_external_references_and_leaves_local_ones() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    create_cdk_project(root);

    let mut compilation = Compilation::new(root, "dist");
    let report = plugin_with_entry().after_emit(&mut compilation).unwrap();

    assert!(compilation.errors.is_empty(), "{:?}", compilation.errors);
    assert!(compilation.warnings.is_empty(), "{:?}", compilation.warnings);
    assert_eq!(
        read(root, "dist/index.d.ts"),
        "export * as kms from \"./obvi-types/aws-cdk-lib/aws-kms\";\nexport { default as sqs } from \"./sqs\";\n"
    );
    assert_eq!(
        read(root, "dist/sqs.d.ts"),
        "import * as sqs from \"./obvi-types/aws-cdk-lib/aws-sqs\";
declare class Queue extends sqs.Queue {
}
declare const _default: typeof sqs & {
    Queue: typeof Queue;
};
export default _default;
"
    );

    assert_eq!(
        read(root, "dist/obvi-types/aws-cdk-lib/aws-kms/lib/index.d.ts"),
        "export declare class Key {\n}\n"
    );
    assert!(root.join("dist/obvi-types/aws-cdk-lib/aws-kms/index.d.ts").is_file());
    assert!(!root.join("dist/obvi-types/aws-cdk-lib/aws-kms/lib/index.js").exists());
    assert!(root.join("dist/obvi-types/aws-cdk-lib/aws-sqs/index.d.ts").is_file());

    let specifiers: Vec<_> = report.copied.iter().map(|copy| copy.specifier.as_str()).collect();
    assert_eq!(specifiers, vec!["aws-cdk-lib/aws-kms", "aws-cdk-lib/aws-sqs"]);
}

#[test]
fn test_second_run_is_byte_identical() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    create_cdk_project(root);

    let mut first = Compilation::new(root, "dist");
    plugin_with_entry().after_emit(&mut first);
    let after_first = snapshot(root);

    let mut second = Compilation::new(root, "dist");
    let report = plugin_with_entry().after_emit(&mut second).unwrap();

    assert!(second.errors.is_empty());
    assert!(second.warnings.is_empty());
    assert!(report.copied.is_empty());
    assert_eq!(snapshot(root), after_first);
}

#[test]
fn test_cycles_terminate_and_visit_each_file_once() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write_dep(root);
    let a = write_file(root, "dist/a.d.ts", "export * from \"./b\";\nexport * from \"dep\";\n");
    write_file(root, "dist/b.d.ts", "export * from \"./a\";\nimport \"dep\";\n");

    let cache = run_compile(&a, &root.join("dist/obvi-types"), &ExcludeSet::default());

    assert!(cache.errors().is_empty());
    assert_eq!(
        read(root, "dist/a.d.ts"),
        "export * from \"./b\";\nexport * from \"./obvi-types/dep\";\n"
    );
    assert_eq!(
        read(root, "dist/b.d.ts"),
        "export * from \"./a\";\nimport \"./obvi-types/dep\";\n"
    );
    assert_eq!(cache.copied_dependencies().len(), 1);
}

#[test]
fn test_shared_dependency_is_copied_once_with_correct_relative_paths() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write_dep(root);
    let entry = write_file(
        root,
        "dist/index.d.ts",
        "export * from \"./lib/util\";\nimport type { value } from \"dep\";\n",
    );
    write_file(root, "dist/lib/util.d.ts", "export { value } from \"dep\";\n");

    let cache = run_compile(&entry, &root.join("dist/obvi-types"), &ExcludeSet::default());

    assert_eq!(
        read(root, "dist/lib/util.d.ts"),
        "export { value } from \"../obvi-types/dep\";\n"
    );
    assert_eq!(
        read(root, "dist/index.d.ts"),
        "export * from \"./lib/util\";\nimport type { value } from \"./obvi-types/dep\";\n"
    );
    let copies = cache.copied_dependencies();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].files, 1);
}

#[test]
fn test_excluded_specifiers_are_preserved_and_never_copied() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    create_cdk_project(root);

    let plugin = DtsBundlePlugin::new(BundleOptions {
        entry: Some(PathBuf::from("dist/index.d.ts")),
        excludes: vec![ExcludePattern::new("^aws-cdk-lib/").unwrap()],
        ..Default::default()
    });
    let mut compilation = Compilation::new(root, "dist");
    let report = plugin.after_emit(&mut compilation).unwrap();

    assert!(compilation.warnings.is_empty());
    assert_eq!(read(root, "dist/index.d.ts"), INDEX);
    assert_eq!(read(root, "dist/sqs.d.ts"), SQS);
    assert!(report.copied.is_empty());
    assert!(!root.join("dist/obvi-types").exists());
}

#[test]
fn test_unresolved_specifier_yields_one_error_and_keeps_the_line() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write_dep(root);
    let entry = write_file(
        root,
        "dist/index.d.ts",
        "import * as missing from \"does-not-exist\";\nexport * from \"dep\";\n",
    );

    let cache = run_compile(&entry, &root.join("dist/obvi-types"), &ExcludeSet::default());

    assert_eq!(cache.errors().len(), 1);
    assert_eq!(
        cache.errors()[0].to_string(),
        "unable to resolve import module: does-not-exist"
    );
    assert_eq!(
        read(root, "dist/index.d.ts"),
        "import * as missing from \"does-not-exist\";\nexport * from \"./obvi-types/dep\";\n"
    );
}

#[test]
fn test_reference_errors_become_compilation_warnings() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write_file(
        root,
        "node_modules/untyped/package.json",
        r#"{"name": "untyped", "main": "index.js"}"#,
    );
    write_file(root, "node_modules/untyped/index.js", "module.exports = {};\n");
    write_file(
        root,
        "dist/index.d.ts",
        "import \"untyped\";\nimport \"does-not-exist\";\n",
    );

    let mut compilation = Compilation::new(root, "dist");
    let report = plugin_with_entry().after_emit(&mut compilation).unwrap();

    assert!(compilation.errors.is_empty());
    assert_eq!(compilation.warnings.len(), 2);
    assert!(matches!(
        report.errors[0].kind,
        BundleErrorKind::MissingTypesEntry { .. }
    ));
    assert!(
        compilation.warnings[0]
            .message
            .ends_with("does not declare a types entry for module: untyped")
    );
    assert_eq!(
        compilation.warnings[1].message,
        "unable to resolve import module: does-not-exist"
    );
    assert_eq!(compilation.warnings[1].position.map(|p| p.line), Some(2));
}

#[test]
fn test_missing_types_file_does_not_abort_the_file() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write_dep(root);
    write_file(
        root,
        "node_modules/broken/package.json",
        r#"{"name": "broken", "types": "dist/index.d.ts"}"#,
    );
    let entry = write_file(
        root,
        "dist/index.d.ts",
        "export * from \"dep\";\nexport * from \"broken\";\n",
    );

    let cache = run_compile(&entry, &root.join("dist/obvi-types"), &ExcludeSet::default());

    assert_eq!(cache.errors().len(), 1);
    assert!(matches!(
        cache.errors()[0].kind,
        BundleErrorKind::MissingTypesFile { .. }
    ));
    assert!(
        cache.errors()[0]
            .to_string()
            .ends_with("for module: broken")
    );
    assert_eq!(
        read(root, "dist/index.d.ts"),
        "export * from \"./obvi-types/dep\";\nexport * from \"broken\";\n"
    );
    assert!(!root.join("dist/obvi-types/broken").exists());
}

#[test]
fn test_entry_from_output_manifest() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    create_cdk_project(root);
    write_file(root, "dist/package.json", r#"{"types": "./index.d.ts"}"#);

    let mut compilation = Compilation::new(root, "dist");
    let report = DtsBundlePlugin::default().after_emit(&mut compilation).unwrap();

    assert!(compilation.warnings.is_empty());
    assert!(report.entry.ends_with("dist/index.d.ts"));
    assert!(read(root, "dist/index.d.ts").contains("./obvi-types/aws-cdk-lib/aws-kms"));
}

#[test]
fn test_guessed_entry_warns_and_still_bundles() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    create_cdk_project(root);

    let mut compilation = Compilation::new(root, "dist");
    let report = DtsBundlePlugin::default().after_emit(&mut compilation).unwrap();

    assert_eq!(compilation.warnings.len(), 1);
    assert!(compilation.warnings[0].message.starts_with("guessing types entrypoint "));
    assert!(report.entry.ends_with("dist/index.d.ts"));
    assert!(read(root, "dist/sqs.d.ts").contains("./obvi-types/aws-cdk-lib/aws-sqs"));
}

#[test]
fn test_custom_out_folder() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    create_cdk_project(root);

    let plugin = DtsBundlePlugin::new(BundleOptions {
        entry: Some(PathBuf::from("dist/index.d.ts")),
        out: PathBuf::from("types/vendor"),
        ..Default::default()
    });
    let mut compilation = Compilation::new(root, "dist");
    plugin.after_emit(&mut compilation).unwrap();

    assert!(
        read(root, "dist/index.d.ts")
            .starts_with("export * as kms from \"./types/vendor/aws-cdk-lib/aws-kms\";")
    );
    assert!(root.join("dist/types/vendor/aws-cdk-lib/aws-sqs/index.d.ts").is_file());
}

#[test]
fn test_missing_output_reports_fatal_error() {
    let temp = TempDir::new().unwrap();

    let mut compilation = Compilation::new(temp.path(), "dist");
    assert!(DtsBundlePlugin::default().after_emit(&mut compilation).is_none());
    assert_eq!(compilation.errors.len(), 1);
    assert_eq!(
        compilation.errors[0].to_string(),
        "unable to determine entry point path"
    );
}
