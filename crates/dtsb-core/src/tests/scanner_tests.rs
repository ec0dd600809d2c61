use super::*;

fn specifiers(source: &str) -> Vec<Option<String>> {
    scan_module_statements(source)
        .expect("scan should succeed")
        .into_iter()
        .map(|statement| statement.specifier.map(|reference| reference.text))
        .collect()
}

#[test]
fn finds_import_forms() {
    let source = r#"
import "side-effect";
import * as core from "aws-cdk-lib";
import def, { a, b as c } from './local';
import type { T } from "types-only";
import { type U } from "mixed";
"#;

    assert_eq!(
        specifiers(source),
        vec![
            Some("side-effect".to_string()),
            Some("aws-cdk-lib".to_string()),
            Some("./local".to_string()),
            Some("types-only".to_string()),
            Some("mixed".to_string()),
        ]
    );
}

#[test]
fn finds_export_forms() {
    let source = r#"
export * from "./all";
export * as kms from "aws-cdk-lib/aws-kms";
export { default as sqs } from "./sqs";
export type { Props } from "./props";
export { kms, sqs };
"#;

    assert_eq!(
        specifiers(source),
        vec![
            Some("./all".to_string()),
            Some("aws-cdk-lib/aws-kms".to_string()),
            Some("./sqs".to_string()),
            Some("./props".to_string()),
            None,
        ]
    );
}

#[test]
fn specifier_span_covers_the_quoted_literal() {
    let source = "export * as kms from \"aws-cdk-lib/aws-kms\";\n";
    let statements = scan_module_statements(source).unwrap();
    let reference = statements[0].specifier.as_ref().unwrap();

    assert_eq!(
        &source[reference.span.start..reference.span.end],
        "\"aws-cdk-lib/aws-kms\""
    );
    assert_eq!(reference.quote, '"');
    assert_eq!(statements[0].span, Span::new(0, source.len() - 1));
}

#[test]
fn keeps_single_quote_style() {
    let statements = scan_module_statements("import x from 'lodash'").unwrap();
    assert_eq!(statements[0].specifier.as_ref().unwrap().quote, '\'');
}

#[test]
fn ignores_non_declaration_imports_and_exports() {
    let source = r#"
declare const x: import("./query").Thing;
declare const meta: typeof import.meta;
import fs = require("fs");
export declare class Queue {
}
export default _default;
export = Foo;
export as namespace Lib;
"#;

    assert!(specifiers(source).is_empty());
}

#[test]
fn ignores_statements_nested_in_blocks() {
    let source = r#"
declare module "augmented" {
    import { Inner } from "inner";
    export * from "nested";
}
export * from "outer";
"#;

    assert_eq!(specifiers(source), vec![Some("outer".to_string())]);
}

#[test]
fn skips_comments_strings_and_templates() {
    let source = r#"
// import { a } from "commented";
/* export * from "block"; */
declare const s: "import x from 'string'";
type T = `prefix-${string}-${`nested-${number}`}`;
type U = { [K in `a${"b" | "c"}`]: K };
export * from "real";
"#;

    assert_eq!(specifiers(source), vec![Some("real".to_string())]);
}

#[test]
fn handles_import_attributes() {
    let source = r#"import data from "./data.json" with { type: "json" };
export * from "after";
"#;

    assert_eq!(
        specifiers(source),
        vec![Some("./data.json".to_string()), Some("after".to_string())]
    );
}

#[test]
fn statement_without_semicolon_is_still_found() {
    let source = "import * as a from \"a\"\nexport * from \"b\"\n";
    assert_eq!(
        specifiers(source),
        vec![Some("a".to_string()), Some("b".to_string())]
    );
}

#[test]
fn unterminated_string_is_an_error() {
    let err = scan_module_statements("import x from \"broken\n").unwrap_err();
    assert!(err.to_string().contains("unterminated string literal"));
}

#[test]
fn unterminated_comment_is_an_error() {
    let err = scan_module_statements("/* never closed").unwrap_err();
    assert!(err.to_string().contains("unterminated block comment"));
}

#[test]
fn position_of_offset_is_one_based() {
    let source = "line one\nimport x from \"y\";\n";
    let offset = source.find('"').unwrap();
    assert_eq!(
        Position::of_offset(source, offset),
        Position { line: 2, column: 15 }
    );
    assert_eq!(Position::of_offset(source, 0), Position { line: 1, column: 1 });
}

#[test]
fn declaration_unit_lists_references() {
    let unit = DeclarationUnit::parse(
        Path::new("/virtual/index.d.ts"),
        "export { a };\nexport * from \"./b\";\n".to_string(),
    )
    .unwrap();

    assert_eq!(unit.statements.len(), 2);
    let texts: Vec<_> = unit.references().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["./b"]);
}
