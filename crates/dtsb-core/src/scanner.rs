//! Top-level statement scanner for declaration files.
//!
//! This is not a TypeScript parser. It tokenizes just enough of the source
//! (comments, string and template literals, identifiers, punctuation) to find
//! the import and export declarations that sit at the top level of a file,
//! together with the byte span of each module specifier literal.
//!
//! Statements nested in braces (`declare module "x" { ... }`, namespaces) are
//! not reported, and neither are `import("x")` type queries or
//! `import x = require("x")` declarations.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

/// Half-open byte range into a source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// 1-based line and column for a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn of_offset(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let before = &source.as_bytes()[..offset];
        let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
        let line_start = before
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |idx| idx + 1);
        let column = source[line_start..offset].chars().count() + 1;
        Position { line, column }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Import,
    Export,
}

/// A module specifier string literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReference {
    /// Specifier text without the quotes.
    pub text: String,
    /// Span of the literal, quotes included.
    pub span: Span,
    /// Quote character used in the source (`"` or `'`).
    pub quote: char,
}

/// A top-level import or export declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleStatement {
    pub kind: StatementKind,
    pub span: Span,
    /// `None` for local export lists such as `export { a, b };`.
    pub specifier: Option<ModuleReference>,
}

/// A declaration file read from disk together with its module statements.
#[derive(Debug, Clone)]
pub struct DeclarationUnit {
    pub path: PathBuf,
    pub source: String,
    pub statements: Vec<ModuleStatement>,
}

impl DeclarationUnit {
    pub fn read(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read declaration file {}", path.display()))?;
        Self::parse(path, source)
    }

    pub fn parse(path: &Path, source: String) -> Result<Self> {
        let statements = scan_module_statements(&source)
            .with_context(|| format!("failed to scan {}", path.display()))?;
        Ok(DeclarationUnit {
            path: path.to_path_buf(),
            source,
            statements,
        })
    }

    /// Statements that carry a module specifier, in source order.
    pub fn references(&self) -> impl Iterator<Item = &ModuleReference> {
        self.statements
            .iter()
            .filter_map(|statement| statement.specifier.as_ref())
    }
}

/// Scan `source` and return its top-level import/export declarations in
/// source order.
pub fn scan_module_statements(source: &str) -> Result<Vec<ModuleStatement>> {
    let tokens = Lexer::new(source).tokenize()?;
    Ok(StatementCollector::new(source, &tokens).collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Ident,
    Str,
    Punct(u8),
    /// Numbers, templates, and anything else we never inspect.
    Other,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: TokenKind,
    span: Span,
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Lexer {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        self.skip_trivia()?;
        let start = self.pos;
        let Some(byte) = self.peek_at(0) else {
            return Ok(None);
        };

        let kind = match byte {
            b'"' | b'\'' => {
                self.skip_string(byte)?;
                TokenKind::Str
            }
            b'`' => {
                self.pos += 1;
                self.skip_template()?;
                TokenKind::Other
            }
            b'0'..=b'9' => {
                while self
                    .peek_at(0)
                    .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_')
                {
                    self.pos += 1;
                }
                TokenKind::Other
            }
            _ if is_ident_byte(byte) => {
                while self.peek_at(0).is_some_and(is_ident_byte) {
                    self.pos += 1;
                }
                TokenKind::Ident
            }
            _ => {
                self.pos += 1;
                TokenKind::Punct(byte)
            }
        };

        Ok(Some(Token {
            kind,
            span: Span::new(start, self.pos),
        }))
    }

    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match (self.peek_at(0), self.peek_at(1)) {
                (Some(b), _) if b.is_ascii_whitespace() => self.pos += 1,
                (Some(b'/'), Some(b'/')) => {
                    while self.peek_at(0).is_some_and(|b| b != b'\n') {
                        self.pos += 1;
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    let start = self.pos;
                    let Some(close) = self.source[self.pos + 2..].find("*/") else {
                        bail!("unterminated block comment at offset {}", start);
                    };
                    self.pos += 2 + close + 2;
                }
                _ => return Ok(()),
            }
        }
    }

    fn skip_string(&mut self, quote: u8) -> Result<()> {
        let start = self.pos;
        self.pos += 1;
        while let Some(byte) = self.peek_at(0) {
            match byte {
                b'\\' => self.pos += 2,
                b'\n' => break,
                _ if byte == quote => {
                    self.pos += 1;
                    return Ok(());
                }
                _ => self.pos += 1,
            }
        }
        bail!("unterminated string literal at offset {}", start)
    }

    /// Skip a template literal body; the opening backtick is already consumed.
    fn skip_template(&mut self) -> Result<()> {
        let start = self.pos.saturating_sub(1);
        while let Some(byte) = self.peek_at(0) {
            match byte {
                b'\\' => self.pos += 2,
                b'`' => {
                    self.pos += 1;
                    return Ok(());
                }
                b'$' if self.peek_at(1) == Some(b'{') => {
                    self.pos += 2;
                    self.skip_substitution()?;
                }
                _ => self.pos += 1,
            }
        }
        bail!("unterminated template literal at offset {}", start)
    }

    /// Skip a `${ ... }` substitution, nested literals included.
    fn skip_substitution(&mut self) -> Result<()> {
        let mut depth = 0usize;
        while let Some(token) = self.next_token()? {
            match token.kind {
                TokenKind::Punct(b'{') => depth += 1,
                TokenKind::Punct(b'}') if depth == 0 => return Ok(()),
                TokenKind::Punct(b'}') => depth -= 1,
                _ => {}
            }
        }
        bail!("unterminated template substitution")
    }
}

fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'$' || byte >= 0x80
}

struct StatementCollector<'a> {
    source: &'a str,
    tokens: &'a [Token],
}

impl<'a> StatementCollector<'a> {
    fn new(source: &'a str, tokens: &'a [Token]) -> Self {
        StatementCollector { source, tokens }
    }

    fn text(&self, index: usize) -> &'a str {
        let span = self.tokens[index].span;
        &self.source[span.start..span.end]
    }

    fn is_ident(&self, index: usize, name: &str) -> bool {
        index < self.tokens.len()
            && self.tokens[index].kind == TokenKind::Ident
            && self.text(index) == name
    }

    fn is_punct(&self, index: usize, punct: u8) -> bool {
        self.tokens
            .get(index)
            .is_some_and(|token| token.kind == TokenKind::Punct(punct))
    }

    fn is_string(&self, index: usize) -> bool {
        self.tokens
            .get(index)
            .is_some_and(|token| token.kind == TokenKind::Str)
    }

    fn collect(&self) -> Vec<ModuleStatement> {
        let mut statements = Vec::new();
        let mut depth = 0usize;
        let mut index = 0;

        while index < self.tokens.len() {
            let parsed = match self.tokens[index].kind {
                TokenKind::Punct(b'{') => {
                    depth += 1;
                    None
                }
                TokenKind::Punct(b'}') => {
                    depth = depth.saturating_sub(1);
                    None
                }
                TokenKind::Ident if depth == 0 && self.is_ident(index, "import") => {
                    self.import_declaration(index)
                }
                TokenKind::Ident if depth == 0 && self.is_ident(index, "export") => {
                    self.export_declaration(index)
                }
                _ => None,
            };

            match parsed {
                Some((statement, next)) => {
                    statements.push(statement);
                    index = next;
                }
                None => index += 1,
            }
        }

        statements
    }

    fn reference(&self, index: usize) -> ModuleReference {
        let span = self.tokens[index].span;
        let literal = &self.source[span.start..span.end];
        let quote = literal.chars().next().unwrap_or('"');
        ModuleReference {
            text: literal[1..literal.len() - 1].to_string(),
            span,
            quote,
        }
    }

    /// `import "x"`, `import ... from "x"`, `import type ... from "x"`.
    fn import_declaration(&self, start: usize) -> Option<(ModuleStatement, usize)> {
        let mut index = start + 1;
        if self.is_punct(index, b'(') || self.is_punct(index, b'.') {
            return None;
        }

        if !self.is_string(index) {
            loop {
                let token = self.tokens.get(index)?;
                match token.kind {
                    TokenKind::Punct(b'{') => index = self.skip_braces(index)?,
                    TokenKind::Punct(b';') | TokenKind::Punct(b'=') | TokenKind::Str => {
                        return None;
                    }
                    TokenKind::Ident if self.text(index) == "from" && self.is_string(index + 1) => {
                        index += 1;
                        break;
                    }
                    _ => index += 1,
                }
            }
        }

        let specifier = self.reference(index);
        let end = self.finish_statement(index + 1);
        Some((
            ModuleStatement {
                kind: StatementKind::Import,
                span: Span::new(self.tokens[start].span.start, self.end_offset(end)),
                specifier: Some(specifier),
            },
            end,
        ))
    }

    /// `export * from "x"`, `export * as ns from "x"`, `export { a } from "x"`,
    /// `export type { A } from "x"` and local `export { a };` lists.
    fn export_declaration(&self, start: usize) -> Option<(ModuleStatement, usize)> {
        let mut index = start + 1;
        if self.is_ident(index, "type")
            && (self.is_punct(index + 1, b'{') || self.is_punct(index + 1, b'*'))
        {
            index += 1;
        }

        if self.is_punct(index, b'*') {
            index += 1;
            if self.is_ident(index, "as") {
                index += 2;
            }
        } else if self.is_punct(index, b'{') {
            index = self.skip_braces(index)?;
        } else {
            return None;
        }

        let specifier = if self.is_ident(index, "from") && self.is_string(index + 1) {
            index += 1;
            let reference = self.reference(index);
            index += 1;
            Some(reference)
        } else {
            None
        };

        let end = self.finish_statement(index);
        Some((
            ModuleStatement {
                kind: StatementKind::Export,
                span: Span::new(self.tokens[start].span.start, self.end_offset(end)),
                specifier,
            },
            end,
        ))
    }

    /// Index just past the brace group opening at `index`.
    fn skip_braces(&self, index: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (offset, token) in self.tokens[index..].iter().enumerate() {
            match token.kind {
                TokenKind::Punct(b'{') => depth += 1,
                TokenKind::Punct(b'}') => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(index + offset + 1);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Consume import attributes (`with { ... }` / `assert { ... }`) and the
    /// trailing semicolon, returning the index of the next statement token.
    fn finish_statement(&self, mut index: usize) -> usize {
        if (self.is_ident(index, "with") || self.is_ident(index, "assert"))
            && self.is_punct(index + 1, b'{')
        {
            if let Some(next) = self.skip_braces(index + 1) {
                index = next;
            }
        }
        if self.is_punct(index, b';') {
            index += 1;
        }
        index
    }

    fn end_offset(&self, next: usize) -> usize {
        self.tokens[next - 1].span.end
    }
}

#[cfg(test)]
#[path = "tests/scanner_tests.rs"]
mod tests;
