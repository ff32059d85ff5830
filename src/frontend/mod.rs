//! Reading the textual form of the IR: source files, the lexer and the
//! parser, plus the symbol table every name in the IR is interned in.

use std::path::PathBuf;

use self::lexer::Span;

pub mod intern;
pub mod lexer;
pub mod parser;

#[derive(Debug)]
pub struct SourceFile {
    pub contents: String,
    pub origin: SourceFileOrigin,
}

impl SourceFile {
    pub fn new(contents: impl Into<String>, origin: SourceFileOrigin) -> Self {
        Self {
            contents: contents.into(),
            origin,
        }
    }

    pub fn value_of_span(&self, span: Span) -> &str {
        &self.contents[span.start..span.end]
    }

    /// 1-based line of the byte at `position`
    pub fn row_for_position(&self, position: usize) -> usize {
        self.contents[..position].matches('\n').count() + 1
    }

    /// 1-based column of the byte at `position`
    pub fn column_for_position(&self, position: usize) -> usize {
        let line_start = self.contents[..position]
            .rfind('\n')
            .map(|newline| newline + 1)
            .unwrap_or(0);

        self.contents[line_start..position].chars().count() + 1
    }

    /// The full line containing `position`, without its line break
    pub fn line_for_position(&self, position: usize) -> &str {
        let start = self.contents[..position]
            .rfind('\n')
            .map(|newline| newline + 1)
            .unwrap_or(0);
        let end = self.contents[position..]
            .find('\n')
            .map(|newline| position + newline)
            .unwrap_or(self.contents.len());

        &self.contents[start..end]
    }
}

#[derive(Debug)]
pub enum SourceFileOrigin {
    Memory,
    File(PathBuf),
}

impl core::fmt::Display for SourceFileOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFileOrigin::Memory => f.write_str("<memory>"),
            SourceFileOrigin::File(path) => f.write_fmt(format_args!("{}", path.display())),
        }
    }
}
