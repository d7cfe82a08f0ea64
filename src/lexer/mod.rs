//! Tokenization.
//!
//! Python has a hand-written tokenizer ([`python::PythonLexer`]). The
//! tree-sitter dialects derive their token stream from the leaves of the
//! concrete syntax tree, so every dialect feeds the same [`Token`] schema to
//! the import-usage analyzer.

pub mod python;

use crate::dialect::Dialect;
use crate::types::{Diagnostic, Span};
use serde::Serialize;

/// Flavor of a non-interpolated string literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StringFlavor {
    Plain,
    Raw,
    Bytes,
    RawBytes,
}

/// Kind of a lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Identifier,
    /// Identifier that only names a member or field (never a reference)
    Label,
    Keyword,
    Operator,
    String(StringFlavor),
    FStringStart,
    FStringMiddle,
    FStringEnd,
    Number,
    Comment,
    Newline,
    Indent,
    Dedent,
    Unknown,
    Eof,
}

impl TokenKind {
    /// Tokens that carry no syntax.
    pub fn is_trivia(&self) -> bool {
        matches!(self, TokenKind::Comment)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, TokenKind::String(_))
    }
}

/// A token with its source text and location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
    /// 0-based byte column of the first byte
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span, column: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
            column,
        }
    }

    pub fn is(&self, kind: TokenKind, text: &str) -> bool {
        self.kind == kind && self.text == text
    }

    pub fn is_op(&self, text: &str) -> bool {
        self.is(TokenKind::Operator, text)
    }

    pub fn is_keyword(&self, text: &str) -> bool {
        self.is(TokenKind::Keyword, text)
    }

    /// Identifier with the given text (soft keywords are identifiers).
    pub fn is_ident(&self, text: &str) -> bool {
        self.is(TokenKind::Identifier, text)
    }

    pub fn line(&self) -> usize {
        self.span.start_line
    }
}

/// Tokenize `source` for `dialect`. Never fails: problems become diagnostics.
pub fn tokenize(source: &str, dialect: Dialect) -> (Vec<Token>, Vec<Diagnostic>) {
    match dialect {
        Dialect::Python => python::PythonLexer::new(source).tokenize(),
        Dialect::Rust | Dialect::TypeScript | Dialect::Tsx => {
            (crate::parsing::treesitter::tokenize(source, dialect), Vec::new())
        }
    }
}
