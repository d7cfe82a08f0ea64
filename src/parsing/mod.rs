//! Parsing module: lexer + parser per dialect, producing the shared syntax
//! tree and the token stream used by import-usage analysis.
//!
//! Python uses the hand-written lexer and block-structure parser. Rust and
//! TypeScript use tree-sitter for error-tolerant parsing and are lowered into
//! the same [`SyntaxNode`] schema.

pub mod python;
pub mod recovery;
pub mod rust;
pub(crate) mod treesitter;
pub mod typescript;

use crate::dialect::Dialect;
use crate::lexer::Token;
use crate::options::DistillOptions;
use crate::syntax::SyntaxNode;
use crate::types::Diagnostic;
use std::path::Path;

/// Everything the front end produced for one file.
#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub root: SyntaxNode,
    pub tokens: Vec<Token>,
    /// Lex diagnostics first, then parse and structural ones
    pub diagnostics: Vec<Diagnostic>,
}

/// Trait for language-specific parsers.
pub trait LanguageParser: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// File extensions this parser handles.
    fn extensions(&self) -> &[&str] {
        self.dialect().extensions()
    }

    /// Lex and parse `source`. Never fails: problems become diagnostics.
    fn parse(&self, source: &str, options: &DistillOptions) -> ParseOutput;
}

/// Python parser.
#[derive(Debug, Default)]
pub struct PythonParser;

impl PythonParser {
    pub fn new() -> Self {
        Self
    }
}

impl LanguageParser for PythonParser {
    fn dialect(&self) -> Dialect {
        Dialect::Python
    }

    fn parse(&self, source: &str, options: &DistillOptions) -> ParseOutput {
        let (tokens, mut diagnostics) = crate::lexer::python::PythonLexer::new(source).tokenize();
        let (root, parse_diagnostics) = python::parse(&tokens, source, options);
        diagnostics.extend(parse_diagnostics);
        ParseOutput {
            root,
            tokens,
            diagnostics,
        }
    }
}

/// Get the parser for a dialect.
pub fn parser_for(dialect: Dialect) -> Box<dyn LanguageParser> {
    match dialect {
        Dialect::Python => Box::new(PythonParser::new()),
        Dialect::Rust => Box::new(rust::RustParser::new()),
        Dialect::TypeScript => Box::new(typescript::TypeScriptParser::new_typescript()),
        Dialect::Tsx => Box::new(typescript::TypeScriptParser::new_tsx()),
    }
}

/// Get a parser for a file based on its extension.
pub fn parser_for_file(path: &Path) -> Option<Box<dyn LanguageParser>> {
    Dialect::from_path(path).map(parser_for)
}

/// Parse `source` as `dialect`.
pub fn parse_source(source: &str, dialect: Dialect, options: &DistillOptions) -> ParseOutput {
    parser_for(dialect).parse(source, options)
}
