//! Core types for the structural distiller.
//!
//! This module defines the output contract shared by every dialect:
//! - Symbols (the normalized, language-agnostic tree)
//! - Import bindings (produced by the import-usage analyzer)
//! - Diagnostics (accumulated by every pipeline stage)
//!
//! Field names and enumerations are part of the versioned schema; evolve them
//! additively only.

use serde::{Deserialize, Serialize};

// ============================================================================
// Locations
// ============================================================================

/// Source range of a syntax element. Lines are 1-based, bytes are offsets
/// into the source buffer (end exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct Span {
    pub start_line: usize,
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
}

impl Span {
    pub fn new(start_line: usize, end_line: usize, start_byte: usize, end_byte: usize) -> Self {
        Self {
            start_line,
            end_line,
            start_byte,
            end_byte,
        }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn cover(self, other: Span) -> Span {
        Span {
            start_line: self.start_line.min(other.start_line),
            end_line: self.end_line.max(other.end_line),
            start_byte: self.start_byte.min(other.start_byte),
            end_byte: self.end_byte.max(other.end_byte),
        }
    }

    pub fn contains_byte(&self, offset: usize) -> bool {
        offset >= self.start_byte && offset < self.end_byte
    }
}

// ============================================================================
// Symbols
// ============================================================================

/// Kind of a symbol in the normalized tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Module,
    Class,
    Function,
    Method,
    Property,
    Field,
    Import,
    Constant,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Class => "class",
            Self::Function => "function",
            Self::Method => "method",
            Self::Property => "property",
            Self::Field => "field",
            Self::Import => "import",
            Self::Constant => "constant",
        }
    }

    /// Functions, methods and properties: anything with a callable body.
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function | Self::Method | Self::Property)
    }
}

/// Visibility of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Protected => "protected",
            Self::Private => "private",
        }
    }
}

/// How a parameter binds its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// Before a `/` marker
    PositionalOnly,
    /// Positional-or-keyword
    Positional,
    /// After `*` or `*args`
    KeywordOnly,
    /// `*args`, Rust/TS rest parameters
    VarPositional,
    /// `**kwargs`
    VarKeyword,
}

/// A single parameter. Annotation and default are opaque source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct Parameter {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    pub kind: ParamKind,
}

/// Function/method signature information.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct Signature {
    pub parameters: Vec<Parameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
}

/// What an import symbol brings into scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ImportSpec {
    /// Module path as written, without leading relative dots
    pub module: String,
    /// Imported member, `*` for wildcards, `None` for whole-module imports
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Number of leading dots in a relative import
    #[serde(skip_serializing_if = "is_zero")]
    pub level: usize,
    pub is_wildcard: bool,
    /// Declared type-only (`import type` in TypeScript)
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub type_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard: Option<GuardKind>,
}

impl ImportSpec {
    /// The name this import binds in the importing scope.
    pub fn local_name(&self) -> &str {
        if let Some(alias) = &self.alias {
            return alias;
        }
        if let Some(name) = &self.name {
            return name;
        }
        // `import a.b.c` binds `a`
        self.module.split('.').next().unwrap_or(&self.module)
    }
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// A node in the normalized symbol tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct Symbol {
    pub kind: SymbolKind,
    pub name: String,
    /// Names of the enclosing symbols, outermost first (module root excluded)
    pub qualified_path: Vec<String>,
    /// Always set after visibility resolution, except on the module root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorators: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_comment: Option<String>,
    pub span: Span,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Symbol>,
    pub is_async: bool,
    pub is_generator: bool,
    pub is_abstract: bool,
    /// Base classes, implemented traits or extended interfaces
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<String>,
    /// Generic parameter list as written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_params: Option<String>,
    /// Declared type of a field or constant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_annotation: Option<String>,
    /// Initializer of a field or constant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import: Option<ImportSpec>,
}

impl Symbol {
    pub fn new(kind: SymbolKind, name: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            name: name.into(),
            qualified_path: Vec::new(),
            visibility: None,
            signature: None,
            decorators: Vec::new(),
            doc_comment: None,
            span,
            children: Vec::new(),
            is_async: false,
            is_generator: false,
            is_abstract: false,
            bases: Vec::new(),
            type_params: None,
            type_annotation: None,
            value: None,
            import: None,
        }
    }

    /// Find a direct child by name.
    pub fn child(&self, name: &str) -> Option<&Symbol> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Depth-first, pre-order iteration over this symbol and all descendants.
    pub fn iter(&self) -> SymbolIter<'_> {
        SymbolIter { stack: vec![self] }
    }

    /// Nesting depth of this symbol (0 for top-level definitions).
    pub fn depth(&self) -> usize {
        self.qualified_path.len()
    }
}

/// Pre-order iterator over a symbol tree.
pub struct SymbolIter<'a> {
    stack: Vec<&'a Symbol>,
}

impl<'a> Iterator for SymbolIter<'a> {
    type Item = &'a Symbol;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.children.iter().rev());
        Some(next)
    }
}

// ============================================================================
// Imports
// ============================================================================

/// Guard an import sits under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum GuardKind {
    /// `if TYPE_CHECKING:`
    TypeChecking,
    /// `if sys.version_info >= ...`
    Version,
    /// `if sys.platform == ...`
    Platform,
    /// `try: import x except ImportError:`
    TryExcept,
    /// Any other conditional block
    Other,
}

/// One name bound by an import statement, plus its usage verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ImportBinding {
    pub source_module: String,
    /// Imported member, `*` for wildcard imports
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imported_name: Option<String>,
    pub local_alias: String,
    pub is_used: bool,
    pub is_conditional: bool,
    pub is_type_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard: Option<GuardKind>,
    /// Nesting path of the scope the import lives in
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope: Vec<String>,
    pub span: Span,
}

impl ImportBinding {
    pub fn is_wildcard(&self) -> bool {
        self.imported_name.as_deref() == Some("*")
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Pipeline stage a diagnostic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Lex,
    Parse,
    Structural,
}

/// Stable machine-readable diagnostic code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticCode {
    // Lexer
    UnknownCharacter,
    UnterminatedString,
    InconsistentIndentation,
    UnindentMismatch,
    UnclosedBracket,
    UnmatchedBracket,
    NestingTooDeep,
    // Parser
    ExpectedToken,
    UnexpectedToken,
    MalformedParameters,
    UnexpectedIndent,
    DanglingDecorator,
    SyntaxError,
    // Structural
    RecursionLimit,
    InputTooLarge,
    ParserUnavailable,
}

impl DiagnosticCode {
    pub fn phase(&self) -> Phase {
        match self {
            Self::UnknownCharacter
            | Self::UnterminatedString
            | Self::InconsistentIndentation
            | Self::UnindentMismatch
            | Self::UnclosedBracket
            | Self::UnmatchedBracket
            | Self::NestingTooDeep => Phase::Lex,
            Self::ExpectedToken
            | Self::UnexpectedToken
            | Self::MalformedParameters
            | Self::UnexpectedIndent
            | Self::DanglingDecorator
            | Self::SyntaxError => Phase::Parse,
            Self::RecursionLimit | Self::InputTooLarge | Self::ParserUnavailable => {
                Phase::Structural
            }
        }
    }
}

/// A problem found while distilling a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub span: Span,
    /// True when the pipeline carried on past this problem
    pub recovered: bool,
}

impl Diagnostic {
    /// A recoverable error.
    pub fn error(code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            span,
            recovered: true,
        }
    }

    /// A recoverable warning.
    pub fn warning(code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            span,
            recovered: true,
        }
    }

    /// A structural error that aborted the file.
    pub fn fatal(code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            span,
            recovered: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.code.phase()
    }

    pub fn is_fatal(&self) -> bool {
        self.phase() == Phase::Structural
    }
}
