#![allow(clippy::collapsible_if)]
#![allow(clippy::too_many_arguments)]

//! Code Distiller
//!
//! Extracts a language-agnostic structural summary from source files:
//! classes, functions, methods, properties, fields, constants and imports,
//! with visibility, signatures, decorators, docstrings and line anchors.
//!
//! # Pipeline
//!
//! 1. **Lexer**: Python has a hand-written tokenizer with indentation
//!    tracking; Rust and TypeScript derive tokens from tree-sitter leaves.
//! 2. **Parser**: block-structure parser under an error-recovery controller
//!    (Python) or tree-sitter lowering (Rust, TypeScript, TSX). Both produce
//!    the same [`SyntaxNode`](syntax::SyntaxNode) tree.
//! 3. **Symbol tree builder**: normalizes definitions into [`Symbol`]s.
//! 4. **Visibility resolver** and **import-usage analyzer**.
//! 5. **Schema layer**: the versioned [`Distillation`] output.
//!
//! Every stage is total: malformed input produces diagnostics and a partial
//! tree, never an error. Only unreadable files and unknown languages fail.
//!
//! # Usage
//!
//! ```no_run
//! use code_distiller::{distill, DistillOptions};
//! use std::path::Path;
//!
//! let result = distill(Path::new("app/models.py"), None, &DistillOptions::default())?;
//! for symbol in &result.root.children {
//!     println!("{} {}", symbol.kind.as_str(), symbol.name);
//! }
//! # Ok::<(), code_distiller::DistillError>(())
//! ```

pub mod builder;
pub mod dialect;
pub mod discovery;
pub mod error;
pub mod imports;
pub mod lexer;
pub mod options;
pub mod parsing;
pub mod schema;
pub mod syntax;
pub mod types;
pub mod visibility;

// Re-exports
pub use dialect::Dialect;
pub use discovery::FileDiscovery;
pub use error::DistillError;
pub use options::DistillOptions;
pub use schema::{Distillation, SCHEMA_VERSION};
pub use types::*;

use std::path::Path;
use tracing::{debug, warn};

/// Distill the file at `path`.
///
/// The dialect comes from `language_hint` when given (`"python"`, `"rs"`,
/// `"tsx"`, ...) and from the file extension otherwise.
pub fn distill(
    path: &Path,
    language_hint: Option<&str>,
    options: &DistillOptions,
) -> Result<Distillation, DistillError> {
    let dialect = match language_hint {
        Some(hint) => Dialect::from_hint(hint).ok_or_else(|| DistillError::unsupported(hint))?,
        None => Dialect::from_path(path).ok_or_else(|| {
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            DistillError::unsupported(ext)
        })?,
    };

    let bytes = std::fs::read(path).map_err(|source| DistillError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let source = String::from_utf8_lossy(&bytes);

    let mut result = distill_source(&source, dialect, options);
    if let Some(stem) = path.file_stem() {
        result.root.name = stem.to_string_lossy().into_owned();
    }
    result.path = Some(path.display().to_string());
    Ok(result)
}

/// Distill in-memory source text. Never fails; problems are reported as
/// diagnostics alongside whatever structure could be recovered.
pub fn distill_source(source: &str, dialect: Dialect, options: &DistillOptions) -> Distillation {
    if source.len() > options.max_input_bytes {
        warn!(
            bytes = source.len(),
            limit = options.max_input_bytes,
            "Input exceeds size limit"
        );
        let root = Symbol::new(SymbolKind::Module, "", Span::default());
        let mut result = Distillation::new(dialect, root);
        result.diagnostics.push(Diagnostic::fatal(
            DiagnosticCode::InputTooLarge,
            format!(
                "input is {} bytes, limit is {}",
                source.len(),
                options.max_input_bytes
            ),
            Span::default(),
        ));
        return result;
    }

    let output = parsing::parse_source(source, dialect, options);
    let mut diagnostics = output.diagnostics;

    let (mut root, build_diagnostics) = builder::build(&output.root, options);
    diagnostics.extend(build_diagnostics);

    visibility::resolve(&mut root);
    let imports = imports::analyze(&root, &output.tokens, dialect);
    if options.strips_output() {
        schema::strip(&mut root, options);
    }

    debug!(
        dialect = %dialect,
        tokens = output.tokens.len(),
        symbols = root.iter().count() - 1,
        imports = imports.len(),
        diagnostics = diagnostics.len(),
        "Distilled source"
    );

    let mut result = Distillation::new(dialect, root);
    result.imports = imports;
    result.diagnostics = diagnostics;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_distill_file_uses_extension() {
        let mut file = tempfile::Builder::new().suffix(".py").tempfile().unwrap();
        writeln!(file, "def main():\n    pass").unwrap();

        let result = distill(file.path(), None, &DistillOptions::default()).unwrap();
        assert_eq!(result.dialect, Dialect::Python);
        assert_eq!(result.root.children[0].name, "main");
        assert!(result.path.is_some());
        assert!(!result.root.name.is_empty());
    }

    #[test]
    fn test_hint_overrides_extension() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        writeln!(file, "pub fn run() {{}}").unwrap();

        let result = distill(file.path(), Some("rust"), &DistillOptions::default()).unwrap();
        assert_eq!(result.dialect, Dialect::Rust);
        assert_eq!(result.root.children[0].name, "run");

        let err = distill(file.path(), None, &DistillOptions::default()).unwrap_err();
        assert!(matches!(err, DistillError::UnsupportedLanguage { .. }));
    }

    #[test]
    fn test_unknown_hint_and_missing_file() {
        let options = DistillOptions::default();
        let err = distill(Path::new("a.py"), Some("cobol"), &options).unwrap_err();
        assert!(matches!(err, DistillError::UnsupportedLanguage { ref requested } if requested == "cobol"));

        let err = distill(Path::new("/definitely/not/here.py"), None, &options).unwrap_err();
        assert!(matches!(err, DistillError::Io { .. }));
    }

    #[test]
    fn test_input_too_large() {
        let options = DistillOptions::default().with_max_input_bytes(8);
        let result = distill_source("def f():\n    pass\n", Dialect::Python, &options);
        assert!(result.root.children.is_empty());
        assert!(result.has_fatal());
        assert_eq!(result.diagnostics[0].code, DiagnosticCode::InputTooLarge);
    }

    #[test]
    fn test_public_only() {
        let source = "class A:\n    def _p(self): pass\n    def __q(self): pass\n    def r(self): pass\n";
        let options = DistillOptions::default().with_include_private(false);
        let result = distill_source(source, Dialect::Python, &options);
        let names: Vec<&str> = result.root.children[0]
            .children
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["_p", "r"]);
    }
}
