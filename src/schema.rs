//! Versioned output contract.
//!
//! [`Distillation`] is what every consumer sees: the symbol tree, import
//! bindings and diagnostics for one file. Serialization is JSON via serde;
//! with the `schema` feature enabled, [`json_schema`] describes the same
//! contract as a JSON Schema document.

use crate::dialect::Dialect;
use crate::options::DistillOptions;
use crate::types::{Diagnostic, ImportBinding, Symbol, SymbolKind, Visibility};
use serde::{Deserialize, Serialize};

/// Bumped on any non-additive change to the output shape.
pub const SCHEMA_VERSION: &str = "1.0";

/// Result of distilling one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct Distillation {
    pub schema_version: String,
    /// Source path, when the input came from disk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub dialect: Dialect,
    pub root: Symbol,
    pub imports: Vec<ImportBinding>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Distillation {
    pub fn new(dialect: Dialect, root: Symbol) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            path: None,
            dialect,
            root,
            imports: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// True when a structural error cut the parse short.
    pub fn has_fatal(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_fatal)
    }

    /// Diagnostics the pipeline could not recover from.
    pub fn unrecovered(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.recovered)
    }

    /// Symbols directly below the module root.
    pub fn top_level(&self) -> &[Symbol] {
        &self.root.children
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Remove what `options` excludes from the tree: private symbols with their
/// subtrees (protected symbols stay), import symbols, and doc text.
pub fn strip(root: &mut Symbol, options: &DistillOptions) {
    let mut stack = vec![root];
    while let Some(symbol) = stack.pop() {
        if !options.include_docstrings {
            symbol.doc_comment = None;
        }
        symbol.children.retain(|c| {
            (options.include_private || c.visibility != Some(Visibility::Private))
                && (options.include_imports || c.kind != SymbolKind::Import)
        });
        stack.extend(symbol.children.iter_mut());
    }
}

// ============================================================================
// Projection
// ============================================================================

/// The part of a symbol a reference parser can also derive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProjectedSymbol {
    pub name: String,
    pub kind: ProjectedKind,
    pub depth: usize,
}

/// Definition kinds after folding methods and properties into functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectedKind {
    Class,
    Function,
}

/// Every class and callable in pre-order with its nesting depth.
pub fn project(root: &Symbol) -> Vec<ProjectedSymbol> {
    root.iter()
        .skip(1)
        .filter_map(|s| {
            let kind = match s.kind {
                SymbolKind::Class => ProjectedKind::Class,
                SymbolKind::Function | SymbolKind::Method | SymbolKind::Property => {
                    ProjectedKind::Function
                }
                _ => return None,
            };
            Some(ProjectedSymbol {
                name: s.name.clone(),
                kind,
                depth: s.depth(),
            })
        })
        .collect()
}

/// Top-level classes and functions only.
pub fn top_level_projection(root: &Symbol) -> Vec<ProjectedSymbol> {
    project(root).into_iter().filter(|p| p.depth == 0).collect()
}

/// JSON Schema of [`Distillation`].
#[cfg(feature = "schema")]
pub fn json_schema() -> serde_json::Value {
    let schema = schemars::schema_for!(Distillation);
    serde_json::to_value(&schema).unwrap_or(serde_json::Value::Null)
}
