//! Supported source dialects and their detection.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Closed set of languages the distiller understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Python,
    Rust,
    TypeScript,
    Tsx,
}

impl Dialect {
    pub const ALL: [Dialect; 4] = [
        Dialect::Python,
        Dialect::Rust,
        Dialect::TypeScript,
        Dialect::Tsx,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Python => "python",
            Dialect::Rust => "rust",
            Dialect::TypeScript => "typescript",
            Dialect::Tsx => "tsx",
        }
    }

    /// File extensions handled by this dialect.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Dialect::Python => &["py", "pyw", "pyi"],
            Dialect::Rust => &["rs"],
            Dialect::TypeScript => &["ts", "mts", "cts"],
            Dialect::Tsx => &["tsx"],
        }
    }

    /// Detect a dialect from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|d| d.extensions().contains(&ext.as_str()))
    }

    /// Detect a dialect from a file path.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Resolve a caller-supplied language hint.
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint.trim().to_lowercase().as_str() {
            "python" | "py" => Some(Dialect::Python),
            "rust" | "rs" => Some(Dialect::Rust),
            "typescript" | "ts" => Some(Dialect::TypeScript),
            "tsx" => Some(Dialect::Tsx),
            _ => None,
        }
    }

    /// Every extension handled by any dialect.
    pub fn all_extensions() -> impl Iterator<Item = &'static str> {
        Self::ALL.into_iter().flat_map(|d| d.extensions().iter().copied())
    }

    /// Whether block structure comes from indentation.
    pub fn is_indentation_significant(&self) -> bool {
        matches!(self, Dialect::Python)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
