//! Per-call configuration.

use serde::{Deserialize, Serialize};

/// Default cap on definition/block nesting.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 64;

/// Default input size guard (16 MiB).
pub const DEFAULT_MAX_INPUT_BYTES: usize = 16 * 1024 * 1024;

/// Options for a single distillation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistillOptions {
    /// Keep private symbols in the output tree
    pub include_private: bool,
    /// Keep import symbols in the output tree (the import report is unaffected)
    pub include_imports: bool,
    /// Keep docstrings and doc comments on symbols
    pub include_docstrings: bool,
    /// Nesting depth at which the parse is aborted with a structural error
    pub max_recursion_depth: usize,
    /// Inputs larger than this are rejected with a structural error
    pub max_input_bytes: usize,
}

impl Default for DistillOptions {
    fn default() -> Self {
        Self {
            include_private: true,
            include_imports: true,
            include_docstrings: true,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
        }
    }
}

impl DistillOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_include_private(mut self, include: bool) -> Self {
        self.include_private = include;
        self
    }

    pub fn with_include_imports(mut self, include: bool) -> Self {
        self.include_imports = include;
        self
    }

    pub fn with_include_docstrings(mut self, include: bool) -> Self {
        self.include_docstrings = include;
        self
    }

    /// True when [`crate::schema::strip`] has anything to remove.
    pub fn strips_output(&self) -> bool {
        !(self.include_private && self.include_imports && self.include_docstrings)
    }

    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth.max(1);
        self
    }

    pub fn with_max_input_bytes(mut self, bytes: usize) -> Self {
        self.max_input_bytes = bytes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let options = DistillOptions::new()
            .with_include_private(false)
            .with_include_docstrings(false)
            .with_max_recursion_depth(0)
            .with_max_input_bytes(1024);
        assert!(!options.include_private);
        assert!(options.include_imports);
        assert!(!options.include_docstrings);
        assert!(options.strips_output());
        assert!(!DistillOptions::default().strips_output());
        assert_eq!(options.max_recursion_depth, 1);
        assert_eq!(options.max_input_bytes, 1024);
    }
}
