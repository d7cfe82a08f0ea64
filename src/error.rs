//! Errors that stop a file before any tree is built.
//!
//! Everything that can be recovered from is reported as a
//! [`Diagnostic`](crate::types::Diagnostic) inside the result instead.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of the `distill` entry point.
#[derive(Debug, Error)]
pub enum DistillError {
    /// No dialect matches the language hint or the file extension
    #[error("Unsupported language: {requested}")]
    UnsupportedLanguage { requested: String },

    /// The file could not be read
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DistillError {
    pub fn unsupported(requested: impl Into<String>) -> Self {
        Self::UnsupportedLanguage {
            requested: requested.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DistillError::unsupported("cobol");
        assert_eq!(err.to_string(), "Unsupported language: cobol");

        let err = DistillError::Io {
            path: PathBuf::from("/nope/a.py"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("/nope/a.py"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
