//! Error recovery for the block-structure parser.
//!
//! On a parse error the controller reports one diagnostic and skips forward
//! to the next synchronization point: the end of the current logical line
//! plus any indented block hanging off it, or earlier at a column-0
//! definition/import keyword or a dedent. Errors raised at the very token
//! where the previous recovery resumed belong to the same region and are
//! not reported again.

use crate::lexer::{Token, TokenKind};
use crate::types::{Diagnostic, DiagnosticCode, Span};

/// A malformed construct found by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub code: DiagnosticCode,
    pub message: String,
    /// Index of the offending token
    pub at: usize,
}

impl ParseError {
    pub fn new(code: DiagnosticCode, message: impl Into<String>, at: usize) -> Self {
        Self {
            code,
            message: message.into(),
            at,
        }
    }
}

/// Where parsing resumes after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPoint {
    pub resume: usize,
    /// False when the scan ran into end of input
    pub found: bool,
}

#[derive(Debug, Default)]
pub struct Recovery {
    last_resume: Option<usize>,
    attempts: usize,
}

impl Recovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recoveries performed so far.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Record `error` and return the token index to resume from. The resume
    /// index is always past `start`, the first token of the failed statement.
    pub fn recover(
        &mut self,
        tokens: &[&Token],
        start: usize,
        error: ParseError,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> usize {
        let sync = find_sync_point(tokens, error.at.max(start));
        let repeated = self.last_resume == Some(error.at);

        if !repeated {
            let span = tokens
                .get(error.at)
                .or_else(|| tokens.last())
                .map(|t| t.span)
                .unwrap_or_default();
            let mut diagnostic = Diagnostic::error(error.code, error.message, span);
            diagnostic.recovered = sync.found;
            diagnostics.push(diagnostic);
        }

        self.resume_at(tokens, start, sync, repeated)
    }

    /// Skip a construct whose error the lexer already reported, without a
    /// second diagnostic.
    pub fn skip(&mut self, tokens: &[&Token], start: usize) -> usize {
        let sync = find_sync_point(tokens, start);
        self.resume_at(tokens, start, sync, true)
    }

    fn resume_at(&mut self, tokens: &[&Token], start: usize, sync: SyncPoint, repeated: bool) -> usize {
        let resume = sync.resume.max(start + 1).min(tokens.len().saturating_sub(1));
        tracing::trace!(
            from = start,
            to = resume,
            repeated,
            "Skipped malformed construct"
        );
        self.last_resume = Some(resume);
        self.attempts += 1;
        resume
    }
}

/// Column-0 tokens that always begin a new top-level statement.
pub fn is_sync_token(token: &Token) -> bool {
    if token.column != 0 {
        return false;
    }
    match token.kind {
        TokenKind::Keyword => matches!(
            token.text.as_str(),
            "class" | "def" | "import" | "from" | "async"
        ),
        TokenKind::Operator => token.text == "@",
        _ => false,
    }
}

/// Scan forward from `from` to the next synchronization point.
pub fn find_sync_point(tokens: &[&Token], from: usize) -> SyncPoint {
    let mut i = from;

    // Rest of the logical line
    loop {
        let Some(token) = tokens.get(i) else {
            return SyncPoint {
                resume: i,
                found: false,
            };
        };
        match token.kind {
            TokenKind::Eof => {
                return SyncPoint {
                    resume: i,
                    found: false,
                };
            }
            TokenKind::Newline => {
                i += 1;
                break;
            }
            TokenKind::Dedent => return SyncPoint { resume: i, found: true },
            _ if i > from && is_sync_token(token) => {
                return SyncPoint { resume: i, found: true };
            }
            _ => i += 1,
        }
    }

    // Indented block belonging to the malformed line
    if tokens.get(i).is_some_and(|t| t.kind == TokenKind::Indent) {
        let mut depth = 0usize;
        while let Some(token) = tokens.get(i) {
            match token.kind {
                TokenKind::Indent => depth += 1,
                TokenKind::Dedent => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        i += 1;
                        break;
                    }
                }
                TokenKind::Eof => {
                    return SyncPoint {
                        resume: i,
                        found: false,
                    };
                }
                _ => {}
            }
            i += 1;
        }
    }

    SyncPoint {
        resume: i,
        found: true,
    }
}

/// Span covering tokens `from..to`.
pub fn token_span(tokens: &[&Token], from: usize, to: usize) -> Span {
    match (tokens.get(from), to.checked_sub(1).and_then(|i| tokens.get(i))) {
        (Some(first), Some(last)) if to > from => first.span.cover(last.span),
        (Some(first), _) => first.span,
        _ => Span::default(),
    }
}
