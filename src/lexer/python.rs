//! Python tokenizer.
//!
//! Produces the token stream the block-structure parser consumes: logical
//! lines end in `Newline`, indentation changes become `Indent`/`Dedent`,
//! f-strings are split into their literal parts and the tokens of each
//! replacement field. The lexer never stops early; every problem is a
//! diagnostic and scanning resumes at the next byte.

use super::{StringFlavor, Token, TokenKind};
use crate::types::{Diagnostic, DiagnosticCode, Span};

/// Hard keywords. `match`, `case`, `type` and `_` are soft keywords and
/// stay identifiers.
pub const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

/// Longest first, so the first match wins.
const OPERATORS: &[&str] = &[
    "**=", "//=", ">>=", "<<=", "...", "->", ":=", "**", "//", "<<", ">>", "<=", ">=", "==", "!=",
    "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "@=", "+", "-", "*", "/", "%", "@", "&", "|",
    "^", "~", "<", ">", "(", ")", "[", "]", "{", "}", ",", ":", ";", ".", "=", "!",
];

/// Column-0 keywords that always start a new statement.
const SYNC_KEYWORDS: &[&str] = &["def", "class", "import", "from"];

const TAB_SIZE: usize = 8;
const MAX_FSTRING_DEPTH: usize = 32;

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

fn is_ident_start(c: char) -> bool {
    c == '_' || unicode_ident::is_xid_start(c)
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || unicode_ident::is_xid_continue(c)
}

fn starts_with_word(rest: &str, word: &str) -> bool {
    rest.starts_with(word)
        && rest[word.len()..]
            .chars()
            .next()
            .is_none_or(|c| !is_ident_continue(c))
}

/// Whether the physical line starting at `rest` opens with a top-level
/// definition or import keyword at column 0.
pub(crate) fn is_sync_line(rest: &str) -> bool {
    if SYNC_KEYWORDS.iter().any(|kw| starts_with_word(rest, kw)) {
        return true;
    }
    starts_with_word(rest, "async")
        && starts_with_word(rest[5..].trim_start_matches([' ', '\t']), "def")
}

#[derive(Debug, Clone, Copy)]
struct StringPrefix {
    raw: bool,
    bytes: bool,
    format: bool,
}

impl StringPrefix {
    const NONE: StringPrefix = StringPrefix {
        raw: false,
        bytes: false,
        format: false,
    };

    fn parse(word: &str) -> Option<Self> {
        let lower = word.to_ascii_lowercase();
        let (raw, bytes, format) = match lower.as_str() {
            "r" => (true, false, false),
            "u" => (false, false, false),
            "b" => (false, true, false),
            "f" => (false, false, true),
            "br" | "rb" => (true, true, false),
            "fr" | "rf" => (true, false, true),
            _ => return None,
        };
        Some(Self { raw, bytes, format })
    }

    fn flavor(&self) -> StringFlavor {
        match (self.raw, self.bytes) {
            (false, false) => StringFlavor::Plain,
            (true, false) => StringFlavor::Raw,
            (false, true) => StringFlavor::Bytes,
            (true, true) => StringFlavor::RawBytes,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Mark {
    pos: usize,
    line: usize,
    column: usize,
}

/// Indentation width measured with tabs at 8 columns and at 1 column.
/// Disagreement between the two orderings means tabs and spaces were mixed
/// ambiguously.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct IndentLevel {
    width: usize,
    raw: usize,
}

/// How a literal section of an f-string ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LiteralEnd {
    Closed,
    FieldEnd,
    Unterminated,
}

pub struct PythonLexer<'src> {
    source: &'src str,
    bytes: &'src [u8],
    pos: usize,
    /// Scanning stops here; lowered while an unterminated string is cut short
    limit: usize,
    line: usize,
    line_start: usize,
    tokens: Vec<Token>,
    diagnostics: Vec<Diagnostic>,
    indent_stack: Vec<IndentLevel>,
    brackets: Vec<(u8, Mark)>,
    at_line_start: bool,
    line_has_content: bool,
}

impl<'src> PythonLexer<'src> {
    pub fn new(source: &'src str) -> Self {
        let start = if source.starts_with('\u{feff}') { 3 } else { 0 };
        Self {
            source,
            bytes: source.as_bytes(),
            pos: start,
            limit: source.len(),
            line: 1,
            line_start: start,
            tokens: Vec::new(),
            diagnostics: Vec::new(),
            indent_stack: vec![IndentLevel::default()],
            brackets: Vec::new(),
            at_line_start: true,
            line_has_content: false,
        }
    }

    /// Tokenize the whole source. The last token is always `Eof`.
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<Diagnostic>) {
        while self.pos < self.bytes.len() {
            if self.at_line_start {
                self.at_line_start = false;
                self.handle_indentation();
                continue;
            }

            match self.bytes[self.pos] {
                b' ' | b'\t' | b'\x0c' | b'\r' => self.pos += 1,
                b'\n' => self.lex_newline(),
                b'#' => self.lex_comment(),
                b'\\' if self.is_line_continuation() => self.skip_line_continuation(),
                _ => {
                    self.lex_token(0);
                }
            }
        }
        self.finish()
    }

    fn finish(mut self) -> (Vec<Token>, Vec<Diagnostic>) {
        if let Some(&(open, mark)) = self.brackets.first() {
            self.error(
                DiagnosticCode::UnclosedBracket,
                format!("'{}' was never closed", open as char),
                self.span_at(mark, mark.pos + 1),
            );
        }
        let mark = self.mark();
        if self.line_has_content {
            self.push(TokenKind::Newline, mark);
        }
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.push(TokenKind::Dedent, mark);
        }
        self.push(TokenKind::Eof, mark);
        (self.tokens, self.diagnostics)
    }

    // ========================================================================
    // Lines and indentation
    // ========================================================================

    fn lex_newline(&mut self) {
        let mark = self.mark();
        self.pos += 1;

        if !self.brackets.is_empty() {
            self.new_line(self.pos);
            if is_sync_line(&self.source[self.pos..]) {
                if let Some(&(open, opener)) = self.brackets.first() {
                    self.error(
                        DiagnosticCode::UnclosedBracket,
                        format!("'{}' was never closed", open as char),
                        self.span_at(opener, opener.pos + 1),
                    );
                }
                self.brackets.clear();
                self.tokens.push(Token::new(
                    TokenKind::Newline,
                    "",
                    Span::new(mark.line, mark.line, mark.pos, mark.pos),
                    mark.column,
                ));
                self.line_has_content = false;
                self.at_line_start = true;
            }
            return;
        }

        if self.line_has_content {
            self.push(TokenKind::Newline, mark);
        }
        self.new_line(self.pos);
        self.at_line_start = true;
    }

    fn new_line(&mut self, line_start: usize) {
        self.line += 1;
        self.line_start = line_start;
    }

    fn is_line_continuation(&self) -> bool {
        match self.bytes.get(self.pos + 1) {
            Some(b'\n') => true,
            Some(b'\r') => self.bytes.get(self.pos + 2) == Some(&b'\n'),
            _ => false,
        }
    }

    fn skip_line_continuation(&mut self) {
        let skip = if self.bytes.get(self.pos + 1) == Some(&b'\r') { 3 } else { 2 };
        self.pos += skip;
        self.new_line(self.pos);
    }

    fn handle_indentation(&mut self) {
        let mark = self.mark();
        let mut level = IndentLevel::default();
        while let Some(b) = self.bytes.get(self.pos) {
            match b {
                b' ' => {
                    level.width += 1;
                    level.raw += 1;
                }
                b'\t' => {
                    level.width = (level.width / TAB_SIZE + 1) * TAB_SIZE;
                    level.raw += 1;
                }
                b'\x0c' => level = IndentLevel::default(),
                _ => break,
            }
            self.pos += 1;
        }

        // Blank and comment-only lines do not affect indentation
        match self.bytes.get(self.pos) {
            None | Some(b'\n') | Some(b'#') => return,
            Some(b'\r') if self.bytes.get(self.pos + 1) == Some(&b'\n') => return,
            Some(b'\\') if self.is_line_continuation() => return,
            _ => {}
        }

        let span = self.span_at(mark, self.pos);
        let top = self.current_indent();
        if level.width > top.width {
            if level.raw <= top.raw {
                self.warning(
                    DiagnosticCode::InconsistentIndentation,
                    "inconsistent use of tabs and spaces in indentation",
                    span,
                );
            }
            self.indent_stack.push(level);
            self.push(TokenKind::Indent, mark);
            return;
        }

        // Snap to the innermost open level that is at least this wide
        while self.indent_stack.len() > 1
            && self.indent_stack[self.indent_stack.len() - 2].width >= level.width
        {
            self.indent_stack.pop();
            let here = self.mark();
            self.tokens.push(Token::new(
                TokenKind::Dedent,
                "",
                Span::new(here.line, here.line, here.pos, here.pos),
                here.column,
            ));
        }

        let top = self.current_indent();
        if top.width != level.width {
            self.error(
                DiagnosticCode::UnindentMismatch,
                "unindent does not match any outer indentation level",
                span,
            );
        } else if top.raw != level.raw {
            self.warning(
                DiagnosticCode::InconsistentIndentation,
                "inconsistent use of tabs and spaces in indentation",
                span,
            );
        }
    }

    fn current_indent(&self) -> IndentLevel {
        self.indent_stack.last().copied().unwrap_or_default()
    }

    // ========================================================================
    // Tokens
    // ========================================================================

    fn lex_comment(&mut self) {
        let mark = self.mark();
        while let Some(b) = self.peek() {
            if b == b'\n' {
                break;
            }
            self.pos += 1;
        }
        let mut end = self.pos;
        if end > mark.pos && self.bytes[end - 1] == b'\r' {
            end -= 1;
        }
        let text = self.slice(mark.pos, end).to_string();
        self.tokens.push(Token::new(
            TokenKind::Comment,
            text,
            self.span_at(mark, end),
            mark.column,
        ));
    }

    /// Lex one token outside of whitespace. `depth` is the f-string nesting
    /// depth (0 outside f-strings). Returns the operator text when the token
    /// was an operator so callers can track brackets.
    fn lex_token(&mut self, depth: usize) -> Option<&'static str> {
        let mark = self.mark();
        let Some(ch) = self.current_char() else {
            // Not on a character boundary; should not happen, but never loop
            self.pos += 1;
            return None;
        };

        if is_ident_start(ch) {
            let end = self.scan_identifier(self.pos);
            let word = self.slice(self.pos, end);
            if matches!(self.bytes.get(end), Some(b'\'') | Some(b'"')) {
                if let Some(prefix) = StringPrefix::parse(word) {
                    self.pos = end;
                    self.lex_any_string(mark, prefix, depth);
                    return None;
                }
            }
            let kind = if is_keyword(word) {
                TokenKind::Keyword
            } else {
                TokenKind::Identifier
            };
            self.pos = end;
            self.push(kind, mark);
            return None;
        }

        let next_is_digit = self
            .bytes
            .get(self.pos + 1)
            .is_some_and(|b| b.is_ascii_digit());
        if ch.is_ascii_digit() || (ch == '.' && next_is_digit) {
            self.lex_number(mark);
            return None;
        }

        if ch == '\'' || ch == '"' {
            self.lex_any_string(mark, StringPrefix::NONE, depth);
            return None;
        }

        let rest = self.slice(self.pos, self.limit);
        if let Some(op) = OPERATORS.iter().copied().find(|op| rest.starts_with(op)) {
            self.pos += op.len();
            self.push(TokenKind::Operator, mark);
            if depth == 0 {
                self.track_bracket(op, mark);
            }
            return Some(op);
        }

        self.pos += ch.len_utf8();
        self.push(TokenKind::Unknown, mark);
        self.error(
            DiagnosticCode::UnknownCharacter,
            format!("invalid character '{}' (U+{:04X})", ch, ch as u32),
            self.span_at(mark, self.pos),
        );
        None
    }

    fn scan_identifier(&self, from: usize) -> usize {
        let rest = self.slice(from, self.limit);
        let len = rest
            .char_indices()
            .find(|&(_, c)| !is_ident_continue(c))
            .map_or(rest.len(), |(i, _)| i);
        from + len
    }

    fn lex_number(&mut self, mark: Mark) {
        let radix_prefixed = self.bytes.get(self.pos) == Some(&b'0')
            && matches!(
                self.bytes.get(self.pos + 1),
                Some(b'x' | b'X' | b'o' | b'O' | b'b' | b'B')
            );
        while let Some(b) = self.peek() {
            let exponent_sign = matches!(b, b'+' | b'-')
                && !radix_prefixed
                && matches!(self.bytes[self.pos - 1], b'e' | b'E');
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || exponent_sign {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.push(TokenKind::Number, mark);
    }

    fn track_bracket(&mut self, op: &str, mark: Mark) {
        let opener = match op {
            "(" | "[" | "{" => {
                self.brackets.push((op.as_bytes()[0], mark));
                return;
            }
            ")" => b'(',
            "]" => b'[',
            "}" => b'{',
            _ => return,
        };

        match self.brackets.iter().rposition(|(b, _)| *b == opener) {
            Some(idx) => {
                if idx + 1 != self.brackets.len() {
                    let (inner, _) = self.brackets[self.brackets.len() - 1];
                    self.error(
                        DiagnosticCode::UnmatchedBracket,
                        format!(
                            "closing '{}' does not match opening '{}'",
                            op,
                            inner as char
                        ),
                        self.span_at(mark, mark.pos + 1),
                    );
                }
                self.brackets.truncate(idx);
            }
            None => self.error(
                DiagnosticCode::UnmatchedBracket,
                format!("unmatched '{}'", op),
                self.span_at(mark, mark.pos + 1),
            ),
        }
    }

    // ========================================================================
    // Strings
    // ========================================================================

    fn lex_any_string(&mut self, mark: Mark, prefix: StringPrefix, depth: usize) {
        if !prefix.format {
            self.lex_string(mark, prefix);
        } else if depth >= MAX_FSTRING_DEPTH {
            self.error(
                DiagnosticCode::NestingTooDeep,
                "f-string nesting is too deep",
                self.span_at(mark, self.pos),
            );
            self.lex_string(mark, prefix);
        } else {
            self.lex_fstring(mark, depth + 1);
        }
    }

    /// Opaque string literal; `self.pos` is on the opening quote.
    fn lex_string(&mut self, mark: Mark, prefix: StringPrefix) {
        let quote = self.bytes[self.pos];
        let triple = self.is_triple(self.pos, quote);
        let body = self.pos + if triple { 3 } else { 1 };
        let (mut end, terminated) = self.scan_string_end(body, quote, triple);
        if !terminated && triple {
            end = self.cut_at_sync_line(mark.pos, end);
        }
        self.advance_to(end);
        let kind = if prefix.format {
            // Only reached past the f-string depth cap
            TokenKind::String(StringFlavor::Plain)
        } else {
            TokenKind::String(prefix.flavor())
        };
        self.push(kind, mark);
        if !terminated {
            self.error(
                DiagnosticCode::UnterminatedString,
                "unterminated string literal",
                self.span_at(mark, end),
            );
        }
    }

    fn is_triple(&self, at: usize, quote: u8) -> bool {
        self.bytes.get(at + 1) == Some(&quote) && self.bytes.get(at + 2) == Some(&quote)
    }

    /// Find the end of a string body. Returns the offset just past the
    /// closing quote and whether one was found.
    fn scan_string_end(&self, from: usize, quote: u8, triple: bool) -> (usize, bool) {
        let mut i = from;
        while i < self.limit {
            let b = self.bytes[i];
            if b == b'\\' {
                let skip = if self.bytes.get(i + 1) == Some(&b'\r')
                    && self.bytes.get(i + 2) == Some(&b'\n')
                {
                    3
                } else {
                    2
                };
                i += skip;
                continue;
            }
            if b == quote && (!triple || self.is_triple(i, quote)) {
                return (i + if triple { 3 } else { 1 }, true);
            }
            if b == b'\n' && !triple {
                let end = if i > from && self.bytes[i - 1] == b'\r' { i - 1 } else { i };
                return (end, false);
            }
            i += 1;
        }
        (self.limit, false)
    }

    /// An unterminated triple-quoted string stops before the first following
    /// line that starts a top-level definition or import.
    fn cut_at_sync_line(&self, start: usize, end: usize) -> usize {
        let mut i = start;
        while let Some(offset) = self.bytes[i..end].iter().position(|&b| b == b'\n') {
            let newline = i + offset;
            if is_sync_line(&self.source[newline + 1..]) {
                return newline;
            }
            i = newline + 1;
        }
        end
    }

    fn advance_to(&mut self, end: usize) {
        let end = end.min(self.bytes.len()).max(self.pos);
        let chunk = &self.bytes[self.pos..end];
        let newlines = bytecount::count(chunk, b'\n');
        if newlines > 0 {
            self.line += newlines;
            if let Some(last) = chunk.iter().rposition(|&b| b == b'\n') {
                self.line_start = self.pos + last + 1;
            }
        }
        self.pos = end;
    }

    // ========================================================================
    // f-strings
    // ========================================================================

    /// `self.pos` is on the opening quote of an f-string at nesting `depth`.
    fn lex_fstring(&mut self, mark: Mark, depth: usize) {
        let quote = self.bytes[self.pos];
        let triple = self.is_triple(self.pos, quote);
        let saved_limit = self.limit;
        if triple {
            let (end, terminated) = self.scan_string_end(self.pos + 3, quote, true);
            if !terminated {
                self.limit = self.cut_at_sync_line(mark.pos, end);
            }
        }

        self.pos += if triple { 3 } else { 1 };
        self.push(TokenKind::FStringStart, mark);

        let end = self.lex_fstring_literal(quote, triple, depth, false);
        if end != LiteralEnd::Closed {
            let here = self.mark();
            self.push(TokenKind::FStringEnd, here);
            self.error(
                DiagnosticCode::UnterminatedString,
                "unterminated f-string literal",
                self.span_at(mark, self.pos),
            );
        }
        self.limit = saved_limit;
    }

    fn closes_fstring(&self, quote: u8, triple: bool) -> bool {
        self.bytes.get(self.pos) == Some(&quote) && (!triple || self.is_triple(self.pos, quote))
    }

    /// Literal text of an f-string body or of a format spec.
    fn lex_fstring_literal(
        &mut self,
        quote: u8,
        triple: bool,
        depth: usize,
        in_format_spec: bool,
    ) -> LiteralEnd {
        let mut middle = self.mark();
        loop {
            let Some(b) = self.peek() else {
                self.flush_middle(middle);
                return LiteralEnd::Unterminated;
            };

            if self.closes_fstring(quote, triple) {
                self.flush_middle(middle);
                if in_format_spec {
                    return LiteralEnd::FieldEnd;
                }
                let mark = self.mark();
                self.pos += if triple { 3 } else { 1 };
                self.push(TokenKind::FStringEnd, mark);
                return LiteralEnd::Closed;
            }

            match b {
                // A backslash never escapes a replacement-field brace
                b'\\' if matches!(self.bytes.get(self.pos + 1), Some(b'{' | b'}')) => {
                    self.pos += 1;
                }
                b'\\' => {
                    let end = (self.pos + 2).min(self.limit);
                    self.advance_to(end);
                }
                b'{' if !in_format_spec && self.bytes.get(self.pos + 1) == Some(&b'{') => {
                    self.pos += 2;
                }
                b'{' => {
                    self.flush_middle(middle);
                    let mark = self.mark();
                    self.pos += 1;
                    self.push(TokenKind::Operator, mark);
                    self.lex_replacement_field(quote, triple, depth);
                    middle = self.mark();
                }
                b'}' if in_format_spec => {
                    self.flush_middle(middle);
                    return LiteralEnd::FieldEnd;
                }
                b'}' if self.bytes.get(self.pos + 1) == Some(&b'}') => self.pos += 2,
                b'\n' if !triple => {
                    self.flush_middle(middle);
                    return LiteralEnd::Unterminated;
                }
                b'\n' => {
                    self.pos += 1;
                    self.new_line(self.pos);
                }
                _ => self.pos += 1,
            }
        }
    }

    fn flush_middle(&mut self, from: Mark) {
        if self.pos > from.pos {
            self.push(TokenKind::FStringMiddle, from);
        }
    }

    /// Tokens of a `{...}` replacement field; the opening brace is already
    /// consumed. Stops after the matching `}`.
    fn lex_replacement_field(&mut self, quote: u8, triple: bool, depth: usize) {
        let mut nesting = 0usize;
        loop {
            let Some(b) = self.peek() else { return };
            match b {
                b' ' | b'\t' | b'\r' | b'\x0c' => self.pos += 1,
                b'\n' => {
                    if !triple {
                        return;
                    }
                    self.pos += 1;
                    self.new_line(self.pos);
                }
                b'#' if triple => self.lex_comment(),
                b'}' if nesting == 0 => {
                    let mark = self.mark();
                    self.pos += 1;
                    self.push(TokenKind::Operator, mark);
                    return;
                }
                b'!' if nesting == 0 && self.bytes.get(self.pos + 1) != Some(&b'=') => {
                    let mark = self.mark();
                    self.pos += 1;
                    self.push(TokenKind::Operator, mark);
                    let conversion = self.mark();
                    let end = self.scan_identifier(self.pos);
                    // The conversion letter names no binding
                    if end > self.pos {
                        self.pos = end;
                        self.push(TokenKind::Label, conversion);
                    }
                }
                b':' if nesting == 0 => {
                    let mark = self.mark();
                    self.pos += 1;
                    self.push(TokenKind::Operator, mark);
                    if self.lex_fstring_literal(quote, triple, depth, true)
                        != LiteralEnd::FieldEnd
                    {
                        return;
                    }
                    if self.closes_fstring(quote, triple) {
                        return;
                    }
                }
                _ => match self.lex_token(depth) {
                    Some("(" | "[" | "{") => nesting += 1,
                    Some(")" | "]" | "}") => nesting = nesting.saturating_sub(1),
                    _ => {}
                },
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn peek(&self) -> Option<u8> {
        if self.pos < self.limit {
            Some(self.bytes[self.pos])
        } else {
            None
        }
    }

    fn current_char(&self) -> Option<char> {
        self.source.get(self.pos..self.limit)?.chars().next()
    }

    fn slice(&self, start: usize, end: usize) -> &'src str {
        self.source.get(start..end).unwrap_or("")
    }

    fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            line: self.line,
            column: self.pos.saturating_sub(self.line_start),
        }
    }

    fn span_at(&self, mark: Mark, end: usize) -> Span {
        Span::new(mark.line, self.line.max(mark.line), mark.pos, end.max(mark.pos))
    }

    fn push(&mut self, kind: TokenKind, mark: Mark) {
        let text = self.slice(mark.pos, self.pos).to_string();
        let span = self.span_at(mark, self.pos);
        if !matches!(
            kind,
            TokenKind::Comment
                | TokenKind::Newline
                | TokenKind::Indent
                | TokenKind::Dedent
                | TokenKind::Eof
        ) {
            self.line_has_content = true;
        }
        self.tokens.push(Token::new(kind, text, span, mark.column));
    }

    fn error(&mut self, code: DiagnosticCode, message: impl Into<String>, span: Span) {
        self.diagnostics.push(Diagnostic::error(code, message, span));
    }

    fn warning(&mut self, code: DiagnosticCode, message: impl Into<String>, span: Span) {
        self.diagnostics
            .push(Diagnostic::warning(code, message, span));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lex(source: &str) -> (Vec<Token>, Vec<Diagnostic>) {
        PythonLexer::new(source).tokenize()
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).0.into_iter().map(|t| t.kind).collect()
    }

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_simple_statement() {
        let (tokens, diags) = lex("x = foo(1, 'a')\n");
        assert!(diags.is_empty());
        assert_eq!(
            texts(&tokens),
            vec!["x", "=", "foo", "(", "1", ",", "'a'", ")", "\n", ""]
        );
        assert_eq!(tokens[6].kind, TokenKind::String(StringFlavor::Plain));
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
    }

    #[test]
    fn test_indent_dedent() {
        use TokenKind::*;
        let k = kinds("if x:\n    y\n\n    # note\nz\n");
        assert_eq!(
            k,
            vec![
                Keyword, Identifier, Operator, Newline, Indent, Identifier, Newline, Comment,
                Dedent, Identifier, Newline, Eof
            ]
        );
    }

    #[test]
    fn test_dedents_at_eof() {
        let k = kinds("class A:\n    def f(self):\n        pass");
        let indents = k.iter().filter(|k| **k == TokenKind::Indent).count();
        let dedents = k.iter().filter(|k| **k == TokenKind::Dedent).count();
        assert_eq!(indents, 2);
        assert_eq!(dedents, 2);
        assert_eq!(k[k.len() - 4], TokenKind::Newline);
    }

    #[test]
    fn test_brackets_suppress_newlines() {
        let (tokens, diags) = lex("x = [\n    1,\n    2,\n]\ny = 2\n");
        assert!(diags.is_empty());
        let newlines = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Newline)
            .count();
        assert_eq!(newlines, 2);
        assert!(!tokens.iter().any(|t| t.kind == TokenKind::Indent));
    }

    #[test]
    fn test_line_continuation() {
        let (tokens, _) = lex("x = 1 + \\\n    2\n");
        assert_eq!(texts(&tokens), vec!["x", "=", "1", "+", "2", "\n", ""]);
        assert_eq!(tokens[4].line(), 2);
    }

    #[test]
    fn test_string_prefixes() {
        let (tokens, _) = lex("a = rb'x' + B\"y\" + u'z' + R'\\d'\n");
        let flavors: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t.kind {
                TokenKind::String(f) => Some(f),
                _ => None,
            })
            .collect();
        assert_eq!(
            flavors,
            vec![
                StringFlavor::RawBytes,
                StringFlavor::Bytes,
                StringFlavor::Plain,
                StringFlavor::Raw
            ]
        );
    }

    #[test]
    fn test_triple_quoted_spans_lines() {
        let (tokens, diags) = lex("s = \"\"\"one\ntwo\n\"\"\"\nt = 1\n");
        assert!(diags.is_empty());
        assert_eq!(tokens[2].span.start_line, 1);
        assert_eq!(tokens[2].span.end_line, 3);
        let t = tokens.iter().find(|t| t.text == "t").map(|t| t.line());
        assert_eq!(t, Some(4));
    }

    #[test]
    fn test_unicode_identifiers() {
        let (tokens, diags) = lex("café = naïve_変数\n");
        assert!(diags.is_empty());
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].text, "café");
        assert_eq!(tokens[2].text, "naïve_変数");
    }

    #[test]
    fn test_soft_keywords_are_identifiers() {
        let (tokens, _) = lex("match x:\n    case _:\n        pass\n");
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert!(tokens.iter().any(|t| t.is_ident("case")));
    }

    #[test]
    fn test_unknown_character_continues() {
        let (tokens, diags) = lex("x = 1 $ 2\ny = 3\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::UnknownCharacter);
        assert!(diags[0].recovered);
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Unknown));
        assert!(tokens.iter().any(|t| t.is_ident("y")));
    }

    #[test]
    fn test_unterminated_single_line_string() {
        let (tokens, diags) = lex("x = 'abc\ny = 1\n");
        assert_eq!(diags[0].code, DiagnosticCode::UnterminatedString);
        assert!(tokens.iter().any(|t| t.is_ident("y")));
    }

    #[test]
    fn test_unterminated_docstring_stops_at_definition() {
        let source = "def f():\n    \"\"\"never closed\n    body\n\ndef g():\n    pass\n";
        let (tokens, diags) = lex(source);
        assert!(
            diags
                .iter()
                .any(|d| d.code == DiagnosticCode::UnterminatedString)
        );
        let g = tokens.iter().position(|t| t.is_ident("g"));
        assert!(g.is_some());
        let def_before_g = g.and_then(|i| tokens.get(i - 1)).map(|t| t.column);
        assert_eq!(def_before_g, Some(0));
    }

    #[test]
    fn test_unclosed_bracket_resyncs_at_import() {
        let (tokens, diags) = lex("from x import (\nimport sys\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::UnclosedBracket);
        let import_idx = tokens.iter().rposition(|t| t.is_keyword("import"));
        let before = import_idx.map(|i| tokens[i - 1].kind);
        assert_eq!(before, Some(TokenKind::Newline));
    }

    #[test]
    fn test_unmatched_closer() {
        let (tokens, diags) = lex("x = [1, 2]]\ny = 1\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::UnmatchedBracket);
        assert!(tokens.iter().any(|t| t.is_ident("y")));
    }

    #[test]
    fn test_inconsistent_indentation_warns() {
        let (tokens, diags) = lex("if x:\n\ty = 1\n        z = 2\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::InconsistentIndentation);
        assert_eq!(diags[0].severity, crate::types::Severity::Warning);
        assert!(tokens.iter().any(|t| t.is_ident("z")));
    }

    #[test]
    fn test_unindent_mismatch_snaps() {
        let (tokens, diags) = lex("if x:\n    if y:\n        a\n      b\nc\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::UnindentMismatch);
        let indents = tokens.iter().filter(|t| t.kind == TokenKind::Indent).count();
        let dedents = tokens.iter().filter(|t| t.kind == TokenKind::Dedent).count();
        assert_eq!(indents, dedents);
    }

    #[test]
    fn test_fstring_tokens() {
        let (tokens, diags) = lex("s = f\"a {x!r:>{width}} b\"\n");
        assert!(diags.is_empty());
        let kinds: Vec<_> = tokens.iter().map(|t| (t.kind, t.text.as_str())).collect();
        assert_eq!(kinds[2], (TokenKind::FStringStart, "f\""));
        assert_eq!(kinds[3], (TokenKind::FStringMiddle, "a "));
        assert!(tokens.iter().any(|t| t.is_ident("x")));
        assert!(tokens.iter().any(|t| t.is_ident("width")));
        assert!(tokens.iter().any(|t| t.is(TokenKind::Label, "r")));
        assert!(!tokens.iter().any(|t| t.is_ident("r")));
        assert!(tokens.iter().any(|t| t.text == ">" && t.kind == TokenKind::FStringMiddle));
        assert!(tokens.iter().any(|t| t.kind == TokenKind::FStringEnd));
    }

    #[test]
    fn test_fstring_same_quote_nesting() {
        let (tokens, diags) = lex("s = f\"{d[\"key\"]} and {f\"{inner}\"}\"\n");
        assert!(diags.is_empty());
        assert!(tokens.iter().any(|t| t.is_ident("inner")));
        assert!(tokens.iter().any(|t| t.text == "\"key\""));
        let starts = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::FStringStart)
            .count();
        let ends = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::FStringEnd)
            .count();
        assert_eq!(starts, 2);
        assert_eq!(ends, 2);
    }

    #[test]
    fn test_fstring_escaped_braces() {
        let (tokens, _) = lex("s = f'{{literal}} {value}'\n");
        assert!(tokens.iter().any(|t| t.is_ident("value")));
        assert!(!tokens.iter().any(|t| t.is_ident("literal")));
    }

    #[test]
    fn test_fstring_nesting_limit() {
        let mut source = String::from("x = ");
        for _ in 0..40 {
            source.push_str("f'{");
        }
        source.push('1');
        for _ in 0..40 {
            source.push_str("}'");
        }
        source.push('\n');
        let (tokens, diags) = lex(&source);
        assert!(
            diags
                .iter()
                .any(|d| d.code == DiagnosticCode::NestingTooDeep)
        );
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
    }

    #[test]
    fn test_numbers() {
        let (tokens, _) = lex("n = 0x1F + 1_000 + 3.14e-10 + .5j\n");
        let numbers: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Number)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(numbers, vec!["0x1F", "1_000", "3.14e-10", ".5j"]);
    }

    #[test]
    fn test_columns_and_lines() {
        let (tokens, _) = lex("class A:\n    def f(self): pass\n");
        let def = tokens.iter().find(|t| t.is_keyword("def"));
        assert_eq!(def.map(|t| (t.line(), t.column)), Some((2, 4)));
    }
}
