//! Python block-structure parser.
//!
//! Consumes the token stream from [`crate::lexer::python`] and builds the
//! shared [`SyntaxNode`] tree. Blocks are tracked on an explicit frame stack
//! (never native recursion), each frame carrying its [`BlockState`] and the
//! nesting path of the definitions that enclose it. Statement bodies that
//! carry no structure are skipped token by token; headers (`class`, `def`,
//! imports, compound statements) are parsed in full.

use super::recovery::{ParseError, Recovery, token_span};
use crate::lexer::{StringFlavor, Token, TokenKind};
use crate::options::DistillOptions;
use crate::syntax::{
    AssignmentData, BlockData, ClassHeader, FunctionHeader, NodeData, NodeKind, SyntaxNode,
    collapse_lines,
};
use crate::types::{
    Diagnostic, DiagnosticCode, GuardKind, ImportSpec, ParamKind, Parameter, Signature, Span,
};

/// Parser state of a block frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    TopLevel,
    InClassBody,
    InFunctionBody,
    InNestedBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainKind {
    If,
    Try,
    Loop,
}

/// Compound statement that a following `elif`/`else`/`except`/`finally`
/// continues.
#[derive(Debug, Clone, Copy)]
struct Chain {
    kind: ChainKind,
    guard: Option<GuardKind>,
}

struct Frame {
    node: SyntaxNode,
    state: BlockState,
    /// Nesting path for definitions inside this frame
    path: Vec<String>,
    /// Body is the rest of the header line
    inline: bool,
    expects_docstring: bool,
    is_generator: bool,
    /// Chain left behind by the last compound statement in this frame
    chain: Option<Chain>,
    /// Chain this frame leaves in its parent once closed
    chain_after: Option<Chain>,
}

impl Frame {
    fn new(node: SyntaxNode, state: BlockState, path: Vec<String>, inline: bool) -> Self {
        let expects_docstring = matches!(
            node.kind,
            NodeKind::Module | NodeKind::ClassDef | NodeKind::FunctionDef
        );
        Self {
            node,
            state,
            path,
            inline,
            expects_docstring,
            is_generator: false,
            chain: None,
            chain_after: None,
        }
    }
}

/// Parse a Python token stream into a module node.
pub fn parse(
    tokens: &[Token],
    source: &str,
    options: &DistillOptions,
) -> (SyntaxNode, Vec<Diagnostic>) {
    let significant: Vec<&Token> = tokens.iter().filter(|t| !t.kind.is_trivia()).collect();
    let end_line = tokens.last().map_or(1, |t| t.span.end_line);
    let eof = Token::new(
        TokenKind::Eof,
        "",
        Span::new(end_line, end_line, source.len(), source.len()),
        0,
    );
    Parser::new(&significant, &eof, source, options.max_recursion_depth).run()
}

struct Parser<'a> {
    tokens: &'a [&'a Token],
    eof: &'a Token,
    source: &'a str,
    pos: usize,
    frames: Vec<Frame>,
    recovery: Recovery,
    diagnostics: Vec<Diagnostic>,
    max_depth: usize,
    lambda_in_statement: bool,
    last_end: Option<Span>,
    aborted: bool,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [&'a Token], eof: &'a Token, source: &'a str, max_depth: usize) -> Self {
        Self {
            tokens,
            eof,
            source,
            pos: 0,
            frames: Vec::new(),
            recovery: Recovery::new(),
            diagnostics: Vec::new(),
            max_depth,
            lambda_in_statement: false,
            last_end: None,
            aborted: false,
        }
    }

    fn run(mut self) -> (SyntaxNode, Vec<Diagnostic>) {
        let module = SyntaxNode::module(Span::new(1, self.eof.span.end_line, 0, self.source.len()));
        self.frames
            .push(Frame::new(module, BlockState::TopLevel, Vec::new(), false));

        while !self.aborted {
            let token = self.peek();
            match token.kind {
                TokenKind::Eof => break,
                TokenKind::Newline => {
                    self.pos += 1;
                    self.close_inline_frames();
                }
                TokenKind::Dedent => {
                    self.pos += 1;
                    self.close_inline_frames();
                    if self.frames.len() > 1 {
                        self.close_frame();
                    }
                }
                TokenKind::Indent => self.unexpected_indent(),
                TokenKind::Operator if token.text == ";" => self.pos += 1,
                _ => self.statement(),
            }
        }

        if self.recovery.attempts() > 0 {
            tracing::debug!(
                recoveries = self.recovery.attempts(),
                "Recovered from malformed statements"
            );
        }
        self.finish()
    }

    fn finish(mut self) -> (SyntaxNode, Vec<Diagnostic>) {
        while self.frames.len() > 1 {
            self.close_frame();
        }
        let module = match self.frames.pop() {
            Some(frame) => frame.node,
            None => SyntaxNode::module(Span::default()),
        };
        (module, self.diagnostics)
    }

    // ========================================================================
    // Frames
    // ========================================================================

    fn top(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    fn current_path(&self) -> Vec<String> {
        self.frames
            .last()
            .map(|f| f.path.clone())
            .unwrap_or_default()
    }

    /// Innermost frame that is a definition or the module.
    fn scope_frame(&mut self) -> Option<&mut Frame> {
        self.frames
            .iter_mut()
            .rev()
            .find(|f| f.node.kind != NodeKind::Block)
    }

    fn push_frame(&mut self, node: SyntaxNode, state: BlockState, path: Vec<String>, inline: bool) -> bool {
        if self.frames.len() > self.max_depth {
            tracing::warn!(
                limit = self.max_depth,
                line = node.span.start_line,
                "Nesting depth limit reached, aborting parse"
            );
            self.diagnostics.push(Diagnostic::fatal(
                DiagnosticCode::RecursionLimit,
                format!("nesting deeper than {} levels", self.max_depth),
                node.span,
            ));
            self.aborted = true;
            return false;
        }
        self.frames.push(Frame::new(node, state, path, inline));
        true
    }

    fn close_frame(&mut self) {
        let Some(mut frame) = self.frames.pop() else {
            return;
        };
        if let Some(end) = self.last_end {
            if end.end_byte >= frame.node.span.start_byte {
                frame.node.span = frame.node.span.cover(end);
            }
        }
        if let NodeData::Function(header) = &mut frame.node.data {
            header.is_generator |= frame.is_generator;
        }
        let chain = frame.chain_after;
        if let Some(parent) = self.frames.last_mut() {
            parent.node.children.push(frame.node);
            parent.chain = chain;
        }
    }

    fn close_inline_frames(&mut self) {
        while self.frames.len() > 1 && self.frames.last().is_some_and(|f| f.inline) {
            self.close_frame();
        }
    }

    /// Open the body of a header that ends at the current position.
    fn open_body(
        &mut self,
        node: SyntaxNode,
        state: BlockState,
        name: Option<String>,
        chain_after: Option<Chain>,
    ) -> Result<(), ParseError> {
        let mut path = self.current_path();
        path.extend(name);

        let inline = if self.peek().kind == TokenKind::Newline {
            if self.peek_at(1).kind != TokenKind::Indent {
                return Err(ParseError::new(
                    DiagnosticCode::ExpectedToken,
                    "expected an indented block",
                    self.pos + 1,
                ));
            }
            self.pos += 2;
            false
        } else {
            true
        };

        if self.push_frame(node, state, path, inline) {
            if let Some(frame) = self.top() {
                frame.chain_after = chain_after;
            }
        }
        Ok(())
    }

    fn unexpected_indent(&mut self) {
        let token = self.peek();
        self.diagnostics.push(Diagnostic::error(
            DiagnosticCode::UnexpectedIndent,
            "unexpected indent",
            token.span,
        ));
        self.pos += 1;
        let node = SyntaxNode::new(
            token.span,
            self.current_path(),
            NodeData::Block(BlockData::default()),
        );
        let path = self.current_path();
        self.push_frame(node, BlockState::InNestedBlock, path, false);
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn statement(&mut self) {
        let start = self.pos;
        self.lambda_in_statement = false;
        let (chain, expects_docstring) = match self.top() {
            Some(frame) => (
                frame.chain.take(),
                std::mem::replace(&mut frame.expects_docstring, false),
            ),
            None => (None, false),
        };

        // The lexer already reported the stray character
        if self.peek().kind == TokenKind::Unknown {
            self.pos = self.recovery.skip(self.tokens, start);
            self.close_inline_frames();
            return;
        }

        if let Err(error) = self.parse_statement(chain, expects_docstring) {
            self.pos = self
                .recovery
                .recover(self.tokens, start, error, &mut self.diagnostics);
            self.close_inline_frames();
        }
        if self.pos == start {
            self.pos += 1;
        }
    }

    fn parse_statement(
        &mut self,
        chain: Option<Chain>,
        expects_docstring: bool,
    ) -> Result<(), ParseError> {
        let token = self.peek();
        if token.is_op("@") {
            return self.decorated();
        }

        match token.kind {
            TokenKind::Keyword => match token.text.as_str() {
                "class" => self.class_def(Vec::new(), self.pos),
                "def" => self.function_def(Vec::new(), self.pos),
                "async" => match self.peek_at(1).text.as_str() {
                    "def" => self.function_def(Vec::new(), self.pos),
                    "for" | "with" => self.compound(chain),
                    _ => Err(ParseError::new(
                        DiagnosticCode::UnexpectedToken,
                        "expected 'def', 'for' or 'with' after 'async'",
                        self.pos + 1,
                    )),
                },
                "import" => self.import_statement(),
                "from" => self.from_import(),
                "if" | "elif" | "else" | "for" | "while" | "try" | "except" | "finally"
                | "with" => self.compound(chain),
                _ => self.simple_statement(false),
            },
            TokenKind::Identifier
                if matches!(token.text.as_str(), "match" | "case") && self.is_soft_compound() =>
            {
                self.compound(chain)
            }
            _ => self.simple_statement(expects_docstring),
        }
    }

    /// `match`/`case` used as a statement keyword rather than a name.
    fn is_soft_compound(&self) -> bool {
        let next = self.peek_at(1);
        let name_use = match next.kind {
            TokenKind::Operator => {
                matches!(next.text.as_str(), "." | ":" | "," | ")" | "]" | "}" | ";")
                    || (next.text.ends_with('=') && !matches!(next.text.as_str(), "==" | "<=" | ">=" | "!="))
            }
            TokenKind::Newline | TokenKind::Eof => true,
            _ => false,
        };
        !name_use && self.header_colon(self.pos + 1).is_ok()
    }

    fn simple_statement(&mut self, expects_docstring: bool) -> Result<(), ParseError> {
        let start = self.pos;

        if expects_docstring {
            if let Some(end) = self.docstring_end(start) {
                let doc = (start..end)
                    .map(|i| string_literal_value(&self.tokens[i].text))
                    .collect::<String>();
                let span = token_span(self.tokens, start, end);
                self.jump_to(end);
                let path = self.current_path();
                if let Some(frame) = self.top() {
                    frame
                        .node
                        .children
                        .push(SyntaxNode::new(span, path, NodeData::Docstring(clean_doc(&doc))));
                }
                return Ok(());
            }
        }

        if self.assignments_allowed() && self.peek().kind == TokenKind::Identifier {
            if let Some(node) = self.assignment(start) {
                if let Some(frame) = self.top() {
                    frame.node.children.push(node);
                }
            }
        }

        while !self.at_statement_end(self.pos) {
            self.advance();
        }
        Ok(())
    }

    /// End of a statement made only of plain string literals.
    fn docstring_end(&self, start: usize) -> Option<usize> {
        let mut i = start;
        while let Some(token) = self.tokens.get(i) {
            match token.kind {
                TokenKind::String(StringFlavor::Plain | StringFlavor::Raw) => i += 1,
                _ => break,
            }
        }
        (i > start && self.at_statement_end(i)).then_some(i)
    }

    fn assignments_allowed(&self) -> bool {
        self.frames
            .iter()
            .rev()
            .find(|f| f.node.kind != NodeKind::Block)
            .is_some_and(|f| matches!(f.state, BlockState::TopLevel | BlockState::InClassBody))
    }

    /// `NAME = value`, `NAME: T = value` or `NAME: T` starting at `start`.
    fn assignment(&self, start: usize) -> Option<SyntaxNode> {
        let name = &self.tokens[start].text;
        let next = self.tokens.get(start + 1)?;
        let end = self.statement_end(start);

        let (annotation, value) = if next.is_op("=") {
            // Chained `a = b = 1` binds `a`; the value is everything after
            (None, self.text(start + 2, end))
        } else if next.is_op(":") {
            match self.find_top_level(start + 2, end, "=") {
                Some(eq) => (self.text(start + 2, eq), self.text(eq + 1, end)),
                None => (self.text(start + 2, end), None),
            }
        } else {
            return None;
        };

        let data = AssignmentData {
            name: name.clone(),
            annotation,
            value,
            declared_visibility: None,
            is_constant: false,
        };
        Some(SyntaxNode::new(
            token_span(self.tokens, start, end),
            self.current_path(),
            NodeData::Assignment(data),
        ))
    }

    // ========================================================================
    // Definitions
    // ========================================================================

    fn decorated(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        let mut decorators = Vec::new();

        while self.peek().is_op("@") {
            self.advance();
            let from = self.pos;
            while !self.at_statement_end(self.pos) {
                self.advance();
            }
            let Some(text) = self.text(from, self.pos) else {
                return Err(ParseError::new(
                    DiagnosticCode::ExpectedToken,
                    "expected decorator expression",
                    self.pos,
                ));
            };
            decorators.push(text);
            if self.peek().kind != TokenKind::Newline {
                return Err(ParseError::new(
                    DiagnosticCode::UnexpectedToken,
                    "expected newline after decorator",
                    self.pos,
                ));
            }
            self.advance();
        }

        let token = self.peek();
        if token.is_keyword("class") {
            self.class_def(decorators, start)
        } else if token.is_keyword("def")
            || (token.is_keyword("async") && self.peek_at(1).is_keyword("def"))
        {
            self.function_def(decorators, start)
        } else {
            Err(ParseError::new(
                DiagnosticCode::DanglingDecorator,
                "decorator is not followed by a class or function definition",
                self.pos,
            ))
        }
    }

    fn class_def(&mut self, decorators: Vec<String>, start: usize) -> Result<(), ParseError> {
        self.advance();
        let name = self.identifier("expected class name")?;

        let type_params = if self.peek().is_op("[") {
            Some(self.bracketed_text()?)
        } else {
            None
        };

        let mut bases = Vec::new();
        let mut keywords = Vec::new();
        if self.peek().is_op("(") {
            let close = self.matching_close(self.pos)?;
            for (from, to) in self.split_top_level(self.pos + 1, close) {
                let first = self.tokens[from];
                if first.is_op("*") || first.is_op("**") {
                    continue;
                }
                if first.kind == TokenKind::Identifier
                    && self.tokens.get(from + 1).is_some_and(|t| t.is_op("="))
                {
                    if let Some(value) = self.text(from + 2, to) {
                        keywords.push((first.text.clone(), value));
                    }
                } else if let Some(base) = self.text(from, to) {
                    bases.push(base);
                }
            }
            self.jump_to(close + 1);
        }

        self.expect_op(":", "expected ':' after class header")?;

        let header = ClassHeader {
            name: name.clone(),
            bases,
            keywords,
            type_params,
            decorators,
            ..ClassHeader::default()
        };
        let node = SyntaxNode::new(
            token_span(self.tokens, start, self.pos),
            self.current_path(),
            NodeData::Class(header),
        );
        self.open_body(node, BlockState::InClassBody, Some(name), None)
    }

    fn function_def(&mut self, decorators: Vec<String>, start: usize) -> Result<(), ParseError> {
        let is_async = self.peek().is_keyword("async");
        if is_async {
            self.advance();
        }
        self.advance();
        let name = self.identifier("expected function name")?;

        let type_params = if self.peek().is_op("[") {
            Some(self.bracketed_text()?)
        } else {
            None
        };

        if !self.peek().is_op("(") {
            return Err(ParseError::new(
                DiagnosticCode::ExpectedToken,
                "expected '(' after function name",
                self.pos,
            ));
        }
        let close = self.matching_close(self.pos)?;
        let parameters = self.parameters(self.pos + 1, close)?;
        self.jump_to(close + 1);

        let return_type = if self.peek().is_op("->") {
            self.advance();
            let colon = self.header_colon(self.pos)?;
            let text = self.text(self.pos, colon);
            self.jump_to(colon);
            text
        } else {
            None
        };

        self.expect_op(":", "expected ':' after function signature")?;

        let header = FunctionHeader {
            name: name.clone(),
            signature: Signature {
                parameters,
                return_type,
            },
            type_params,
            decorators,
            is_async,
            ..FunctionHeader::default()
        };
        let node = SyntaxNode::new(
            token_span(self.tokens, start, self.pos),
            self.current_path(),
            NodeData::Function(header),
        );
        self.open_body(node, BlockState::InFunctionBody, Some(name), None)
    }

    fn parameters(&self, from: usize, to: usize) -> Result<Vec<Parameter>, ParseError> {
        let mut params: Vec<Parameter> = Vec::new();
        let mut keyword_only = false;

        for (a, b) in self.split_top_level(from, to) {
            let first = self.tokens[a];
            if b == a + 1 && first.is_op("/") {
                for p in params.iter_mut() {
                    if p.kind == ParamKind::Positional {
                        p.kind = ParamKind::PositionalOnly;
                    }
                }
                continue;
            }
            if b == a + 1 && first.is_op("*") {
                keyword_only = true;
                continue;
            }

            let (kind, name_at) = if first.is_op("*") {
                keyword_only = true;
                (ParamKind::VarPositional, a + 1)
            } else if first.is_op("**") {
                (ParamKind::VarKeyword, a + 1)
            } else if keyword_only {
                (ParamKind::KeywordOnly, a)
            } else {
                (ParamKind::Positional, a)
            };

            let malformed = |at: usize| {
                ParseError::new(
                    DiagnosticCode::MalformedParameters,
                    "malformed parameter list",
                    at,
                )
            };
            let name = match self.tokens.get(name_at) {
                Some(t) if name_at < b && t.kind == TokenKind::Identifier => t.text.clone(),
                _ => return Err(malformed(name_at.min(b))),
            };

            let mut i = name_at + 1;
            let mut annotation = None;
            let mut default = None;
            if i < b && self.tokens[i].is_op(":") {
                let end = self.find_top_level(i + 1, b, "=").unwrap_or(b);
                annotation = Some(self.text(i + 1, end).ok_or_else(|| malformed(i))?);
                i = end;
            }
            if i < b && self.tokens[i].is_op("=") {
                default = Some(self.text(i + 1, b).ok_or_else(|| malformed(i))?);
                i = b;
            }
            if i != b {
                return Err(malformed(i));
            }

            params.push(Parameter {
                name,
                annotation,
                default,
                kind,
            });
        }
        Ok(params)
    }

    // ========================================================================
    // Imports
    // ========================================================================

    fn import_statement(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        self.advance();
        let guard = self.import_guard();
        let mut specs = Vec::new();

        loop {
            let module = self.dotted_name("expected module name")?;
            let alias = self.alias()?;
            specs.push(ImportSpec {
                module,
                name: None,
                alias,
                level: 0,
                is_wildcard: false,
                type_only: false,
                guard,
            });
            if !self.peek().is_op(",") {
                break;
            }
            self.advance();
        }

        self.finish_import(start, specs)
    }

    fn from_import(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        self.advance();
        let guard = self.import_guard();

        let mut level = 0;
        loop {
            let token = self.peek();
            if token.is_op(".") || token.is_op("...") {
                level += token.text.len();
                self.advance();
            } else {
                break;
            }
        }

        let module = if self.peek().kind == TokenKind::Identifier || level == 0 {
            self.dotted_name("expected module name")?
        } else {
            String::new()
        };

        if !self.peek().is_keyword("import") {
            return Err(ParseError::new(
                DiagnosticCode::ExpectedToken,
                "expected 'import'",
                self.pos,
            ));
        }
        self.advance();

        let spec = |name: String, alias: Option<String>, is_wildcard: bool| ImportSpec {
            module: module.clone(),
            name: Some(name),
            alias,
            level,
            is_wildcard,
            type_only: false,
            guard,
        };

        let mut specs = Vec::new();
        if self.peek().is_op("*") {
            self.advance();
            specs.push(spec("*".to_string(), None, true));
        } else {
            let parenthesized = self.peek().is_op("(");
            if parenthesized {
                self.advance();
            }
            loop {
                if parenthesized && self.peek().is_op(")") {
                    break;
                }
                let name = self.identifier("expected name to import")?;
                let alias = self.alias()?;
                specs.push(spec(name, alias, false));
                if !self.peek().is_op(",") {
                    break;
                }
                self.advance();
            }
            if parenthesized {
                self.expect_op(")", "expected ')' to close import list")?;
            }
            if specs.is_empty() {
                return Err(ParseError::new(
                    DiagnosticCode::ExpectedToken,
                    "expected name to import",
                    self.pos,
                ));
            }
        }

        self.finish_import(start, specs)
    }

    fn finish_import(&mut self, start: usize, specs: Vec<ImportSpec>) -> Result<(), ParseError> {
        if !self.at_statement_end(self.pos) {
            return Err(ParseError::new(
                DiagnosticCode::UnexpectedToken,
                format!("unexpected '{}' in import statement", self.peek().text),
                self.pos,
            ));
        }
        let node = SyntaxNode::new(
            token_span(self.tokens, start, self.pos),
            self.current_path(),
            NodeData::Import(specs),
        );
        if let Some(frame) = self.top() {
            frame.node.children.push(node);
        }
        Ok(())
    }

    fn alias(&mut self) -> Result<Option<String>, ParseError> {
        if !self.peek().is_keyword("as") {
            return Ok(None);
        }
        self.advance();
        self.identifier("expected name after 'as'").map(Some)
    }

    fn dotted_name(&mut self, message: &str) -> Result<String, ParseError> {
        let mut name = self.identifier(message)?;
        while self.peek().is_op(".") && self.peek_at(1).kind == TokenKind::Identifier {
            self.advance();
            name.push('.');
            name.push_str(&self.advance().text);
        }
        Ok(name)
    }

    /// Guard of the innermost conditional block around the current position
    /// within the current definition. A type-checking guard anywhere wins.
    fn import_guard(&self) -> Option<GuardKind> {
        let mut innermost = None;
        for frame in self.frames.iter().rev() {
            let NodeData::Block(block) = &frame.node.data else {
                break;
            };
            match block.guard {
                Some(GuardKind::TypeChecking) => return Some(GuardKind::TypeChecking),
                Some(guard) if innermost.is_none() => innermost = Some(guard),
                _ => {}
            }
        }
        innermost
    }

    // ========================================================================
    // Compound statements
    // ========================================================================

    fn compound(&mut self, chain: Option<Chain>) -> Result<(), ParseError> {
        let start = self.pos;
        if self.peek().is_keyword("async") {
            self.advance();
        }
        let keyword = self.advance().text.clone();
        let colon = self.header_colon(self.pos)?;
        let tokens = self.tokens;
        let condition = &tokens[self.pos..colon];

        let unexpected = |what: &str| {
            Err(ParseError::new(
                DiagnosticCode::UnexpectedToken,
                format!("'{}' without a matching statement", what),
                start,
            ))
        };
        let chain_kind = chain.map(|c| c.kind);

        let (guard, chain_after) = match keyword.as_str() {
            "if" => {
                let guard = Some(classify_guard(condition));
                (guard, Some(ChainKind::If))
            }
            "elif" => {
                let Some(Chain {
                    kind: ChainKind::If,
                    guard: previous,
                }) = chain
                else {
                    return unexpected("elif");
                };
                let guard = match classify_guard(condition) {
                    GuardKind::Other => continuation_guard(previous),
                    own => Some(own),
                };
                (guard, Some(ChainKind::If))
            }
            "else" => match chain {
                Some(Chain {
                    kind: ChainKind::If,
                    guard,
                }) => (continuation_guard(guard), None),
                Some(Chain {
                    kind: ChainKind::Try,
                    ..
                }) => (Some(GuardKind::TryExcept), Some(ChainKind::Try)),
                Some(Chain {
                    kind: ChainKind::Loop,
                    ..
                }) => (None, None),
                None => return unexpected("else"),
            },
            "except" if chain_kind == Some(ChainKind::Try) => {
                (Some(GuardKind::TryExcept), Some(ChainKind::Try))
            }
            "finally" if chain_kind == Some(ChainKind::Try) => (None, None),
            "except" | "finally" => return unexpected(&keyword),
            "try" => (Some(GuardKind::TryExcept), Some(ChainKind::Try)),
            "match" | "case" => (Some(GuardKind::Other), None),
            "for" | "while" => (None, Some(ChainKind::Loop)),
            _ => (None, None),
        };

        self.jump_to(colon + 1);
        let node = SyntaxNode::new(
            token_span(self.tokens, start, self.pos),
            self.current_path(),
            NodeData::Block(BlockData { keyword, guard }),
        );
        let chain_after = chain_after.map(|kind| Chain { kind, guard });
        self.open_body(node, BlockState::InNestedBlock, None, chain_after)
    }

    // ========================================================================
    // Token helpers
    // ========================================================================

    fn peek(&self) -> &'a Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &'a Token {
        self.tokens
            .get(self.pos + offset)
            .copied()
            .unwrap_or(self.eof)
    }

    fn advance(&mut self) -> &'a Token {
        let token = self.peek();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        match token.kind {
            TokenKind::Keyword if token.text == "lambda" => self.lambda_in_statement = true,
            TokenKind::Keyword if token.text == "yield" && !self.lambda_in_statement => {
                if let Some(frame) = self.scope_frame() {
                    if frame.state == BlockState::InFunctionBody {
                        frame.is_generator = true;
                    }
                }
            }
            _ => {}
        }
        if !matches!(
            token.kind,
            TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent | TokenKind::Eof
        ) {
            self.last_end = Some(token.span);
        }
        token
    }

    fn jump_to(&mut self, index: usize) {
        while self.pos < index && self.pos < self.tokens.len() {
            self.advance();
        }
    }

    fn identifier(&mut self, message: &str) -> Result<String, ParseError> {
        let token = self.peek();
        if token.kind != TokenKind::Identifier {
            return Err(ParseError::new(
                DiagnosticCode::ExpectedToken,
                message,
                self.pos,
            ));
        }
        self.advance();
        Ok(token.text.clone())
    }

    fn expect_op(&mut self, op: &str, message: &str) -> Result<(), ParseError> {
        if !self.peek().is_op(op) {
            return Err(ParseError::new(
                DiagnosticCode::ExpectedToken,
                message,
                self.pos,
            ));
        }
        self.advance();
        Ok(())
    }

    fn at_statement_end(&self, index: usize) -> bool {
        match self.tokens.get(index) {
            None => true,
            Some(t) => {
                matches!(
                    t.kind,
                    TokenKind::Newline | TokenKind::Eof | TokenKind::Indent | TokenKind::Dedent
                ) || t.is_op(";")
            }
        }
    }

    fn statement_end(&self, from: usize) -> usize {
        let mut i = from;
        while !self.at_statement_end(i) {
            i += 1;
        }
        i
    }

    /// Index of the bracket closing the one at `open`, on the same logical
    /// line.
    fn matching_close(&self, open: usize) -> Result<usize, ParseError> {
        let mut depth = 0usize;
        let mut i = open;
        while let Some(token) = self.tokens.get(i) {
            match token.kind {
                TokenKind::Operator => match token.text.as_str() {
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" => {
                        depth = depth.saturating_sub(1);
                        if depth == 0 {
                            return Ok(i);
                        }
                    }
                    _ => {}
                },
                TokenKind::Newline | TokenKind::Eof | TokenKind::Indent | TokenKind::Dedent => break,
                _ => {}
            }
            i += 1;
        }
        let open_text = self.tokens.get(open).map_or("(", |t| t.text.as_str());
        Err(ParseError::new(
            DiagnosticCode::ExpectedToken,
            format!("'{}' was never closed", open_text),
            i,
        ))
    }

    /// Text between a bracket at the current position and its closer; moves
    /// past the closer.
    fn bracketed_text(&mut self) -> Result<String, ParseError> {
        let close = self.matching_close(self.pos)?;
        let text = self.text(self.pos, close + 1).unwrap_or_default();
        self.jump_to(close + 1);
        Ok(text)
    }

    /// The `:` ending a compound-statement header starting at `from`.
    fn header_colon(&self, from: usize) -> Result<usize, ParseError> {
        let mut depth = 0usize;
        let mut lambdas = 0usize;
        let mut i = from;
        while let Some(token) = self.tokens.get(i) {
            match token.kind {
                TokenKind::Newline | TokenKind::Eof | TokenKind::Indent | TokenKind::Dedent => break,
                TokenKind::Keyword if token.text == "lambda" && depth == 0 => lambdas += 1,
                TokenKind::Operator => match token.text.as_str() {
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" => depth = depth.saturating_sub(1),
                    ":" if depth == 0 => {
                        if lambdas == 0 {
                            return Ok(i);
                        }
                        lambdas -= 1;
                    }
                    ";" if depth == 0 => break,
                    _ => {}
                },
                _ => {}
            }
            i += 1;
        }
        Err(ParseError::new(
            DiagnosticCode::ExpectedToken,
            "expected ':'",
            i,
        ))
    }

    /// Split `from..to` at commas outside brackets; empty segments dropped.
    fn split_top_level(&self, from: usize, to: usize) -> Vec<(usize, usize)> {
        let mut segments = Vec::new();
        let mut depth = 0usize;
        let mut segment_start = from;
        for i in from..to {
            let token = self.tokens[i];
            if token.kind != TokenKind::Operator {
                continue;
            }
            match token.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth = depth.saturating_sub(1),
                "," if depth == 0 => {
                    if i > segment_start {
                        segments.push((segment_start, i));
                    }
                    segment_start = i + 1;
                }
                _ => {}
            }
        }
        if to > segment_start {
            segments.push((segment_start, to));
        }
        segments
    }

    fn find_top_level(&self, from: usize, to: usize, op: &str) -> Option<usize> {
        let mut depth = 0usize;
        for i in from..to {
            let token = self.tokens[i];
            if token.kind != TokenKind::Operator {
                continue;
            }
            match token.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth = depth.saturating_sub(1),
                t if t == op && depth == 0 => return Some(i),
                _ => {}
            }
        }
        None
    }

    /// Source text of tokens `from..to` with line breaks collapsed.
    fn text(&self, from: usize, to: usize) -> Option<String> {
        if from >= to {
            return None;
        }
        let first = self.tokens.get(from)?;
        let last = self.tokens.get(to - 1)?;
        let raw = self
            .source
            .get(first.span.start_byte..last.span.end_byte)?;
        let text = collapse_lines(raw).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Classify the condition of an `if` statement.
pub fn classify_guard(condition: &[&Token]) -> GuardKind {
    let negated = condition.first().is_some_and(|t| t.is_keyword("not"));
    if condition.iter().any(|t| t.text == "TYPE_CHECKING") {
        return if negated {
            GuardKind::Other
        } else {
            GuardKind::TypeChecking
        };
    }

    let joined: String = condition.iter().map(|t| t.text.as_str()).collect();
    let names = |candidates: &[&str]| {
        condition
            .iter()
            .any(|t| t.kind == TokenKind::Identifier && candidates.contains(&t.text.as_str()))
    };

    if names(&["version_info", "PY2", "PY3", "PY36", "PY37", "PY38", "PY39", "PY310", "PY311", "PY312"])
        || joined.contains("sys.version")
    {
        GuardKind::Version
    } else if joined.contains("sys.platform")
        || joined.contains("platform.")
        || joined.contains("os.name")
    {
        GuardKind::Platform
    } else {
        GuardKind::Other
    }
}

/// Guard of an `elif`/`else` branch continuing a chain guarded by `guard`.
fn continuation_guard(guard: Option<GuardKind>) -> Option<GuardKind> {
    match guard {
        Some(GuardKind::TypeChecking) | None => Some(GuardKind::Other),
        other => other,
    }
}

/// Contents of a string literal token without prefix and quotes.
pub fn string_literal_value(text: &str) -> String {
    let body = text.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    for quotes in ["\"\"\"", "'''", "\"", "'"] {
        if let Some(inner) = body.strip_prefix(quotes) {
            return inner.strip_suffix(quotes).unwrap_or(inner).to_string();
        }
    }
    body.to_string()
}

/// Normalize docstring indentation the way `inspect.cleandoc` does.
pub fn clean_doc(doc: &str) -> String {
    let lines: Vec<&str> = doc.lines().collect();
    let Some((first, rest)) = lines.split_first() else {
        return String::new();
    };

    let margin = rest
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned = vec![first.trim().to_string()];
    for line in rest {
        let stripped = if line.len() >= margin {
            line.get(margin..).unwrap_or(line.trim_start())
        } else {
            line.trim_start()
        };
        cleaned.push(stripped.trim_end().to_string());
    }

    while cleaned.first().is_some_and(|l| l.is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|l| l.is_empty()) {
        cleaned.pop();
    }
    cleaned.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::python::PythonLexer;
    use pretty_assertions::assert_eq;

    fn parse_source(source: &str) -> (SyntaxNode, Vec<Diagnostic>) {
        let (tokens, _) = PythonLexer::new(source).tokenize();
        parse(&tokens, source, &DistillOptions::default())
    }

    fn function(node: &SyntaxNode) -> &FunctionHeader {
        match &node.data {
            NodeData::Function(f) => f,
            other => panic!("expected function, got {:?}", other),
        }
    }

    fn class(node: &SyntaxNode) -> &ClassHeader {
        match &node.data {
            NodeData::Class(c) => c,
            other => panic!("expected class, got {:?}", other),
        }
    }

    fn imports(node: &SyntaxNode) -> &[ImportSpec] {
        match &node.data {
            NodeData::Import(specs) => specs,
            other => panic!("expected import, got {:?}", other),
        }
    }

    #[test]
    fn test_class_with_methods() {
        let source = r#"
class Shape(ABC, metaclass=ABCMeta):
    """A shape."""

    sides: int = 0

    @abstractmethod
    def area(self) -> float:
        pass

    async def fetch(self, *, timeout=1.0):
        yield 1
"#;
        let (module, diags) = parse_source(source);
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(module.children.len(), 1);

        let shape = &module.children[0];
        let header = class(shape);
        assert_eq!(header.name, "Shape");
        assert_eq!(header.bases, vec!["ABC"]);
        assert_eq!(
            header.keywords,
            vec![("metaclass".to_string(), "ABCMeta".to_string())]
        );
        assert_eq!(shape.docstring(), Some("A shape."));

        let kinds: Vec<NodeKind> = shape.children.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::Docstring,
                NodeKind::Assignment,
                NodeKind::FunctionDef,
                NodeKind::FunctionDef
            ]
        );

        let area = function(&shape.children[2]);
        assert_eq!(area.decorators, vec!["abstractmethod"]);
        assert_eq!(area.signature.return_type.as_deref(), Some("float"));
        assert_eq!(shape.children[2].nesting_path, vec!["Shape"]);

        let fetch = function(&shape.children[3]);
        assert!(fetch.is_async);
        assert!(fetch.is_generator);
        assert_eq!(fetch.signature.parameters[1].kind, ParamKind::KeywordOnly);
        assert_eq!(fetch.signature.parameters[1].default.as_deref(), Some("1.0"));
    }

    #[test]
    fn test_parameter_kinds() {
        let source = "def f(a, b: int = 2, /, c=3, *args: str, d, e: dict[str, int] = {}, **kw) -> None:\n    pass\n";
        let (module, diags) = parse_source(source);
        assert!(diags.is_empty());
        let f = function(&module.children[0]);
        let kinds: Vec<(String, ParamKind)> = f
            .signature
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("a".to_string(), ParamKind::PositionalOnly),
                ("b".to_string(), ParamKind::PositionalOnly),
                ("c".to_string(), ParamKind::Positional),
                ("args".to_string(), ParamKind::VarPositional),
                ("d".to_string(), ParamKind::KeywordOnly),
                ("e".to_string(), ParamKind::KeywordOnly),
                ("kw".to_string(), ParamKind::VarKeyword),
            ]
        );
        let e = &f.signature.parameters[5];
        assert_eq!(e.annotation.as_deref(), Some("dict[str, int]"));
        assert_eq!(e.default.as_deref(), Some("{}"));
    }

    #[test]
    fn test_multiline_signature_is_collapsed() {
        let source = "def f(\n    x: Dict[\n        str, int\n    ],\n) -> Optional[\n    int\n]:\n    return 1\n";
        let (module, diags) = parse_source(source);
        assert!(diags.is_empty());
        let f = function(&module.children[0]);
        assert_eq!(
            f.signature.parameters[0].annotation.as_deref(),
            Some("Dict[ str, int ]")
        );
        assert_eq!(f.signature.return_type.as_deref(), Some("Optional[ int ]"));
    }

    #[test]
    fn test_pep695_type_params() {
        let (module, diags) = parse_source("class Box[T]:\n    def get[U](self) -> T: ...\n");
        assert!(diags.is_empty());
        assert_eq!(class(&module.children[0]).type_params.as_deref(), Some("[T]"));
        let get = function(&module.children[0].children[0]);
        assert_eq!(get.type_params.as_deref(), Some("[U]"));
    }

    #[test]
    fn test_imports() {
        let source = "import os, os.path as osp\nfrom . import sibling\nfrom ..pkg.mod import (\n    a,\n    b as c,\n)\nfrom m import *\n";
        let (module, diags) = parse_source(source);
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(module.children.len(), 4);

        let first = imports(&module.children[0]);
        assert_eq!(first[0].module, "os");
        assert_eq!(first[1].module, "os.path");
        assert_eq!(first[1].alias.as_deref(), Some("osp"));

        let relative = imports(&module.children[1]);
        assert_eq!(relative[0].level, 1);
        assert_eq!(relative[0].module, "");
        assert_eq!(relative[0].name.as_deref(), Some("sibling"));

        let nested = imports(&module.children[2]);
        assert_eq!(nested.len(), 2);
        assert_eq!(nested[0].level, 2);
        assert_eq!(nested[0].module, "pkg.mod");
        assert_eq!(nested[1].alias.as_deref(), Some("c"));

        let wildcard = imports(&module.children[3]);
        assert!(wildcard[0].is_wildcard);
    }

    #[test]
    fn test_guards() {
        let source = r#"
if TYPE_CHECKING:
    from a import A
else:
    from b import B
try:
    import ujson as json
except ImportError:
    import json
if sys.version_info >= (3, 11):
    import tomllib
elif sys.platform == "win32":
    import winreg
"#;
        let (module, diags) = parse_source(source);
        assert!(diags.is_empty(), "{:?}", diags);
        let guards: Vec<Option<GuardKind>> = module
            .children
            .iter()
            .flat_map(|block| block.children.iter())
            .map(|node| imports(node)[0].guard)
            .collect();
        assert_eq!(
            guards,
            vec![
                Some(GuardKind::TypeChecking),
                Some(GuardKind::Other),
                Some(GuardKind::TryExcept),
                Some(GuardKind::TryExcept),
                Some(GuardKind::Version),
                Some(GuardKind::Platform),
            ]
        );
    }

    #[test]
    fn test_definitions_in_blocks_keep_definition_path() {
        let source = "class A:\n    if DEBUG:\n        def debug(self):\n            pass\n";
        let (module, _) = parse_source(source);
        let block = &module.children[0].children[0];
        assert_eq!(block.kind, NodeKind::Block);
        assert_eq!(block.children[0].nesting_path, vec!["A"]);
    }

    #[test]
    fn test_match_statement_is_control_flow() {
        let source = "match command:\n    case [x, y]:\n        def inner():\n            pass\n    case _:\n        pass\nmatch = 3\ndef after():\n    pass\n";
        let (module, diags) = parse_source(source);
        assert!(diags.is_empty(), "{:?}", diags);
        let kinds: Vec<NodeKind> = module.children.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![NodeKind::Block, NodeKind::Assignment, NodeKind::FunctionDef]
        );
    }

    #[test]
    fn test_single_line_bodies() {
        let source = "class A: pass\nif TYPE_CHECKING: import typing\ndef f(): return 1\n";
        let (module, diags) = parse_source(source);
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(module.children.len(), 3);
        assert_eq!(module.children[1].children[0].kind, NodeKind::Import);
    }

    #[test]
    fn test_generator_ignores_nested_functions() {
        let source = "def outer():\n    def inner():\n        yield 1\n    return inner\n";
        let (module, _) = parse_source(source);
        let outer = &module.children[0];
        assert!(!function(outer).is_generator);
        assert!(function(&outer.children[0]).is_generator);
    }

    #[test]
    fn test_missing_colon_recovers() {
        let source = "class MissingColon\n    pass\n\ndef valid_function():\n    return True\n";
        let (module, diags) = parse_source(source);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::ExpectedToken);
        assert!(diags[0].recovered);
        assert_eq!(module.children.len(), 1);
        assert_eq!(module.children[0].name(), Some("valid_function"));
    }

    #[test]
    fn test_stray_character_reported_once() {
        let source = "$ stray\ndef after():\n    pass\n";
        let (tokens, lex_diags) = PythonLexer::new(source).tokenize();
        let (module, parse_diags) = parse(&tokens, source, &DistillOptions::default());
        assert_eq!(lex_diags.len(), 1);
        assert_eq!(lex_diags[0].code, DiagnosticCode::UnknownCharacter);
        assert!(parse_diags.is_empty(), "{:?}", parse_diags);
        assert_eq!(module.children.len(), 1);
        assert_eq!(module.children[0].name(), Some("after"));
    }

    #[test]
    fn test_dangling_decorator() {
        let source = "@decorator\nx = 1\ndef f():\n    pass\n";
        let (module, diags) = parse_source(source);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::DanglingDecorator);
        assert_eq!(module.children.last().and_then(|n| n.name()), Some("f"));
    }

    #[test]
    fn test_malformed_parameters() {
        let source = "def broken(a, 1):\n    pass\ndef ok():\n    pass\n";
        let (module, diags) = parse_source(source);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::MalformedParameters);
        assert_eq!(module.children.len(), 1);
    }

    #[test]
    fn test_recursion_limit_returns_partial_tree() {
        let mut source = String::new();
        for depth in 0..10 {
            source.push_str(&"    ".repeat(depth));
            source.push_str(&format!("def f{}():\n", depth));
        }
        source.push_str(&"    ".repeat(10));
        source.push_str("pass\n");

        let (tokens, _) = PythonLexer::new(&source).tokenize();
        let options = DistillOptions::default().with_max_recursion_depth(3);
        let (module, diags) = parse(&tokens, &source, &options);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::RecursionLimit);
        assert!(!diags[0].recovered);
        assert_eq!(module.children[0].name(), Some("f0"));
    }

    #[test]
    fn test_clean_doc() {
        assert_eq!(
            clean_doc("Summary.\n\n    Details here.\n      Indented.\n    "),
            "Summary.\n\nDetails here.\n  Indented."
        );
        assert_eq!(string_literal_value("r'''raw'''"), "raw");
        assert_eq!(string_literal_value("\"unterminated"), "unterminated");
    }

    #[test]
    fn test_classify_guard() {
        let (tokens, _) = PythonLexer::new("not TYPE_CHECKING").tokenize();
        let refs: Vec<&Token> = tokens.iter().take(2).collect();
        assert_eq!(classify_guard(&refs), GuardKind::Other);
    }
}
