//! Shared tree-sitter plumbing for the Rust and TypeScript dialects.
//!
//! The concrete syntax tree is lowered twice: its leaves become the shared
//! [`Token`] stream, and a dialect [`Lowering`] maps declarations onto
//! [`SyntaxNode`]s. Both walks are iterative.

use super::ParseOutput;
use crate::dialect::Dialect;
use crate::lexer::{StringFlavor, Token, TokenKind};
use crate::options::DistillOptions;
use crate::syntax::{NodeData, NodeKind, SyntaxNode, collapse_lines};
use crate::types::{Diagnostic, DiagnosticCode, Span};
use tree_sitter::{Language, Node, Parser, Tree};

pub fn language(dialect: Dialect) -> Option<Language> {
    match dialect {
        Dialect::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
        Dialect::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        Dialect::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
        Dialect::Python => None,
    }
}

/// Parse `source` with the grammar of `dialect`.
pub fn parse_tree(source: &str, dialect: Dialect) -> Option<Tree> {
    let language = language(dialect)?;
    // Parser instance is created per-use since it's not Send
    let mut parser = Parser::new();
    if let Err(err) = parser.set_language(&language) {
        tracing::warn!(dialect = %dialect, error = %err, "Failed to load grammar");
        return None;
    }
    parser.parse(source, None)
}

/// Token stream of a tree-sitter dialect.
pub fn tokenize(source: &str, dialect: Dialect) -> Vec<Token> {
    match parse_tree(source, dialect) {
        Some(tree) => tokens_from_tree(&tree, source),
        None => vec![eof_token(source)],
    }
}

/// Run the full tree-sitter front end for `dialect`.
pub(crate) fn parse_with(
    source: &str,
    dialect: Dialect,
    lowering: &dyn Lowering,
    options: &DistillOptions,
) -> ParseOutput {
    let Some(tree) = parse_tree(source, dialect) else {
        let eof = eof_token(source);
        return ParseOutput {
            root: SyntaxNode::module(Span::new(1, eof.span.end_line, 0, source.len())),
            tokens: vec![eof],
            diagnostics: vec![Diagnostic::fatal(
                DiagnosticCode::ParserUnavailable,
                format!("no {} grammar available", dialect),
                Span::default(),
            )],
        };
    };

    let tokens = tokens_from_tree(&tree, source);
    let mut diagnostics = error_diagnostics(&tree, source);
    let (root, lowering_diagnostics) =
        lower_tree(&tree, source, lowering, options.max_recursion_depth);
    diagnostics.extend(lowering_diagnostics);

    ParseOutput {
        root,
        tokens,
        diagnostics,
    }
}

// ============================================================================
// Tokens
// ============================================================================

pub fn eof_token(source: &str) -> Token {
    let line = bytecount::count(source.as_bytes(), b'\n') + 1;
    let column = source.len() - source.rfind('\n').map_or(0, |i| i + 1);
    Token::new(
        TokenKind::Eof,
        "",
        Span::new(line, line, source.len(), source.len()),
        column,
    )
}

/// Leaves of the tree in source order, followed by `Eof`.
pub fn tokens_from_tree(tree: &Tree, source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut cursor = tree.walk();

    'walk: loop {
        let node = cursor.node();
        let descend = match leaf_kind(node, source) {
            Some(kind) => {
                if node.end_byte() > node.start_byte() {
                    tokens.push(Token::new(
                        kind,
                        text_of(node, source),
                        span_of(node),
                        node.start_position().column,
                    ));
                }
                false
            }
            None => true,
        };

        if descend && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                continue 'walk;
            }
            if !cursor.goto_parent() {
                break 'walk;
            }
        }
    }

    tokens.push(eof_token(source));
    tokens
}

/// Token kind of a node emitted whole, or `None` to descend into it.
fn leaf_kind(node: Node, source: &str) -> Option<TokenKind> {
    let kind = node.kind();
    match kind {
        "string_literal" | "string" | "char_literal" | "regex" => {
            return Some(TokenKind::String(StringFlavor::Plain));
        }
        "raw_string_literal" => return Some(TokenKind::String(StringFlavor::Raw)),
        "line_comment" | "block_comment" | "comment" => return Some(TokenKind::Comment),
        "lifetime" => return Some(TokenKind::Label),
        _ => {}
    }
    if node.child_count() > 0 {
        return None;
    }

    let word = text_of(node, source)
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');

    if !node.is_named() {
        return Some(if word {
            TokenKind::Keyword
        } else {
            TokenKind::Operator
        });
    }

    Some(match kind {
        "identifier"
        | "type_identifier"
        | "shorthand_property_identifier"
        | "shorthand_property_identifier_pattern"
        | "shorthand_field_identifier" => TokenKind::Identifier,
        "property_identifier"
        | "field_identifier"
        | "private_property_identifier"
        | "statement_identifier" => TokenKind::Label,
        "integer_literal" | "float_literal" | "number" => TokenKind::Number,
        "string_fragment" | "string_content" | "escape_sequence" | "jsx_text" => {
            TokenKind::String(StringFlavor::Plain)
        }
        _ if word => TokenKind::Keyword,
        _ => TokenKind::Operator,
    })
}

/// One diagnostic per ERROR or MISSING node.
pub fn error_diagnostics(tree: &Tree, source: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    if !tree.root_node().has_error() {
        return diagnostics;
    }

    let mut stack = vec![tree.root_node()];
    while let Some(node) = stack.pop() {
        if node.is_error() {
            let snippet: String = text_of(node, source).chars().take(40).collect();
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::SyntaxError,
                format!("syntax error near '{}'", snippet.trim()),
                span_of(node),
            ));
        } else if node.is_missing() {
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::SyntaxError,
                format!("missing '{}'", node.kind()),
                span_of(node),
            ));
        } else if node.has_error() {
            let mut cursor = node.walk();
            let children: Vec<Node> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }
    diagnostics.sort_by_key(|d| d.span.start_byte);
    diagnostics
}

// ============================================================================
// Lowering
// ============================================================================

/// Innermost definition around a node being lowered.
pub(crate) struct Scope<'p> {
    pub path: &'p [String],
    /// `Module`, `ClassDef` or `FunctionDef`
    pub kind: NodeKind,
}

pub(crate) enum Lowered<'t> {
    /// Not a declaration; visit its children
    Descend,
    Skip,
    /// Complete node without a body to visit
    Emit(SyntaxNode),
    /// Node whose body children are lowered into it
    Open(SyntaxNode, Option<Node<'t>>),
}

pub(crate) trait Lowering {
    fn lower<'t>(&self, node: Node<'t>, source: &str, scope: &Scope<'_>) -> Lowered<'t>;
}

struct OpenFrame {
    node: SyntaxNode,
    path: Vec<String>,
    scope: NodeKind,
}

enum Work<'t> {
    Visit(Node<'t>),
    Close,
}

/// Lower a tree into a module node. Nesting beyond `max_depth` aborts the
/// walk with a fatal diagnostic and returns what was built so far.
pub(crate) fn lower_tree(
    tree: &Tree,
    source: &str,
    lowering: &dyn Lowering,
    max_depth: usize,
) -> (SyntaxNode, Vec<Diagnostic>) {
    let root = tree.root_node();
    let module = SyntaxNode::module(Span::new(
        1,
        root.end_position().row + 1,
        0,
        source.len(),
    ));
    let mut frames = vec![OpenFrame {
        node: module,
        path: Vec::new(),
        scope: NodeKind::Module,
    }];
    let mut work = Vec::new();
    push_children(&mut work, root);
    let mut diagnostics = Vec::new();

    while let Some(item) = work.pop() {
        let node = match item {
            Work::Close => {
                close_frame(&mut frames);
                continue;
            }
            Work::Visit(node) => node,
        };

        let (lowered, path, scope) = {
            let Some(top) = frames.last() else { break };
            let scope = Scope {
                path: &top.path,
                kind: top.scope,
            };
            (lowering.lower(node, source, &scope), &top.path, top.scope)
        };

        match lowered {
            Lowered::Descend => push_children(&mut work, node),
            Lowered::Skip => {}
            Lowered::Emit(syntax) => {
                if let Some(top) = frames.last_mut() {
                    top.node.children.push(syntax);
                }
            }
            Lowered::Open(syntax, body) => {
                if frames.len() > max_depth {
                    tracing::warn!(
                        limit = max_depth,
                        line = syntax.span.start_line,
                        "Nesting depth limit reached, aborting lowering"
                    );
                    diagnostics.push(Diagnostic::fatal(
                        DiagnosticCode::RecursionLimit,
                        format!("nesting deeper than {} levels", max_depth),
                        syntax.span,
                    ));
                    break;
                }
                let mut path = path.clone();
                let mut scope = scope;
                if syntax.is_definition() {
                    path.extend(syntax.name().map(str::to_string));
                    scope = syntax.kind;
                }
                frames.push(OpenFrame {
                    node: syntax,
                    path,
                    scope,
                });
                work.push(Work::Close);
                if let Some(body) = body {
                    push_children(&mut work, body);
                }
            }
        }
    }

    while frames.len() > 1 {
        close_frame(&mut frames);
    }
    let module = frames
        .pop()
        .map(|f| f.node)
        .unwrap_or_else(|| SyntaxNode::module(Span::default()));
    (module, diagnostics)
}

fn push_children<'t>(work: &mut Vec<Work<'t>>, node: Node<'t>) {
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.children(&mut cursor).collect();
    work.extend(children.into_iter().rev().map(Work::Visit));
}

fn close_frame(frames: &mut Vec<OpenFrame>) {
    if let Some(frame) = frames.pop() {
        if let Some(parent) = frames.last_mut() {
            parent.node.children.push(frame.node);
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

pub fn span_of(node: Node) -> Span {
    Span::new(
        node.start_position().row + 1,
        node.end_position().row + 1,
        node.start_byte(),
        node.end_byte(),
    )
}

pub fn text_of<'s>(node: Node, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or("")
}

/// Node text with line breaks collapsed; `None` when blank.
pub fn fragment(node: Node, source: &str) -> Option<String> {
    let text = collapse_lines(text_of(node, source)).trim().to_string();
    (!text.is_empty()).then_some(text)
}

pub fn field_fragment(node: Node, field: &str, source: &str) -> Option<String> {
    node.child_by_field_name(field)
        .and_then(|n| fragment(n, source))
}

/// Whether `node` has an anonymous child with the given text.
pub fn has_token(node: Node, token: &str) -> bool {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|c| !c.is_named() && c.kind() == token);
    found
}

pub fn child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).find(|c| c.kind() == kind);
    found
}

/// Docstring node for a definition.
pub fn docstring_node(doc: String, span: Span, path: &[String]) -> SyntaxNode {
    SyntaxNode::new(span, path.to_vec(), NodeData::Docstring(doc))
}

/// Strip `///`, `//!` or `/** */` markers from documentation comments.
pub fn clean_doc_comment(lines: &[&str]) -> String {
    let mut out: Vec<String> = Vec::new();
    for raw in lines {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix("///").or_else(|| raw.strip_prefix("//!")) {
            out.push(rest.strip_prefix(' ').unwrap_or(rest).trim_end().to_string());
            continue;
        }
        let body = raw
            .strip_prefix("/**")
            .or_else(|| raw.strip_prefix("/*!"))
            .unwrap_or(raw);
        let body = body.strip_suffix("*/").unwrap_or(body);
        for line in body.lines() {
            let line = line.trim();
            let line = line.strip_prefix('*').unwrap_or(line);
            out.push(line.strip_prefix(' ').unwrap_or(line).trim_end().to_string());
        }
    }
    while out.first().is_some_and(|l| l.is_empty()) {
        out.remove(0);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}
