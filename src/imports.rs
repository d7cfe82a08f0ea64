//! Import-usage analysis.
//!
//! Decides, per imported name, whether the file references it, whether every
//! reference is a type annotation, and whether the import sits under a guard.
//! Works on the token stream the parser already produced: a reference is an
//! identifier that is not a member access, a keyword-argument name, a binding
//! occurrence, or part of an import statement.

use crate::dialect::Dialect;
use crate::lexer::python::PythonLexer;
use crate::lexer::{Token, TokenKind};
use crate::parsing::python::string_literal_value;
use crate::types::{GuardKind, ImportBinding, ImportSpec, Span, Symbol, SymbolKind};
use std::collections::HashSet;

const PYTHON_BUILTINS: &[&str] = &[
    "abs", "aiter", "all", "anext", "any", "ascii", "bin", "bool", "breakpoint", "bytearray",
    "bytes", "callable", "chr", "classmethod", "compile", "complex", "delattr", "dict", "dir",
    "divmod", "enumerate", "eval", "exec", "filter", "float", "format", "frozenset", "getattr",
    "globals", "hasattr", "hash", "help", "hex", "id", "input", "int", "isinstance",
    "issubclass", "iter", "len", "list", "locals", "map", "max", "memoryview", "min", "next",
    "object", "oct", "open", "ord", "pow", "print", "property", "range", "repr", "reversed",
    "round", "set", "setattr", "slice", "sorted", "staticmethod", "str", "sum", "super",
    "tuple", "type", "vars", "zip", "__import__", "__name__", "__file__", "__doc__",
    "__all__", "__spec__", "__package__", "__builtins__", "NotImplemented", "Ellipsis",
    "BaseException", "Exception", "ArithmeticError", "AssertionError", "AttributeError",
    "EOFError", "ImportError", "ModuleNotFoundError", "IndexError", "KeyError",
    "KeyboardInterrupt", "LookupError", "MemoryError", "NameError", "NotImplementedError",
    "OSError", "IOError", "OverflowError", "RecursionError", "RuntimeError", "StopIteration",
    "StopAsyncIteration", "SyntaxError", "SystemExit", "TypeError", "UnboundLocalError",
    "UnicodeError", "UnicodeDecodeError", "UnicodeEncodeError", "ValueError",
    "ZeroDivisionError", "FileNotFoundError", "FileExistsError", "PermissionError",
    "TimeoutError", "ConnectionError", "Warning", "DeprecationWarning", "UserWarning",
    "RuntimeWarning", "match", "case", "_",
];

const RUST_PRELUDE: &[&str] = &[
    "Self", "Option", "Some", "None", "Result", "Ok", "Err", "Vec", "String", "Box", "Copy",
    "Clone", "Send", "Sync", "Sized", "Unpin", "Drop", "Fn", "FnMut", "FnOnce", "Default",
    "Debug", "Eq", "PartialEq", "Ord", "PartialOrd", "Hash", "Iterator", "IntoIterator",
    "DoubleEndedIterator", "ExactSizeIterator", "Extend", "FromIterator", "AsRef", "AsMut",
    "Into", "From", "TryFrom", "TryInto", "ToString", "ToOwned", "println", "print", "eprintln",
    "eprint", "format", "write", "writeln", "vec", "panic", "assert", "assert_eq", "assert_ne",
    "debug_assert", "debug_assert_eq", "debug_assert_ne", "unreachable", "unimplemented",
    "todo", "matches", "include_str", "include_bytes", "concat", "stringify", "env",
    "cfg", "cfg_attr", "derive", "test", "allow", "warn", "deny", "inline", "must_use",
    "non_exhaustive", "repr", "feature", "doc", "macro_export", "path",
];

const TS_GLOBALS: &[&str] = &[
    "console", "window", "document", "globalThis", "Object", "Array", "String", "Number",
    "Boolean", "Symbol", "BigInt", "Math", "JSON", "Date", "RegExp", "Error", "TypeError",
    "RangeError", "Promise", "Map", "Set", "WeakMap", "WeakSet", "Proxy", "Reflect",
    "Partial", "Required", "Readonly", "Record", "Pick", "Omit", "Exclude", "Extract",
    "NonNullable", "ReturnType", "Parameters", "InstanceType", "Awaited", "setTimeout",
    "clearTimeout", "setInterval", "clearInterval", "fetch", "parseInt", "parseFloat",
    "isNaN", "isFinite", "NaN", "Infinity", "require", "module", "exports", "process",
    "arguments",
];

// ============================================================================
// Analysis
// ============================================================================

/// An import symbol and the region it is visible in.
struct ImportSite<'a> {
    spec: &'a ImportSpec,
    span: Span,
    path: &'a [String],
    /// `None` for module-level imports
    scope: Option<Span>,
}

/// An identifier occurrence that reads a name.
#[derive(Debug)]
struct Reference {
    name: String,
    byte: usize,
    /// Inside a type annotation
    annotation: bool,
}

#[derive(Debug, Default)]
struct Scan {
    references: Vec<Reference>,
    /// Names introduced by binding occurrences
    bound: HashSet<String>,
}

/// Produce one binding per imported name with its usage verdict, in source
/// order.
pub fn analyze(root: &Symbol, tokens: &[Token], dialect: Dialect) -> Vec<ImportBinding> {
    let sites = collect_sites(root);
    if sites.is_empty() {
        return Vec::new();
    }

    let significant: Vec<&Token> = tokens.iter().filter(|t| !t.kind.is_trivia()).collect();
    let excluded: Vec<Span> = sites.iter().map(|s| s.span).collect();
    let scan = match dialect {
        Dialect::Python => scan_python(&significant, &excluded),
        Dialect::Rust | Dialect::TypeScript | Dialect::Tsx => {
            scan_braced(&significant, &excluded, dialect)
        }
    };

    let mut known: HashSet<&str> = scan.bound.iter().map(String::as_str).collect();
    known.extend(local_names(root));
    for name in builtins(dialect) {
        known.insert(name);
    }
    known.extend(
        sites
            .iter()
            .filter(|s| !s.spec.is_wildcard)
            .map(|s| s.spec.local_name()),
    );

    let bindings: Vec<ImportBinding> = sites
        .iter()
        .map(|site| verdict(site, &scan.references, &known, dialect))
        .collect();

    tracing::debug!(
        imports = bindings.len(),
        unused = bindings.iter().filter(|b| !b.is_used).count(),
        references = scan.references.len(),
        "Analyzed import usage"
    );
    bindings
}

fn verdict(
    site: &ImportSite<'_>,
    references: &[Reference],
    known: &HashSet<&str>,
    dialect: Dialect,
) -> ImportBinding {
    let spec = site.spec;
    let in_scope = |r: &&Reference| site.scope.is_none_or(|s| s.contains_byte(r.byte));
    let local = spec.local_name();

    let (is_used, annotation_only) = if spec.is_wildcard {
        // Conservative: any unresolved name may come from the wildcard
        let used = references
            .iter()
            .filter(in_scope)
            .any(|r| !known.contains(r.name.as_str()));
        (used, false)
    } else if dialect == Dialect::Rust && local == "_" {
        (true, false)
    } else {
        let mut hits = references
            .iter()
            .filter(in_scope)
            .filter(|r| r.name == local)
            .peekable();
        let used = hits.peek().is_some();
        (used, used && hits.all(|r| r.annotation))
    };

    let is_type_only = spec.guard == Some(GuardKind::TypeChecking)
        || spec.type_only
        || (dialect == Dialect::Python && annotation_only);

    ImportBinding {
        source_module: format!("{}{}", ".".repeat(spec.level), spec.module),
        imported_name: spec.name.clone(),
        local_alias: local.to_string(),
        is_used,
        is_conditional: spec.guard.is_some(),
        is_type_only,
        guard: spec.guard,
        scope: site.path.to_vec(),
        span: site.span,
    }
}

/// Import symbols in source order, each with the span of its enclosing
/// definition.
fn collect_sites(root: &Symbol) -> Vec<ImportSite<'_>> {
    let mut sites = Vec::new();
    let mut stack: Vec<(&Symbol, Option<Span>)> =
        root.children.iter().rev().map(|c| (c, None)).collect();

    while let Some((symbol, scope)) = stack.pop() {
        if let Some(spec) = &symbol.import {
            sites.push(ImportSite {
                spec,
                span: symbol.span,
                path: &symbol.qualified_path,
                scope,
            });
        }
        stack.extend(
            symbol
                .children
                .iter()
                .rev()
                .map(|c| (c, Some(symbol.span))),
        );
    }
    sites
}

/// Names defined in the file: symbols and parameters.
fn local_names(root: &Symbol) -> impl Iterator<Item = &str> {
    root.iter()
        .skip(1)
        .filter(|s| s.kind != SymbolKind::Import)
        .flat_map(|s| {
            let params = s
                .signature
                .iter()
                .flat_map(|sig| sig.parameters.iter().map(|p| p.name.as_str()));
            std::iter::once(s.name.as_str()).chain(params)
        })
}

fn builtins(dialect: Dialect) -> impl Iterator<Item = &'static str> {
    let list = match dialect {
        Dialect::Python => PYTHON_BUILTINS,
        Dialect::Rust => RUST_PRELUDE,
        Dialect::TypeScript | Dialect::Tsx => TS_GLOBALS,
    };
    list.iter().copied()
}

fn is_excluded(token: &Token, excluded: &[Span]) -> bool {
    excluded.iter().any(|s| s.contains_byte(token.span.start_byte))
}

// ============================================================================
// Python
// ============================================================================

/// Python reference scan. Tracks bracket depth, `def` parameter lists,
/// pending lambdas and annotation contexts (`x: T`, `-> T`, parameter
/// annotations).
fn scan_python(tokens: &[&Token], excluded: &[Span]) -> Scan {
    let mut scan = Scan::default();
    let targets = binding_targets(tokens);
    let mut brackets: Vec<&str> = Vec::new();
    let mut stmt_start = 0;
    let mut stmt_has_lambda = false;
    let mut pending_def = false;
    let mut params: Option<usize> = None;
    let mut annotation: Option<usize> = None;
    let mut lambdas: Vec<usize> = Vec::new();
    let mut in_all = false;

    for (i, token) in tokens.iter().enumerate() {
        let depth = brackets.len();
        match token.kind {
            TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent | TokenKind::Eof => {
                brackets.clear();
                stmt_start = i + 1;
                stmt_has_lambda = false;
                pending_def = false;
                params = None;
                annotation = None;
                lambdas.clear();
                in_all = false;
            }
            TokenKind::Keyword => match token.text.as_str() {
                "def" => pending_def = true,
                "lambda" => {
                    lambdas.push(depth);
                    stmt_has_lambda = true;
                }
                _ => {}
            },
            TokenKind::Operator => match token.text.as_str() {
                open @ ("(" | "[" | "{") => {
                    brackets.push(open);
                    if open == "(" && pending_def {
                        params = Some(brackets.len());
                        pending_def = false;
                    }
                }
                ")" | "]" | "}" => {
                    brackets.pop();
                    let depth = brackets.len();
                    if params.is_some_and(|p| depth < p) {
                        params = None;
                    }
                    if annotation.is_some_and(|a| depth < a) {
                        annotation = None;
                    }
                    lambdas.retain(|&l| l <= depth);
                }
                ";" => {
                    stmt_start = i + 1;
                    stmt_has_lambda = false;
                    annotation = None;
                    in_all = false;
                }
                ":" => {
                    if lambdas.last() == Some(&depth) {
                        lambdas.pop();
                    } else if annotation == Some(depth) {
                        annotation = None;
                    } else if params == Some(depth) {
                        annotation = Some(depth);
                    } else if depth == 0
                        && i > stmt_start
                        && !stmt_has_lambda
                        && tokens
                            .get(stmt_start)
                            .is_some_and(|t| t.kind == TokenKind::Identifier)
                        && !starts_soft_compound(tokens, stmt_start)
                    {
                        annotation = Some(0);
                    }
                }
                "->" => annotation = Some(depth),
                "," | "=" => {
                    if annotation == Some(depth) {
                        annotation = None;
                    }
                }
                _ => {}
            },
            TokenKind::String(_) => {
                if is_excluded(token, excluded) {
                    continue;
                }
                if in_all {
                    let name = string_literal_value(&token.text);
                    if is_identifier(&name) {
                        scan.references.push(Reference {
                            name,
                            byte: token.span.start_byte,
                            annotation: false,
                        });
                    }
                } else if annotation.is_some() {
                    string_annotation_refs(token, &mut scan.references);
                }
            }
            TokenKind::Identifier => {
                if is_excluded(token, excluded) {
                    continue;
                }
                let prev = i.checked_sub(1).and_then(|p| tokens.get(p));
                let next = tokens.get(i + 1);
                let next_is = |op: &str| next.is_some_and(|t| t.is_op(op));

                if prev.is_some_and(|p| p.is_op(".")) {
                    continue;
                }
                if prev.is_some_and(|p| {
                    p.kind == TokenKind::Keyword
                        && matches!(
                            p.text.as_str(),
                            "def" | "class" | "as" | "global" | "nonlocal" | "for"
                        )
                }) {
                    scan.bound.insert(token.text.clone());
                    continue;
                }
                if lambdas.last() == Some(&depth) {
                    scan.bound.insert(token.text.clone());
                    continue;
                }
                if params == Some(depth)
                    && prev.is_some_and(|p| {
                        p.kind == TokenKind::Operator
                            && matches!(p.text.as_str(), "(" | "," | "*" | "**" | "/")
                    })
                {
                    scan.bound.insert(token.text.clone());
                    continue;
                }
                if next_is("=") && brackets.last() == Some(&"(") && params != Some(depth) {
                    // Keyword argument name
                    continue;
                }
                if i == stmt_start && depth == 0 {
                    if token.text == "__all__" && (next_is("=") || next_is("+=") || next_is(":"))
                    {
                        in_all = true;
                    }
                    if next_is("=") || next_is(":") {
                        scan.bound.insert(token.text.clone());
                        continue;
                    }
                }
                if targets.contains(&i) {
                    scan.bound.insert(token.text.clone());
                    continue;
                }
                scan.references.push(Reference {
                    name: token.text.clone(),
                    byte: token.span.start_byte,
                    annotation: annotation.is_some(),
                });
            }
            _ => {}
        }
    }
    scan
}

/// `match`/`case` opening a compound statement rather than naming a
/// variable.
fn starts_soft_compound(tokens: &[&Token], start: usize) -> bool {
    let Some(first) = tokens.get(start) else {
        return false;
    };
    if !(first.is_ident("match") || first.is_ident("case")) {
        return false;
    }
    match tokens.get(start + 1) {
        Some(next) if next.kind == TokenKind::Operator => {
            let name_use = matches!(next.text.as_str(), "." | ":" | "," | ")" | "]" | "}" | ";")
                || (next.text.ends_with('=')
                    && !matches!(next.text.as_str(), "==" | "<=" | ">=" | "!="));
            !name_use
        }
        Some(next) => !matches!(next.kind, TokenKind::Newline | TokenKind::Eof),
        None => false,
    }
}

/// Token indices that bind a name: assignment targets (`a, b = ...`),
/// `for` targets up to their `in`, and walrus targets.
fn binding_targets(tokens: &[&Token]) -> HashSet<usize> {
    let mut targets = HashSet::new();
    let mut start = 0;
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent | TokenKind::Eof => {
                statement_targets(tokens, start, i, &mut targets);
                start = i + 1;
                depth = 0;
            }
            TokenKind::Operator => match token.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth = depth.saturating_sub(1),
                ";" if depth == 0 => {
                    statement_targets(tokens, start, i, &mut targets);
                    start = i + 1;
                }
                _ => {}
            },
            _ => {}
        }
    }
    targets
}

fn statement_targets(tokens: &[&Token], start: usize, end: usize, targets: &mut HashSet<usize>) {
    if start >= end {
        return;
    }
    let mut depths = Vec::with_capacity(end - start);
    let mut depth = 0usize;
    for token in &tokens[start..end] {
        if token.kind == TokenKind::Operator {
            match token.text.as_str() {
                "(" | "[" | "{" => {
                    depths.push(depth);
                    depth += 1;
                    continue;
                }
                ")" | "]" | "}" => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        depths.push(depth);
    }
    let depth_at = |i: usize| depths[i - start];

    for i in start..end {
        let token = tokens[i];
        if token.kind == TokenKind::Identifier && tokens.get(i + 1).is_some_and(|t| t.is_op(":=")) {
            targets.insert(i);
        }
        if token.is_keyword("for") {
            let level = depth_at(i);
            if let Some(stop) = (i + 1..end).find(|&j| tokens[j].is_keyword("in") && depth_at(j) == level) {
                mark_targets(tokens, i + 1, stop, targets);
            }
        }
    }

    // Inline body of a compound header such as `if ready: a, b = 1, 2`
    let compound = tokens[start].kind == TokenKind::Keyword
        && matches!(
            tokens[start].text.as_str(),
            "if" | "elif" | "else" | "while" | "for" | "try" | "except" | "finally" | "with"
                | "def" | "class" | "async"
        );
    let mut from = start;
    if compound || starts_soft_compound(tokens, start) {
        match (start..end).find(|&j| tokens[j].is_op(":") && depth_at(j) == 0) {
            Some(colon) => from = colon + 1,
            None => return,
        }
    }

    let mut segment = from;
    let mut annotated: Option<usize> = None;
    for i in from..end {
        let token = tokens[i];
        if depth_at(i) != 0 {
            continue;
        }
        if token.is_keyword("lambda") {
            break;
        }
        if token.is_op("=") {
            mark_targets(tokens, segment, annotated.unwrap_or(i), targets);
            segment = i + 1;
            annotated = None;
        } else if token.is_op(":") && annotated.is_none() {
            annotated = Some(i);
        }
    }
}

/// Mark the plain names of a target list. Names under a subscript or call
/// and attribute bases are references, not bindings.
fn mark_targets(tokens: &[&Token], from: usize, to: usize, targets: &mut HashSet<usize>) {
    let mut access: Vec<bool> = Vec::new();
    for i in from..to {
        let token = tokens[i];
        let prev = i.checked_sub(1).filter(|&p| p >= from).map(|p| tokens[p]);
        match token.kind {
            TokenKind::Operator => match token.text.as_str() {
                "(" | "[" | "{" => access.push(prev.is_some_and(ends_operand)),
                ")" | "]" | "}" => {
                    access.pop();
                }
                _ => {}
            },
            TokenKind::Identifier => {
                let next = tokens.get(i + 1).filter(|_| i + 1 < to);
                let member = prev.is_some_and(|p| p.is_op("."));
                let accessed = next.is_some_and(|n| n.is_op(".") || n.is_op("[") || n.is_op("("));
                if !member && !accessed && !access.contains(&true) {
                    targets.insert(i);
                }
            }
            _ => {}
        }
    }
}

/// Tokens after which a bracket opens a subscript or call.
fn ends_operand(token: &Token) -> bool {
    matches!(
        token.kind,
        TokenKind::Identifier
            | TokenKind::Label
            | TokenKind::Number
            | TokenKind::String(_)
            | TokenKind::FStringEnd
    ) || token.is_op(")")
        || token.is_op("]")
        || token.is_op("}")
}

/// Identifiers of a quoted annotation such as `"Sequence[Item]"`.
fn string_annotation_refs(token: &Token, references: &mut Vec<Reference>) {
    let text = string_literal_value(&token.text);
    let (inner, _) = PythonLexer::new(&text).tokenize();
    let mut after_dot = false;
    for t in &inner {
        if t.kind == TokenKind::Identifier && !after_dot {
            references.push(Reference {
                name: t.text.clone(),
                byte: token.span.start_byte,
                annotation: true,
            });
        }
        after_dot = t.is_op(".");
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || unicode_ident::is_xid_start(c))
        && chars.all(unicode_ident::is_xid_continue)
}

// ============================================================================
// Rust and TypeScript
// ============================================================================

/// Reference scan for the tree-sitter dialects. Member and field names are
/// already `Label` tokens, so only paths and declarations need filtering.
fn scan_braced(tokens: &[&Token], excluded: &[Span], dialect: Dialect) -> Scan {
    let mut scan = Scan::default();
    for (i, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Identifier || is_excluded(token, excluded) {
            continue;
        }
        let prev = i.checked_sub(1).and_then(|p| tokens.get(p)).copied();
        let before_prev = i.checked_sub(2).and_then(|p| tokens.get(p)).copied();
        let next = tokens.get(i + 1).copied();
        let after_next = tokens.get(i + 2).copied();

        if prev.is_some_and(|p| p.is_op(".") || p.is_op("?.") || p.is_op("::")) {
            continue;
        }
        let binding = match dialect {
            Dialect::Rust => is_rust_binding(prev, before_prev, next),
            _ => is_ts_binding(prev, before_prev, next, after_next),
        };
        if binding {
            scan.bound.insert(token.text.clone());
            continue;
        }
        scan.references.push(Reference {
            name: token.text.clone(),
            byte: token.span.start_byte,
            annotation: false,
        });
    }
    scan
}

fn is_rust_binding(prev: Option<&Token>, before_prev: Option<&Token>, next: Option<&Token>) -> bool {
    if next.is_some_and(|t| t.is_op(":")) {
        return true;
    }
    let Some(prev) = prev else {
        return false;
    };
    match prev.text.as_str() {
        "let" | "fn" | "struct" | "enum" | "trait" | "type" | "mod" | "union" => {
            prev.kind == TokenKind::Keyword
        }
        // `*const T` is a pointer type
        "const" | "static" => {
            prev.kind == TokenKind::Keyword && !before_prev.is_some_and(|t| t.is_op("*"))
        }
        "mut" | "ref" => before_prev.is_some_and(|t| t.is_keyword("let")),
        _ => false,
    }
}

fn is_ts_binding(
    prev: Option<&Token>,
    before_prev: Option<&Token>,
    next: Option<&Token>,
    after_next: Option<&Token>,
) -> bool {
    if let Some(prev) = prev {
        if prev.kind == TokenKind::Keyword
            && matches!(
                prev.text.as_str(),
                "const" | "let" | "var" | "function" | "class" | "interface" | "type" | "enum"
                    | "namespace"
            )
        {
            return true;
        }
        // `function* gen`
        if prev.is_op("*") && before_prev.is_some_and(|t| t.is_keyword("function")) {
            return true;
        }
    }
    let annotated = next.is_some_and(|t| t.is_op(":"))
        || (next.is_some_and(|t| t.is_op("?")) && after_next.is_some_and(|t| t.is_op(":")));
    annotated && prev.is_some_and(|p| p.is_op("(") || p.is_op(",") || p.is_op("{"))
}
