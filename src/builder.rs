//! Symbol tree builder.
//!
//! Walks the syntax tree with an explicit work stack and emits the
//! normalized [`Symbol`] tree. Control-flow blocks are transparent: their
//! definitions attach to the nearest enclosing definition. Rust `impl`
//! blocks merge into the type of the same name.

use crate::options::DistillOptions;
use crate::syntax::{AssignmentData, ClassHeader, FunctionHeader, NodeData, SyntaxNode};
use crate::types::{Diagnostic, DiagnosticCode, Symbol, SymbolKind};
use std::collections::HashSet;

/// Decorators that turn a method into a property.
const PROPERTY_DECORATORS: &[&str] = &[
    "property",
    "cached_property",
    "functools.cached_property",
    "abstractproperty",
    "abc.abstractproperty",
];

/// Decorators that mark a callable abstract.
const ABSTRACT_DECORATORS: &[&str] = &[
    "abstractmethod",
    "abstractproperty",
    "abstractclassmethod",
    "abstractstaticmethod",
];

/// Base classes and metaclasses that make a class abstract.
const ABSTRACT_BASES: &[&str] = &["ABC", "ABCMeta", "Protocol"];

struct Frame {
    symbol: Symbol,
    is_impl: bool,
    /// Classes in `symbol.children` created from impl blocks alone
    impl_only: HashSet<String>,
    /// Field and constant names already recorded
    assigned: HashSet<String>,
}

impl Frame {
    fn new(symbol: Symbol, is_impl: bool) -> Self {
        Self {
            symbol,
            is_impl,
            impl_only: HashSet::new(),
            assigned: HashSet::new(),
        }
    }
}

enum Work<'a> {
    Enter(&'a SyntaxNode),
    Exit,
}

/// Build the symbol tree for a parsed module. The root is a module symbol
/// with an empty name and no visibility.
pub fn build(root: &SyntaxNode, options: &DistillOptions) -> (Symbol, Vec<Diagnostic>) {
    let mut module = Symbol::new(SymbolKind::Module, "", root.span);
    module.doc_comment = root.docstring().map(str::to_string);

    let mut frames = vec![Frame::new(module, false)];
    let mut work: Vec<Work> = root.children.iter().rev().map(Work::Enter).collect();
    let mut diagnostics = Vec::new();

    while let Some(item) = work.pop() {
        let node = match item {
            Work::Exit => {
                close(&mut frames);
                continue;
            }
            Work::Enter(node) => node,
        };

        match &node.data {
            NodeData::Block(_) => work.extend(node.children.iter().rev().map(Work::Enter)),
            NodeData::Module | NodeData::Docstring(_) => {}
            NodeData::Import(specs) => {
                let Some(frame) = frames.last_mut() else { break };
                for spec in specs {
                    let name = match (&spec.alias, &spec.name) {
                        (Some(alias), _) => alias.clone(),
                        (None, Some(name)) => name.clone(),
                        (None, None) => spec.module.clone(),
                    };
                    let mut symbol = Symbol::new(SymbolKind::Import, name, node.span);
                    symbol.qualified_path = node.nesting_path.clone();
                    symbol.import = Some(spec.clone());
                    frame.symbol.children.push(symbol);
                }
            }
            NodeData::Assignment(data) => {
                let Some(frame) = frames.last_mut() else { break };
                // First binding of a name wins
                if frame.assigned.insert(data.name.clone()) {
                    frame.symbol.children.push(assignment_symbol(node, data));
                }
            }
            NodeData::Class(header) => {
                if !enter_allowed(&frames, node, options, &mut diagnostics) {
                    continue;
                }
                frames.push(Frame::new(class_symbol(node, header), header.is_impl));
                work.push(Work::Exit);
                work.extend(node.children.iter().rev().map(Work::Enter));
            }
            NodeData::Function(header) => {
                if !enter_allowed(&frames, node, options, &mut diagnostics) {
                    continue;
                }
                let in_class = frames
                    .last()
                    .is_some_and(|f| f.symbol.kind == SymbolKind::Class);
                frames.push(Frame::new(function_symbol(node, header, in_class), false));
                work.push(Work::Exit);
                work.extend(node.children.iter().rev().map(Work::Enter));
            }
        }
    }

    while frames.len() > 1 {
        close(&mut frames);
    }
    let root = frames
        .pop()
        .map(|f| f.symbol)
        .unwrap_or_else(|| Symbol::new(SymbolKind::Module, "", root.span));

    tracing::trace!(symbols = root.iter().count(), "Built symbol tree");
    (root, diagnostics)
}

fn enter_allowed(
    frames: &[Frame],
    node: &SyntaxNode,
    options: &DistillOptions,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    if frames.len() <= options.max_recursion_depth {
        return true;
    }
    if diagnostics.is_empty() {
        tracing::warn!(
            limit = options.max_recursion_depth,
            line = node.span.start_line,
            "Symbol nesting limit reached"
        );
        diagnostics.push(Diagnostic::fatal(
            DiagnosticCode::RecursionLimit,
            format!(
                "definitions nested deeper than {} levels",
                options.max_recursion_depth
            ),
            node.span,
        ));
    }
    false
}

fn close(frames: &mut Vec<Frame>) {
    let Some(frame) = frames.pop() else {
        return;
    };
    if let Some(parent) = frames.last_mut() {
        attach(parent, frame.symbol, frame.is_impl);
    }
}

/// Add a finished symbol to its parent, merging impl blocks with their type.
fn attach(parent: &mut Frame, symbol: Symbol, is_impl: bool) {
    if symbol.kind == SymbolKind::Class {
        let existing = parent.symbol.children.iter().position(|c| {
            c.kind == SymbolKind::Class
                && c.name == symbol.name
                && (is_impl || parent.impl_only.contains(&c.name))
        });
        if let Some(index) = existing {
            let target = &mut parent.symbol.children[index];
            if is_impl {
                merge_members(target, symbol);
            } else {
                // Type defined after its impl block
                let impl_block = std::mem::replace(target, symbol);
                merge_members(target, impl_block);
                parent.impl_only.remove(&target.name);
            }
            return;
        }
        if is_impl {
            parent.impl_only.insert(symbol.name.clone());
        }
    }
    parent.symbol.children.push(symbol);
}

fn merge_members(target: &mut Symbol, other: Symbol) {
    for base in other.bases {
        if !target.bases.contains(&base) {
            target.bases.push(base);
        }
    }
    target.children.extend(other.children);
    if target.doc_comment.is_none() {
        target.doc_comment = other.doc_comment;
    }
}

// ============================================================================
// Symbol Construction
// ============================================================================

fn class_symbol(node: &SyntaxNode, header: &ClassHeader) -> Symbol {
    let mut symbol = Symbol::new(SymbolKind::Class, header.name.clone(), node.span);
    symbol.qualified_path = node.nesting_path.clone();
    symbol.visibility = header.declared_visibility;
    symbol.decorators = header.decorators.clone();
    symbol.doc_comment = node.docstring().map(str::to_string);
    symbol.bases = header.bases.clone();
    symbol.type_params = header.type_params.clone();

    let metaclass_abstract = header
        .keywords
        .iter()
        .any(|(key, value)| key == "metaclass" && is_abstract_base(value));
    symbol.is_abstract =
        header.is_abstract || metaclass_abstract || header.bases.iter().any(|b| is_abstract_base(b));
    symbol
}

fn function_symbol(node: &SyntaxNode, header: &FunctionHeader, in_class: bool) -> Symbol {
    let kind = if in_class && (header.is_accessor || header.decorators.iter().any(|d| is_property(d)))
    {
        SymbolKind::Property
    } else if in_class {
        SymbolKind::Method
    } else {
        SymbolKind::Function
    };

    let mut symbol = Symbol::new(kind, header.name.clone(), node.span);
    symbol.qualified_path = node.nesting_path.clone();
    symbol.visibility = header.declared_visibility;
    symbol.signature = Some(header.signature.clone());
    symbol.decorators = header.decorators.clone();
    symbol.doc_comment = node.docstring().map(str::to_string);
    symbol.type_params = header.type_params.clone();
    symbol.is_async = header.is_async;
    symbol.is_generator = header.is_generator;
    symbol.is_abstract = header.is_abstract || header.decorators.iter().any(|d| is_abstract_decorator(d));
    symbol
}

fn assignment_symbol(node: &SyntaxNode, data: &AssignmentData) -> Symbol {
    let kind = if data.is_constant || is_upper_snake(&data.name) {
        SymbolKind::Constant
    } else {
        SymbolKind::Field
    };
    let mut symbol = Symbol::new(kind, data.name.clone(), node.span);
    symbol.qualified_path = node.nesting_path.clone();
    symbol.visibility = data.declared_visibility;
    symbol.doc_comment = node.docstring().map(str::to_string);
    symbol.type_annotation = data.annotation.clone();
    symbol.value = data.value.clone();
    symbol
}

// ============================================================================
// Helper Functions
// ============================================================================

/// `@property`, `@cached_property`, `@name.setter` and friends.
pub fn is_property(decorator: &str) -> bool {
    let name = decorator_name(decorator);
    PROPERTY_DECORATORS.contains(&name)
        || name.ends_with(".setter")
        || name.ends_with(".getter")
        || name.ends_with(".deleter")
}

pub fn is_abstract_decorator(decorator: &str) -> bool {
    let name = decorator_name(decorator);
    let last = name.rsplit('.').next().unwrap_or(name);
    ABSTRACT_DECORATORS.contains(&last)
}

fn is_abstract_base(base: &str) -> bool {
    let base = base.split('[').next().unwrap_or(base).trim();
    let last = base.rsplit('.').next().unwrap_or(base);
    ABSTRACT_BASES.contains(&last)
}

/// Decorator text without call arguments.
fn decorator_name(decorator: &str) -> &str {
    decorator.split('(').next().unwrap_or(decorator).trim()
}

/// `MAX_SIZE`, `DEFAULT_TIMEOUT_2`: at least one letter, no lowercase.
pub fn is_upper_snake(name: &str) -> bool {
    let trimmed = name.trim_start_matches('_');
    trimmed.chars().any(|c| c.is_alphabetic())
        && trimmed
            .chars()
            .all(|c| c.is_uppercase() || c.is_ascii_digit() || c == '_')
}
