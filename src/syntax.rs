//! Concrete syntax nodes shared by every dialect parser.
//!
//! Parsers keep only the structure the symbol builder needs: definitions,
//! imports, assignments, docstrings and the control-flow blocks that contain
//! them. Header details are recorded as written; visibility keywords are
//! carried verbatim and only interpreted by the visibility resolver.

use crate::types::{GuardKind, ImportSpec, Signature, Span, Visibility};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Module,
    ClassDef,
    FunctionDef,
    Import,
    Assignment,
    Docstring,
    /// Control-flow container such as `if`, `try` or `match`. Transparent to
    /// nesting paths.
    Block,
}

/// Class, struct, trait, interface or enum header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassHeader {
    pub name: String,
    pub bases: Vec<String>,
    /// `name=value` class keywords such as `metaclass=ABCMeta`
    pub keywords: Vec<(String, String)>,
    pub type_params: Option<String>,
    pub decorators: Vec<String>,
    pub declared_visibility: Option<Visibility>,
    pub is_abstract: bool,
    /// Rust `impl` block: merged into the type of the same name
    pub is_impl: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionHeader {
    pub name: String,
    pub signature: Signature,
    pub type_params: Option<String>,
    pub decorators: Vec<String>,
    pub declared_visibility: Option<Visibility>,
    pub is_async: bool,
    pub is_generator: bool,
    pub is_abstract: bool,
    /// TypeScript `get`/`set` accessor
    pub is_accessor: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentData {
    pub name: String,
    pub annotation: Option<String>,
    pub value: Option<String>,
    pub declared_visibility: Option<Visibility>,
    /// Declared immutable (`const`, `static`) regardless of naming
    pub is_constant: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockData {
    pub keyword: String,
    pub guard: Option<GuardKind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Module,
    Class(ClassHeader),
    Function(FunctionHeader),
    Import(Vec<ImportSpec>),
    Assignment(AssignmentData),
    Docstring(String),
    Block(BlockData),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    pub span: Span,
    /// Names of the enclosing definitions, outermost first
    pub nesting_path: Vec<String>,
    pub data: NodeData,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn new(span: Span, nesting_path: Vec<String>, data: NodeData) -> Self {
        let kind = match &data {
            NodeData::Module => NodeKind::Module,
            NodeData::Class(_) => NodeKind::ClassDef,
            NodeData::Function(_) => NodeKind::FunctionDef,
            NodeData::Import(_) => NodeKind::Import,
            NodeData::Assignment(_) => NodeKind::Assignment,
            NodeData::Docstring(_) => NodeKind::Docstring,
            NodeData::Block(_) => NodeKind::Block,
        };
        Self {
            kind,
            span,
            nesting_path,
            data,
            children: Vec::new(),
        }
    }

    pub fn module(span: Span) -> Self {
        Self::new(span, Vec::new(), NodeData::Module)
    }

    /// Name of a definition or assignment.
    pub fn name(&self) -> Option<&str> {
        match &self.data {
            NodeData::Class(c) => Some(&c.name),
            NodeData::Function(f) => Some(&f.name),
            NodeData::Assignment(a) => Some(&a.name),
            _ => None,
        }
    }

    pub fn is_definition(&self) -> bool {
        matches!(self.kind, NodeKind::ClassDef | NodeKind::FunctionDef)
    }

    /// Docstring attached directly to this node's body.
    pub fn docstring(&self) -> Option<&str> {
        self.children.iter().find_map(|c| match &c.data {
            NodeData::Docstring(doc) => Some(doc.as_str()),
            _ => None,
        })
    }

    /// Count of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }
}

/// Collapse whitespace runs that span physical lines into a single space.
pub fn collapse_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending: Option<String> = None;
    for ch in text.chars() {
        if ch.is_whitespace() || (ch == '\\' && pending.is_some()) {
            pending.get_or_insert_with(String::new).push(ch);
            continue;
        }
        if let Some(run) = pending.take() {
            if run.contains('\n') {
                out.push(' ');
            } else {
                out.push_str(&run);
            }
        }
        out.push(ch);
    }
    out
}
