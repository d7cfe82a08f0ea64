//! TypeScript/TSX language parser using tree-sitter.

use super::treesitter::{
    Lowered, Lowering, Scope, child_of_kind, clean_doc_comment, docstring_node, field_fragment,
    fragment, has_token, span_of, text_of,
};
use super::{LanguageParser, ParseOutput};
use crate::dialect::Dialect;
use crate::options::DistillOptions;
use crate::syntax::{
    AssignmentData, BlockData, ClassHeader, FunctionHeader, NodeData, NodeKind, SyntaxNode,
};
use crate::types::{ImportSpec, ParamKind, Parameter, Signature, Visibility};
use tree_sitter::Node;

/// TypeScript/TSX source code parser.
pub struct TypeScriptParser {
    dialect: Dialect,
}

impl TypeScriptParser {
    pub fn new_typescript() -> Self {
        Self {
            dialect: Dialect::TypeScript,
        }
    }

    pub fn new_tsx() -> Self {
        Self {
            dialect: Dialect::Tsx,
        }
    }
}

impl LanguageParser for TypeScriptParser {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn parse(&self, source: &str, options: &DistillOptions) -> ParseOutput {
        super::treesitter::parse_with(source, self.dialect, &TypeScriptLowering, options)
    }
}

struct TypeScriptLowering;

impl Lowering for TypeScriptLowering {
    fn lower<'t>(&self, node: Node<'t>, source: &str, scope: &Scope<'_>) -> Lowered<'t> {
        let in_members = scope.kind == NodeKind::ClassDef;
        match node.kind() {
            "import_statement" => import(node, source, scope),
            "class_declaration" | "abstract_class_declaration" | "interface_declaration"
            | "enum_declaration" => class_like(node, source, scope),
            "function_declaration" | "generator_function_declaration" | "function_signature" => {
                function(node, source, scope)
            }
            "method_definition" | "method_signature" | "abstract_method_signature"
                if in_members =>
            {
                method(node, source, scope)
            }
            "public_field_definition" | "property_signature" if in_members => {
                member_field(node, source, scope)
            }
            "property_identifier" | "enum_assignment"
                if node.parent().is_some_and(|p| p.kind() == "enum_body") =>
            {
                enum_member(node, source, scope)
            }
            "variable_declarator" if scope.kind != NodeKind::FunctionDef => {
                variable(node, source, scope)
            }
            "type_alias_declaration" if scope.kind != NodeKind::FunctionDef => {
                type_alias(node, source, scope)
            }
            "internal_module" | "module" => match node.child_by_field_name("body") {
                Some(body) => {
                    let block = BlockData {
                        keyword: "namespace".to_string(),
                        guard: None,
                    };
                    Lowered::Open(
                        SyntaxNode::new(span_of(node), scope.path.to_vec(), NodeData::Block(block)),
                        Some(body),
                    )
                }
                None => Lowered::Skip,
            },
            "comment" | "decorator" | "string" | "template_string" | "regex" => Lowered::Skip,
            _ => Lowered::Descend,
        }
    }
}

// ============================================================================
// Imports
// ============================================================================

fn import<'t>(node: Node<'t>, source: &str, scope: &Scope<'_>) -> Lowered<'t> {
    let statement_type_only = has_token(node, "type");
    let module = node
        .child_by_field_name("source")
        .map(|s| unquote(text_of(s, source)))
        .unwrap_or_default();

    let spec = |module: &str, name: Option<String>, alias: Option<String>, type_only: bool| {
        ImportSpec {
            module: module.to_string(),
            name,
            alias,
            level: 0,
            is_wildcard: false,
            type_only: statement_type_only || type_only,
            guard: None,
        }
    };

    let mut specs = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "import_clause" => {
                let mut clause_cursor = child.walk();
                for part in child.named_children(&mut clause_cursor) {
                    match part.kind() {
                        // import Foo from 'm'
                        "identifier" => specs.push(spec(
                            &module,
                            Some("default".to_string()),
                            fragment(part, source),
                            false,
                        )),
                        // import * as ns from 'm'
                        "namespace_import" => {
                            let alias = child_of_kind(part, "identifier")
                                .and_then(|id| fragment(id, source));
                            specs.push(spec(&module, None, alias, false));
                        }
                        "named_imports" => {
                            let mut names_cursor = part.walk();
                            for specifier in part.named_children(&mut names_cursor) {
                                if specifier.kind() != "import_specifier" {
                                    continue;
                                }
                                let Some(name) = specifier
                                    .child_by_field_name("name")
                                    .map(|n| unquote(text_of(n, source)))
                                else {
                                    continue;
                                };
                                specs.push(spec(
                                    &module,
                                    Some(name),
                                    field_fragment(specifier, "alias", source),
                                    has_token(specifier, "type"),
                                ));
                            }
                        }
                        _ => {}
                    }
                }
            }
            // import fs = require('fs')
            "import_require_clause" => {
                let required = child
                    .child_by_field_name("source")
                    .map(|s| unquote(text_of(s, source)))
                    .unwrap_or_else(|| module.clone());
                let alias = child_of_kind(child, "identifier").and_then(|id| fragment(id, source));
                specs.push(spec(&required, None, alias, false));
            }
            _ => {}
        }
    }

    // Side-effect imports bind nothing
    if specs.is_empty() {
        return Lowered::Skip;
    }
    Lowered::Emit(SyntaxNode::new(
        span_of(node),
        scope.path.to_vec(),
        NodeData::Import(specs),
    ))
}

fn unquote(text: &str) -> String {
    text.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}

// ============================================================================
// Declarations
// ============================================================================

/// Classes, interfaces and enums.
fn class_like<'t>(node: Node<'t>, source: &str, scope: &Scope<'_>) -> Lowered<'t> {
    let Some(name) = field_fragment(node, "name", source) else {
        return Lowered::Descend;
    };
    let kind = node.kind();

    let header = ClassHeader {
        name,
        bases: heritage(node, source),
        type_params: field_fragment(node, "type_parameters", source),
        decorators: decorators(node, source),
        declared_visibility: declaration_visibility(node, scope),
        is_abstract: matches!(kind, "abstract_class_declaration" | "interface_declaration"),
        ..ClassHeader::default()
    };

    let mut syntax = SyntaxNode::new(span_of(node), scope.path.to_vec(), NodeData::Class(header));
    attach_doc(&mut syntax, node, source, scope, true);
    Lowered::Open(syntax, node.child_by_field_name("body"))
}

/// `extends`/`implements` clauses as written.
fn heritage(node: Node, source: &str) -> Vec<String> {
    let mut bases = Vec::new();
    let mut clauses = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "class_heritage" => {
                let mut inner = child.walk();
                clauses.extend(child.named_children(&mut inner));
            }
            "extends_type_clause" => clauses.push(child),
            _ => {}
        }
    }

    for clause in clauses {
        match clause.kind() {
            "extends_clause" => {
                let text = text_of(clause, source).trim();
                let text = text.strip_prefix("extends").unwrap_or(text);
                bases.extend(fragment_str(text));
            }
            "implements_clause" | "extends_type_clause" => {
                let mut inner = clause.walk();
                bases.extend(
                    clause
                        .named_children(&mut inner)
                        .filter_map(|t| fragment(t, source)),
                );
            }
            _ => {}
        }
    }
    bases
}

fn fragment_str(text: &str) -> Option<String> {
    let text = crate::syntax::collapse_lines(text).trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn function<'t>(node: Node<'t>, source: &str, scope: &Scope<'_>) -> Lowered<'t> {
    let Some(name) = field_fragment(node, "name", source) else {
        return Lowered::Descend;
    };
    let mut header = function_header(node, name, source);
    header.declared_visibility = declaration_visibility(node, scope);
    header.decorators = decorators(node, source);

    let mut syntax = SyntaxNode::new(span_of(node), scope.path.to_vec(), NodeData::Function(header));
    attach_doc(&mut syntax, node, source, scope, true);
    open_function(syntax, node)
}

fn method<'t>(node: Node<'t>, source: &str, scope: &Scope<'_>) -> Lowered<'t> {
    let Some(name_node) = node.child_by_field_name("name") else {
        return Lowered::Descend;
    };
    let Some(name) = fragment(name_node, source) else {
        return Lowered::Descend;
    };
    let in_interface = in_interface_body(node);

    let mut header = function_header(node, name, source);
    header.declared_visibility = Some(if in_interface {
        Visibility::Public
    } else {
        member_visibility(node, name_node, source)
    });
    header.decorators = preceding_decorators(node, source);
    header.is_abstract |= in_interface || node.kind() == "abstract_method_signature";

    let mut syntax = SyntaxNode::new(span_of(node), scope.path.to_vec(), NodeData::Function(header));
    attach_doc(&mut syntax, node, source, scope, true);
    open_function(syntax, node)
}

fn open_function<'t>(syntax: SyntaxNode, node: Node<'t>) -> Lowered<'t> {
    match node.child_by_field_name("body") {
        Some(body) if body.kind() == "statement_block" => Lowered::Open(syntax, Some(body)),
        _ => Lowered::Emit(syntax),
    }
}

fn function_header(node: Node, name: String, source: &str) -> FunctionHeader {
    let kind = node.kind();
    FunctionHeader {
        name,
        signature: signature(node, source),
        type_params: field_fragment(node, "type_parameters", source),
        is_async: has_token(node, "async"),
        is_generator: kind.starts_with("generator_") || has_token(node, "*"),
        is_abstract: has_token(node, "abstract"),
        is_accessor: has_token(node, "get") || has_token(node, "set"),
        ..FunctionHeader::default()
    }
}

fn signature(node: Node, source: &str) -> Signature {
    let mut parameters = Vec::new();

    if let Some(params) = node.child_by_field_name("parameters") {
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            if !matches!(param.kind(), "required_parameter" | "optional_parameter") {
                continue;
            }
            let Some(pattern) = param.child_by_field_name("pattern") else {
                continue;
            };
            let (name, kind) = if pattern.kind() == "rest_pattern" {
                let text = text_of(pattern, source).trim();
                (
                    text.strip_prefix("...").unwrap_or(text).trim().to_string(),
                    ParamKind::VarPositional,
                )
            } else {
                (
                    fragment(pattern, source).unwrap_or_default(),
                    ParamKind::Positional,
                )
            };
            parameters.push(Parameter {
                name,
                annotation: type_annotation(param, source),
                default: field_fragment(param, "value", source),
                kind,
            });
        }
    } else if let Some(param) = node.child_by_field_name("parameter") {
        // Arrow function with a single bare parameter
        if let Some(name) = fragment(param, source) {
            parameters.push(Parameter {
                name,
                annotation: None,
                default: None,
                kind: ParamKind::Positional,
            });
        }
    }

    let return_type = node.child_by_field_name("return_type").and_then(|t| {
        let text = text_of(t, source).trim();
        fragment_str(text.strip_prefix(':').unwrap_or(text))
    });

    Signature {
        parameters,
        return_type,
    }
}

/// Type of a parameter, field or variable without the leading `:`.
fn type_annotation(node: Node, source: &str) -> Option<String> {
    let annotation = node.child_by_field_name("type")?;
    let text = text_of(annotation, source).trim();
    fragment_str(text.strip_prefix(':').unwrap_or(text))
}

fn member_field<'t>(node: Node<'t>, source: &str, scope: &Scope<'_>) -> Lowered<'t> {
    let Some(name_node) = node.child_by_field_name("name") else {
        return Lowered::Skip;
    };
    let Some(name) = fragment(name_node, source) else {
        return Lowered::Skip;
    };
    let visibility = if in_interface_body(node) {
        Visibility::Public
    } else {
        member_visibility(node, name_node, source)
    };

    let data = AssignmentData {
        name,
        annotation: type_annotation(node, source),
        value: field_fragment(node, "value", source),
        declared_visibility: Some(visibility),
        is_constant: has_token(node, "readonly"),
    };
    let mut syntax = SyntaxNode::new(span_of(node), scope.path.to_vec(), NodeData::Assignment(data));
    attach_doc(&mut syntax, node, source, scope, false);
    Lowered::Emit(syntax)
}

fn enum_member<'t>(node: Node<'t>, source: &str, scope: &Scope<'_>) -> Lowered<'t> {
    let (name, value) = if node.kind() == "enum_assignment" {
        (
            node.child_by_field_name("name")
                .map(|n| unquote(text_of(n, source))),
            field_fragment(node, "value", source),
        )
    } else {
        (fragment(node, source), None)
    };
    let Some(name) = name else {
        return Lowered::Skip;
    };
    let data = AssignmentData {
        name,
        annotation: None,
        value,
        declared_visibility: Some(Visibility::Public),
        is_constant: true,
    };
    Lowered::Emit(SyntaxNode::new(
        span_of(node),
        scope.path.to_vec(),
        NodeData::Assignment(data),
    ))
}

/// `const`/`let`/`var` declarators in module and namespace bodies. Function
/// initializers become functions.
fn variable<'t>(node: Node<'t>, source: &str, scope: &Scope<'_>) -> Lowered<'t> {
    let Some(declaration) = node
        .parent()
        .filter(|p| matches!(p.kind(), "lexical_declaration" | "variable_declaration"))
    else {
        return Lowered::Descend;
    };
    if !is_declaration_statement(declaration) {
        return Lowered::Descend;
    }
    // Destructuring patterns bind several names; not tracked
    let Some(name) = node
        .child_by_field_name("name")
        .filter(|n| n.kind() == "identifier")
        .and_then(|n| fragment(n, source))
    else {
        return Lowered::Descend;
    };

    let visibility = declaration_visibility(declaration, scope);
    let value = node.child_by_field_name("value");

    if let Some(func) = value.filter(|v| {
        matches!(
            v.kind(),
            "arrow_function" | "function_expression" | "function" | "generator_function"
        )
    }) {
        let mut header = function_header(func, name, source);
        header.declared_visibility = visibility;
        let mut syntax = SyntaxNode::new(span_of(node), scope.path.to_vec(), NodeData::Function(header));
        attach_doc(&mut syntax, declaration, source, scope, true);
        return open_function(syntax, func);
    }

    let data = AssignmentData {
        name,
        annotation: type_annotation(node, source),
        value: value.and_then(|v| fragment(v, source)),
        declared_visibility: visibility,
        is_constant: declaration
            .child(0)
            .is_some_and(|first| first.kind() == "const"),
    };
    let mut syntax = SyntaxNode::new(span_of(node), scope.path.to_vec(), NodeData::Assignment(data));
    attach_doc(&mut syntax, declaration, source, scope, false);
    Lowered::Emit(syntax)
}

fn type_alias<'t>(node: Node<'t>, source: &str, scope: &Scope<'_>) -> Lowered<'t> {
    let Some(name) = field_fragment(node, "name", source) else {
        return Lowered::Skip;
    };
    let data = AssignmentData {
        name,
        annotation: None,
        value: field_fragment(node, "value", source),
        declared_visibility: declaration_visibility(node, scope),
        is_constant: true,
    };
    let mut syntax = SyntaxNode::new(span_of(node), scope.path.to_vec(), NodeData::Assignment(data));
    attach_doc(&mut syntax, node, source, scope, false);
    Lowered::Emit(syntax)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Statement-level declaration (not a `for` loop binding).
fn is_declaration_statement(declaration: Node) -> bool {
    match declaration.parent() {
        Some(parent) => match parent.kind() {
            "program" | "export_statement" | "ambient_declaration" => true,
            "statement_block" => parent
                .parent()
                .is_some_and(|p| matches!(p.kind(), "internal_module" | "module")),
            _ => false,
        },
        None => false,
    }
}

/// Exported declarations are public; others in module and namespace
/// bodies are private. Declarations local to functions are left to the
/// naming convention.
fn declaration_visibility(node: Node, scope: &Scope<'_>) -> Option<Visibility> {
    if scope.kind == NodeKind::FunctionDef {
        return None;
    }
    Some(if export_statement(node).is_some() {
        Visibility::Public
    } else {
        Visibility::Private
    })
}

fn export_statement(node: Node) -> Option<Node> {
    let mut cur = node.parent();
    while let Some(parent) = cur {
        match parent.kind() {
            "export_statement" => return Some(parent),
            "ambient_declaration" => cur = parent.parent(),
            _ => return None,
        }
    }
    None
}

fn member_visibility(node: Node, name_node: Node, source: &str) -> Visibility {
    if let Some(modifier) = child_of_kind(node, "accessibility_modifier") {
        return match text_of(modifier, source).trim() {
            "private" => Visibility::Private,
            "protected" => Visibility::Protected,
            _ => Visibility::Public,
        };
    }
    if name_node.kind() == "private_property_identifier" {
        Visibility::Private
    } else {
        Visibility::Public
    }
}

fn in_interface_body(node: Node) -> bool {
    node.parent()
        .is_some_and(|p| matches!(p.kind(), "interface_body" | "object_type"))
}

/// Decorators on a declaration or its `export` statement, without `@`.
fn decorators(node: Node, source: &str) -> Vec<String> {
    let mut found = Vec::new();
    let owners = export_statement(node).into_iter().chain(std::iter::once(node));
    for owner in owners {
        let mut cursor = owner.walk();
        found.extend(
            owner
                .children(&mut cursor)
                .filter(|c| c.kind() == "decorator")
                .filter_map(|d| decorator_text(d, source)),
        );
    }
    found
}

/// Member decorators precede the member inside the class body.
fn preceding_decorators(node: Node, source: &str) -> Vec<String> {
    let mut found = decorators(node, source);
    let mut preceding = Vec::new();
    let mut cur = node.prev_sibling();
    while let Some(sib) = cur {
        match sib.kind() {
            "decorator" => preceding.extend(decorator_text(sib, source)),
            "comment" => {}
            _ => break,
        }
        cur = sib.prev_sibling();
    }
    preceding.reverse();
    preceding.append(&mut found);
    preceding
}

fn decorator_text(node: Node, source: &str) -> Option<String> {
    let text = text_of(node, source).trim();
    fragment_str(text.strip_prefix('@').unwrap_or(text))
}

/// Attach a preceding `/** */` comment as the node's docstring.
fn attach_doc(syntax: &mut SyntaxNode, node: Node, source: &str, scope: &Scope<'_>, nested: bool) {
    let anchor = export_statement(node).unwrap_or(node);
    let mut cur = anchor.prev_sibling();
    while let Some(sib) = cur.filter(|s| s.kind() == "decorator") {
        cur = sib.prev_sibling();
    }
    let Some(comment) = cur.filter(|c| c.kind() == "comment") else {
        return;
    };
    let text = text_of(comment, source);
    if !text.trim_start().starts_with("/**") {
        return;
    }
    let doc = clean_doc_comment(&[text]);
    if doc.is_empty() {
        return;
    }
    let mut path = scope.path.to_vec();
    if nested {
        path.extend(syntax.name().map(str::to_string));
    }
    syntax
        .children
        .insert(0, docstring_node(doc, span_of(comment), &path));
}
