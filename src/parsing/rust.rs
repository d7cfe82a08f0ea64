//! Rust language parser using tree-sitter.

use super::treesitter::{
    Lowered, Lowering, Scope, child_of_kind, clean_doc_comment, docstring_node, field_fragment,
    fragment, span_of, text_of,
};
use super::{LanguageParser, ParseOutput};
use crate::dialect::Dialect;
use crate::options::DistillOptions;
use crate::syntax::{
    AssignmentData, BlockData, ClassHeader, FunctionHeader, NodeData, NodeKind, SyntaxNode,
};
use crate::types::{GuardKind, ImportSpec, ParamKind, Parameter, Signature, Visibility};
use tree_sitter::Node;

/// Rust source code parser.
pub struct RustParser {
    // Parser instance is created per-use since it's not Send
}

impl RustParser {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for RustParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for RustParser {
    fn dialect(&self) -> Dialect {
        Dialect::Rust
    }

    fn parse(&self, source: &str, options: &DistillOptions) -> ParseOutput {
        super::treesitter::parse_with(source, Dialect::Rust, &RustLowering, options)
    }
}

struct RustLowering;

impl Lowering for RustLowering {
    fn lower<'t>(&self, node: Node<'t>, source: &str, scope: &Scope<'_>) -> Lowered<'t> {
        match node.kind() {
            "function_item" | "function_signature_item" => function(node, source, scope),
            "struct_item" | "enum_item" | "union_item" | "trait_item" => {
                type_item(node, source, scope)
            }
            "impl_item" => impl_item(node, source, scope),
            "const_item" | "static_item" | "type_item" => constant(node, source, scope),
            "field_declaration" if scope.kind == NodeKind::ClassDef => field(node, source, scope),
            "enum_variant" => variant(node, source, scope),
            "use_declaration" => use_declaration(node, source, scope),
            "extern_crate_declaration" => extern_crate(node, source, scope),
            "mod_item" => match node.child_by_field_name("body") {
                Some(body) => {
                    let block = BlockData {
                        keyword: "mod".to_string(),
                        guard: cfg_guard(node, source),
                    };
                    Lowered::Open(
                        SyntaxNode::new(span_of(node), scope.path.to_vec(), NodeData::Block(block)),
                        Some(body),
                    )
                }
                None => Lowered::Skip,
            },
            "line_comment" | "block_comment" => inner_doc(node, source, scope),
            "attribute_item" | "inner_attribute_item" | "macro_definition" | "string_literal"
            | "raw_string_literal" => Lowered::Skip,
            _ => Lowered::Descend,
        }
    }
}

// ============================================================================
// Declarations
// ============================================================================

fn function<'t>(node: Node<'t>, source: &str, scope: &Scope<'_>) -> Lowered<'t> {
    let Some(name) = field_fragment(node, "name", source) else {
        return Lowered::Descend;
    };
    let container = container_kind(node);
    let in_trait = container.is_some_and(|(kind, _)| kind == "trait_item");
    let in_trait_impl = container.is_some_and(|(kind, has_trait)| kind == "impl_item" && has_trait);

    let is_async = child_of_kind(node, "function_modifiers")
        .is_some_and(|m| text_of(m, source).split_whitespace().any(|w| w == "async"));

    let header = FunctionHeader {
        name,
        signature: signature(node, source),
        type_params: field_fragment(node, "type_parameters", source),
        decorators: attributes(node, source),
        declared_visibility: Some(declared_visibility(node, source, in_trait || in_trait_impl)),
        is_async,
        is_abstract: in_trait && node.kind() == "function_signature_item",
        ..FunctionHeader::default()
    };

    let mut syntax = SyntaxNode::new(span_of(node), scope.path.to_vec(), NodeData::Function(header));
    let mut inner_path = scope.path.to_vec();
    inner_path.extend(syntax.name().map(str::to_string));
    if let Some(doc) = doc_comment(node, source) {
        syntax
            .children
            .push(docstring_node(doc, span_of(node), &inner_path));
    }

    match node.child_by_field_name("body") {
        Some(body) => Lowered::Open(syntax, Some(body)),
        None => Lowered::Emit(syntax),
    }
}

fn signature(node: Node, source: &str) -> Signature {
    let mut parameters = Vec::new();
    if let Some(params) = node.child_by_field_name("parameters") {
        let mut cursor = params.walk();
        for child in params.named_children(&mut cursor) {
            let param = match child.kind() {
                "parameter" => field_fragment(child, "pattern", source).map(|name| Parameter {
                    name,
                    annotation: field_fragment(child, "type", source),
                    default: None,
                    kind: ParamKind::Positional,
                }),
                "self_parameter" => fragment(child, source).map(|name| Parameter {
                    name,
                    annotation: None,
                    default: None,
                    kind: ParamKind::Positional,
                }),
                "variadic_parameter" => Some(Parameter {
                    name: "...".to_string(),
                    annotation: None,
                    default: None,
                    kind: ParamKind::VarPositional,
                }),
                _ => None,
            };
            parameters.extend(param);
        }
    }

    Signature {
        parameters,
        return_type: field_fragment(node, "return_type", source),
    }
}

fn type_item<'t>(node: Node<'t>, source: &str, scope: &Scope<'_>) -> Lowered<'t> {
    let Some(name) = field_fragment(node, "name", source) else {
        return Lowered::Descend;
    };
    let is_trait = node.kind() == "trait_item";

    let bases = if is_trait {
        node.child_by_field_name("bounds")
            .map(|bounds| {
                let mut cursor = bounds.walk();
                let names: Vec<String> = bounds
                    .named_children(&mut cursor)
                    .filter_map(|b| fragment(b, source))
                    .collect();
                names
            })
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    let header = ClassHeader {
        name,
        bases,
        type_params: field_fragment(node, "type_parameters", source),
        decorators: attributes(node, source),
        declared_visibility: Some(declared_visibility(node, source, false)),
        is_abstract: is_trait,
        ..ClassHeader::default()
    };

    let mut syntax = SyntaxNode::new(span_of(node), scope.path.to_vec(), NodeData::Class(header));
    let mut inner_path = scope.path.to_vec();
    inner_path.extend(syntax.name().map(str::to_string));
    if let Some(doc) = doc_comment(node, source) {
        syntax
            .children
            .push(docstring_node(doc, span_of(node), &inner_path));
    }

    // Tuple structs carry no named members
    let body = node
        .child_by_field_name("body")
        .filter(|b| b.kind() != "ordered_field_declaration_list");
    Lowered::Open(syntax, body)
}

fn impl_item<'t>(node: Node<'t>, source: &str, scope: &Scope<'_>) -> Lowered<'t> {
    let Some(name) = impl_type_ident(node, source) else {
        return Lowered::Descend;
    };
    let header = ClassHeader {
        name,
        bases: field_fragment(node, "trait", source).into_iter().collect(),
        type_params: field_fragment(node, "type_parameters", source),
        decorators: attributes(node, source),
        is_impl: true,
        ..ClassHeader::default()
    };
    let syntax = SyntaxNode::new(span_of(node), scope.path.to_vec(), NodeData::Class(header));
    Lowered::Open(syntax, node.child_by_field_name("body"))
}

/// `const`, `static` and `type` items.
fn constant<'t>(node: Node<'t>, source: &str, scope: &Scope<'_>) -> Lowered<'t> {
    if scope.kind == NodeKind::FunctionDef {
        return Lowered::Skip;
    }
    let Some(name) = field_fragment(node, "name", source) else {
        return Lowered::Skip;
    };
    let in_trait = container_kind(node).is_some_and(|(kind, has_trait)| {
        kind == "trait_item" || (kind == "impl_item" && has_trait)
    });

    let (annotation, value) = if node.kind() == "type_item" {
        (None, field_fragment(node, "type", source))
    } else {
        (
            field_fragment(node, "type", source),
            field_fragment(node, "value", source),
        )
    };

    let data = AssignmentData {
        name,
        annotation,
        value,
        declared_visibility: Some(declared_visibility(node, source, in_trait)),
        is_constant: true,
    };
    Lowered::Emit(assignment_node(node, source, scope, data))
}

fn field<'t>(node: Node<'t>, source: &str, scope: &Scope<'_>) -> Lowered<'t> {
    let Some(name) = field_fragment(node, "name", source) else {
        return Lowered::Skip;
    };
    let data = AssignmentData {
        name,
        annotation: field_fragment(node, "type", source),
        value: None,
        declared_visibility: Some(declared_visibility(node, source, false)),
        is_constant: false,
    };
    Lowered::Emit(assignment_node(node, source, scope, data))
}

fn variant<'t>(node: Node<'t>, source: &str, scope: &Scope<'_>) -> Lowered<'t> {
    let Some(name) = field_fragment(node, "name", source) else {
        return Lowered::Skip;
    };
    let data = AssignmentData {
        name,
        annotation: None,
        value: field_fragment(node, "value", source),
        declared_visibility: Some(Visibility::Public),
        is_constant: true,
    };
    Lowered::Emit(assignment_node(node, source, scope, data))
}

fn assignment_node(node: Node, source: &str, scope: &Scope<'_>, data: AssignmentData) -> SyntaxNode {
    let mut syntax = SyntaxNode::new(span_of(node), scope.path.to_vec(), NodeData::Assignment(data));
    if let Some(doc) = doc_comment(node, source) {
        syntax
            .children
            .push(docstring_node(doc, span_of(node), scope.path));
    }
    syntax
}

// ============================================================================
// Imports
// ============================================================================

fn use_declaration<'t>(node: Node<'t>, source: &str, scope: &Scope<'_>) -> Lowered<'t> {
    let Some(argument) = node.child_by_field_name("argument") else {
        return Lowered::Skip;
    };
    let guard = cfg_guard(node, source);
    let mut specs = use_tree_specs(argument, source);
    for spec in specs.iter_mut() {
        spec.guard = guard;
    }
    if specs.is_empty() {
        return Lowered::Skip;
    }
    Lowered::Emit(SyntaxNode::new(
        span_of(node),
        scope.path.to_vec(),
        NodeData::Import(specs),
    ))
}

/// Flatten a use tree into one spec per bound name.
fn use_tree_specs(argument: Node, source: &str) -> Vec<ImportSpec> {
    let mut specs = Vec::new();
    let mut stack = vec![(argument, String::new())];

    while let Some((node, prefix)) = stack.pop() {
        match node.kind() {
            "identifier" | "scoped_identifier" | "self" | "crate" | "super" | "metavariable" => {
                let path = join_path(&prefix, text_of(node, source));
                specs.push(path_spec(&path, None));
            }
            "use_as_clause" => {
                let path = node
                    .child_by_field_name("path")
                    .map(|p| join_path(&prefix, text_of(p, source)));
                if let Some(path) = path {
                    let alias = field_fragment(node, "alias", source);
                    specs.push(path_spec(&path, alias));
                }
            }
            "use_wildcard" => {
                let text = text_of(node, source);
                let path = match text.strip_suffix("::*") {
                    Some(inner) => join_path(&prefix, inner),
                    None => prefix.clone(),
                };
                specs.push(ImportSpec {
                    module: path,
                    name: Some("*".to_string()),
                    alias: None,
                    level: 0,
                    is_wildcard: true,
                    type_only: false,
                    guard: None,
                });
            }
            "scoped_use_list" => {
                let new_prefix = match node.child_by_field_name("path") {
                    Some(path) => join_path(&prefix, text_of(path, source)),
                    None => prefix.clone(),
                };
                if let Some(list) = node.child_by_field_name("list") {
                    push_named_children(&mut stack, list, &new_prefix);
                }
            }
            "use_list" => push_named_children(&mut stack, node, &prefix),
            _ => {}
        }
    }
    specs
}

fn push_named_children<'t>(stack: &mut Vec<(Node<'t>, String)>, node: Node<'t>, prefix: &str) {
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.named_children(&mut cursor).collect();
    stack.extend(children.into_iter().rev().map(|c| (c, prefix.to_string())));
}

/// `a::b::c` imports `c` from `a::b`; `{self}` imports the prefix itself.
fn path_spec(path: &str, alias: Option<String>) -> ImportSpec {
    let path = path.strip_suffix("::self").unwrap_or(path);
    let (module, name) = match path.rsplit_once("::") {
        Some((module, name)) => (module.to_string(), Some(name.to_string())),
        None => (path.to_string(), None),
    };
    ImportSpec {
        module,
        name,
        alias,
        level: 0,
        is_wildcard: false,
        type_only: false,
        guard: None,
    }
}

fn join_path(prefix: &str, segment: &str) -> String {
    let segment: String = segment.split_whitespace().collect();
    if prefix.is_empty() {
        segment
    } else {
        format!("{}::{}", prefix, segment)
    }
}

fn extern_crate<'t>(node: Node<'t>, source: &str, scope: &Scope<'_>) -> Lowered<'t> {
    let Some(name) = field_fragment(node, "name", source) else {
        return Lowered::Skip;
    };
    let spec = ImportSpec {
        module: name,
        name: None,
        alias: field_fragment(node, "alias", source),
        level: 0,
        is_wildcard: false,
        type_only: false,
        guard: cfg_guard(node, source),
    };
    Lowered::Emit(SyntaxNode::new(
        span_of(node),
        scope.path.to_vec(),
        NodeData::Import(vec![spec]),
    ))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Kind of the item whose declaration list holds `node`, and whether it is
/// a trait impl.
fn container_kind(node: Node) -> Option<(&'static str, bool)> {
    let list = node.parent().filter(|p| p.kind() == "declaration_list")?;
    let item = list.parent()?;
    Some((item.kind(), item.child_by_field_name("trait").is_some()))
}

/// Extract the type identifier for an impl item.
fn impl_type_ident(impl_node: Node, source: &str) -> Option<String> {
    let ty = impl_node.child_by_field_name("type")?;
    // First identifier of the type (e.g., "Foo" from "Foo<T>")
    text_of(ty, source)
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .find(|s| !s.is_empty() && *s != "dyn" && *s != "mut")
        .map(str::to_string)
}

fn declared_visibility(node: Node, source: &str, inherits_public: bool) -> Visibility {
    match child_of_kind(node, "visibility_modifier") {
        Some(modifier) => {
            let text: String = text_of(modifier, source).split_whitespace().collect();
            if text == "pub" {
                Visibility::Public
            } else if text == "pub(self)" {
                Visibility::Private
            } else {
                Visibility::Protected
            }
        }
        None if inherits_public => Visibility::Public,
        None => Visibility::Private,
    }
}

/// Outer attributes before `node`, without `#[` and `]`.
fn attributes(node: Node, source: &str) -> Vec<String> {
    let mut attrs = Vec::new();
    let mut cur = node.prev_sibling();
    while let Some(sib) = cur {
        match sib.kind() {
            "attribute_item" => {
                let text = text_of(sib, source).trim();
                let inner = text
                    .strip_prefix("#[")
                    .and_then(|t| t.strip_suffix(']'))
                    .unwrap_or(text);
                attrs.push(inner.trim().to_string());
            }
            "line_comment" | "block_comment" => {}
            _ => break,
        }
        cur = sib.prev_sibling();
    }
    attrs.reverse();
    attrs
}

/// Doc comments before `node`, attributes in between allowed.
fn doc_comment(node: Node, source: &str) -> Option<String> {
    let mut lines = Vec::new();
    let mut cur = node.prev_sibling();
    while let Some(sib) = cur {
        match sib.kind() {
            "line_comment" | "block_comment" => {
                let text = text_of(sib, source).trim();
                if text.starts_with("///") || text.starts_with("/**") {
                    lines.push(text);
                } else {
                    break;
                }
            }
            "attribute_item" => {}
            _ => break,
        }
        cur = sib.prev_sibling();
    }
    if lines.is_empty() {
        return None;
    }
    lines.reverse();
    let doc = clean_doc_comment(&lines);
    (!doc.is_empty()).then_some(doc)
}

/// `//!` comments at the top of a file or module become its docstring.
fn inner_doc<'t>(node: Node<'t>, source: &str, scope: &Scope<'_>) -> Lowered<'t> {
    let is_inner = |n: Node| {
        let text = text_of(n, source).trim_start();
        text.starts_with("//!") || text.starts_with("/*!")
    };
    if !is_inner(node) || node.prev_sibling().is_some_and(is_inner) {
        return Lowered::Skip;
    }

    let mut lines = vec![text_of(node, source)];
    let mut span = span_of(node);
    let mut cur = node.next_sibling();
    while let Some(sib) = cur.filter(|s| is_inner(*s)) {
        lines.push(text_of(sib, source));
        span = span.cover(span_of(sib));
        cur = sib.next_sibling();
    }
    Lowered::Emit(docstring_node(clean_doc_comment(&lines), span, scope.path))
}

/// Guard implied by `#[cfg(..)]` attributes.
fn cfg_guard(node: Node, source: &str) -> Option<GuardKind> {
    let cfgs: Vec<String> = attributes(node, source)
        .into_iter()
        .filter(|a| a.starts_with("cfg"))
        .collect();
    if cfgs.is_empty() {
        return None;
    }
    let platform = cfgs.iter().any(|c| {
        ["target_os", "target_family", "target_arch", "unix", "windows"]
            .iter()
            .any(|p| c.contains(p))
    });
    Some(if platform {
        GuardKind::Platform
    } else {
        GuardKind::Other
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> ParseOutput {
        RustParser::new().parse(source, &DistillOptions::default())
    }

    fn import_specs(root: &SyntaxNode) -> Vec<ImportSpec> {
        root.children
            .iter()
            .filter_map(|n| match &n.data {
                NodeData::Import(specs) => Some(specs.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[test]
    fn test_struct_and_impl() {
        let source = r#"
/// A test struct
pub struct MyStruct {
    pub value: i32,
    hidden: String,
}

impl MyStruct {
    pub fn new(value: i32) -> Self {
        Self { value, hidden: String::new() }
    }

    async fn internal(&self) -> i32 {
        self.value
    }
}
"#;
        let output = parse(source);
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        let root = output.root;
        assert_eq!(root.children.len(), 2);

        let strukt = &root.children[0];
        assert_eq!(strukt.name(), Some("MyStruct"));
        assert_eq!(strukt.docstring(), Some("A test struct"));
        let fields: Vec<(&str, Option<Visibility>)> = strukt
            .children
            .iter()
            .filter_map(|c| match &c.data {
                NodeData::Assignment(a) => Some((a.name.as_str(), a.declared_visibility)),
                _ => None,
            })
            .collect();
        assert_eq!(
            fields,
            vec![
                ("value", Some(Visibility::Public)),
                ("hidden", Some(Visibility::Private))
            ]
        );

        let imp = &root.children[1];
        let NodeData::Class(header) = &imp.data else {
            panic!("expected impl header");
        };
        assert!(header.is_impl);
        assert_eq!(imp.children.len(), 2);
        let NodeData::Function(internal) = &imp.children[1].data else {
            panic!("expected method");
        };
        assert!(internal.is_async);
        assert_eq!(internal.signature.parameters[0].name, "&self");
        assert_eq!(internal.signature.return_type.as_deref(), Some("i32"));
        assert_eq!(imp.children[1].nesting_path, vec!["MyStruct"]);
    }

    #[test]
    fn test_trait_methods() {
        let source = r#"
pub trait Shape: Debug + Clone {
    fn area(&self) -> f64;
    fn name(&self) -> String { String::from("shape") }
}

impl Shape for Circle {
    fn area(&self) -> f64 { 3.14 }
}
"#;
        let root = parse(source).root;
        let NodeData::Class(shape) = &root.children[0].data else {
            panic!("expected trait");
        };
        assert!(shape.is_abstract);
        assert_eq!(shape.bases, vec!["Debug", "Clone"]);

        let methods: Vec<(bool, Option<Visibility>)> = root.children[0]
            .children
            .iter()
            .filter_map(|c| match &c.data {
                NodeData::Function(f) => Some((f.is_abstract, f.declared_visibility)),
                _ => None,
            })
            .collect();
        assert_eq!(
            methods,
            vec![
                (true, Some(Visibility::Public)),
                (false, Some(Visibility::Public))
            ]
        );

        let NodeData::Class(imp) = &root.children[1].data else {
            panic!("expected impl");
        };
        assert_eq!(imp.name, "Circle");
        assert_eq!(imp.bases, vec!["Shape"]);
    }

    #[test]
    fn test_use_trees() {
        let source = r#"
use std::collections::HashMap;
use std::io::{self, Read as ReadExt, Write};
use crate::types::*;
use serde;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
extern crate alloc as core_alloc;
"#;
        let specs = import_specs(&parse(source).root);
        let summary: Vec<(String, Option<String>, Option<String>, bool)> = specs
            .iter()
            .map(|s| (s.module.clone(), s.name.clone(), s.alias.clone(), s.is_wildcard))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("std::collections".into(), Some("HashMap".into()), None, false),
                ("std".into(), Some("io".into()), None, false),
                ("std::io".into(), Some("Read".into()), Some("ReadExt".into()), false),
                ("std::io".into(), Some("Write".into()), None, false),
                ("crate::types".into(), Some("*".into()), None, true),
                ("serde".into(), None, None, false),
                ("std::os::unix::fs".into(), Some("PermissionsExt".into()), None, false),
                ("alloc".into(), None, Some("core_alloc".into()), false),
            ]
        );
        assert_eq!(specs[6].guard, Some(GuardKind::Platform));
        assert_eq!(specs[0].local_name(), "HashMap");
        assert_eq!(specs[5].local_name(), "serde");
    }

    #[test]
    fn test_visibility_modifiers() {
        let source = "pub(crate) fn a() {}\npub(super) const B: u8 = 1;\nfn c() {}\n";
        let root = parse(source).root;
        let visibilities: Vec<Option<Visibility>> = root
            .children
            .iter()
            .map(|c| match &c.data {
                NodeData::Function(f) => f.declared_visibility,
                NodeData::Assignment(a) => a.declared_visibility,
                _ => None,
            })
            .collect();
        assert_eq!(
            visibilities,
            vec![
                Some(Visibility::Protected),
                Some(Visibility::Protected),
                Some(Visibility::Private)
            ]
        );
    }

    #[test]
    fn test_module_doc_and_inline_mod() {
        let source = "//! Crate docs.\n//! More.\n\nmod inner {\n    pub fn f() {}\n}\n";
        let root = parse(source).root;
        assert_eq!(root.docstring(), Some("Crate docs.\nMore."));
        let block = root
            .children
            .iter()
            .find(|c| c.kind == NodeKind::Block)
            .map(|b| &b.children[0]);
        assert_eq!(block.and_then(|f| f.name()), Some("f"));
    }

    #[test]
    fn test_attributes_become_decorators() {
        let source = "#[derive(Debug)]\n#[serde(rename_all = \"snake_case\")]\nenum Kind { A, B = 2 }\n";
        let root = parse(source).root;
        let NodeData::Class(header) = &root.children[0].data else {
            panic!("expected enum");
        };
        assert_eq!(
            header.decorators,
            vec!["derive(Debug)", "serde(rename_all = \"snake_case\")"]
        );
        assert_eq!(root.children[0].children.len(), 2);
    }
}
