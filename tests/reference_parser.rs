//! Differential check against tree-sitter-python.
//!
//! The reference grammar independently derives every class and function
//! with its nesting depth. Definitions inside control blocks count toward
//! the nearest enclosing definition, the same rule the distiller applies.
//! For valid input the two projections must match exactly.

use code_distiller::schema::{ProjectedKind, ProjectedSymbol, project, top_level_projection};
use code_distiller::{Dialect, DistillOptions, distill_source};
use pretty_assertions::assert_eq;
use std::path::Path;
use tree_sitter::{Node, Parser};

fn reference_projection(source: &str) -> Vec<ProjectedSymbol> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .expect("python grammar should load");
    let tree = parser.parse(source, None).expect("parse should succeed");
    assert!(!tree.root_node().has_error(), "fixture must be valid Python");

    let mut out = Vec::new();
    let mut stack: Vec<(Node, usize)> = vec![(tree.root_node(), 0)];
    while let Some((node, depth)) = stack.pop() {
        let kind = match node.kind() {
            "class_definition" => Some(ProjectedKind::Class),
            "function_definition" => Some(ProjectedKind::Function),
            _ => None,
        };
        let child_depth = match kind {
            Some(kind) => {
                let name = node
                    .child_by_field_name("name")
                    .and_then(|n| n.utf8_text(source.as_bytes()).ok())
                    .unwrap_or_default()
                    .to_string();
                out.push(ProjectedSymbol { name, kind, depth });
                depth + 1
            }
            None => depth,
        };
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev().map(|c| (c, child_depth)));
    }
    out
}

fn distilled_projection(source: &str) -> (Vec<ProjectedSymbol>, Vec<ProjectedSymbol>) {
    let result = distill_source(source, Dialect::Python, &DistillOptions::default());
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    (project(&result.root), top_level_projection(&result.root))
}

fn assert_matches_reference(source: &str) {
    let mut expected = reference_projection(source);
    let (mut actual, top_level) = distilled_projection(source);

    let mut expected_top: Vec<ProjectedSymbol> =
        expected.iter().filter(|p| p.depth == 0).cloned().collect();
    let mut actual_top = top_level;
    expected_top.sort();
    actual_top.sort();
    assert_eq!(actual_top, expected_top);

    expected.sort();
    actual.sort();
    assert_eq!(actual, expected);
}

#[test]
fn test_fixtures_match_reference() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/python");
    let mut checked = 0;
    for entry in walkdir::WalkDir::new(&dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "py"))
    {
        let source = std::fs::read_to_string(entry.path()).expect("readable fixture");
        assert_matches_reference(&source);
        checked += 1;
    }
    assert!(checked >= 3);
}

#[test]
fn test_decorated_and_nested_definitions() {
    assert_matches_reference(
        r#"
import functools

def outer():
    @functools.wraps(outer)
    def wrapper(*args, **kwargs):
        class Local:
            def method(self):
                return lambda x: x
        return Local
    return wrapper

class Config:
    @property
    def name(self):
        return "config"

    @name.setter
    def name(self, value):
        pass

    class Meta:
        ordering = ["name"]
"#,
    );
}

#[test]
fn test_definitions_in_control_blocks() {
    assert_matches_reference(
        r#"
try:
    from ujson import loads
except ImportError:
    def loads(text):
        return text

with open("f") as handle:
    def reader():
        return handle

for i in range(3):
    class Repeated:
        pass

if True:
    pass
elif False:
    def never():
        pass
else:
    async def other():
        pass
"#,
    );
}

#[test]
fn test_multiline_signatures() {
    assert_matches_reference(
        r#"
def configure(
    name: str,
    *,
    retries: int = 3,
    callback=lambda: None,
) -> dict[
    str, int
]:
    def inner(
        a,
        b,
    ):
        return a
    return {}

class Generic[T](
    Base,
    metaclass=Meta,
):
    x: T
"#,
    );
}
