//! Property-based tests for the distiller.
//!
//! Uses proptest to generate random inputs and verify invariants hold.

use code_distiller::lexer::{TokenKind, tokenize};
use code_distiller::*;
use proptest::prelude::*;

// ============================================================================
// Strategies for generating test data
// ============================================================================

/// Identifiers that are never Python keywords.
fn identifier() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,12}".prop_map(|s| format!("n_{s}"))
}

/// Text biased toward Python's structural characters.
fn python_noise() -> impl Strategy<Value = String> {
    "[a-z_ :()\\[\\]{}\n\t'\"#@=.,\\\\]{0,300}"
}

/// A top-level definition that parses cleanly.
fn well_formed() -> impl Strategy<Value = String> {
    prop_oneof![
        identifier().prop_map(|n| format!("def {n}():\n    return 1\n")),
        identifier().prop_map(|n| format!("class C{n}:\n    def method(self):\n        pass\n")),
        identifier().prop_map(|n| format!("async def {n}(a, *, b=2):\n    await a\n")),
    ]
}

/// A top-level definition with exactly one syntax error.
fn malformed() -> impl Strategy<Value = String> {
    prop_oneof![
        identifier().prop_map(|n| format!("class Broken{n}\n    pass\n")),
        identifier().prop_map(|n| format!("def broken_{n}()\n    return 1\n")),
    ]
}

/// A sequence of (is_well_formed, source) items.
fn mixed_file() -> impl Strategy<Value = Vec<(bool, String)>> {
    prop::collection::vec(
        prop_oneof![
            well_formed().prop_map(|s| (true, s)),
            malformed().prop_map(|s| (false, s)),
        ],
        0..12,
    )
}

/// A statement that only reads names it binds itself.
fn self_contained_statement() -> impl Strategy<Value = String> {
    (identifier(), identifier()).prop_flat_map(|(a, b)| {
        prop_oneof![
            Just(format!("{a}, {b} = 1, 2\nprint({a}, {b})\n")),
            Just(format!("for {a}, {b} in [(1, 2)]:\n    print({a} + {b})\n")),
            Just(format!("for {a}, {b} in []: print({a}, {b})\n")),
            Just(format!("if ({a} := 3) > 1:\n    print({a})\n")),
            Just(format!("{a} = 1\nprint(f\"{{{a}!r}}\")\n")),
            Just(format!("{a} = [{b} * 2 for {b} in range(3)]\n")),
            Just(format!("def {a}({b}):\n    return {b}\n")),
        ]
    })
}

fn check_tree_invariants(result: &Distillation) {
    assert!(result.root.qualified_path.is_empty());
    assert!(result.root.visibility.is_none());
    let mut stack: Vec<(&Symbol, usize)> = result.root.children.iter().map(|s| (s, 0)).collect();
    while let Some((symbol, depth)) = stack.pop() {
        assert_eq!(symbol.qualified_path.len(), depth);
        assert!(symbol.visibility.is_some());
        stack.extend(symbol.children.iter().map(|c| (c, depth + 1)));
    }
}

// ============================================================================
// Property tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Lexing never fails, always ends in Eof, and balances indentation.
    #[test]
    fn lexer_is_total(source in prop_oneof![python_noise(), "\\PC{0,200}"]) {
        let (tokens, _) = tokenize(&source, Dialect::Python);
        prop_assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
        let indents = tokens.iter().filter(|t| t.kind == TokenKind::Indent).count();
        let dedents = tokens.iter().filter(|t| t.kind == TokenKind::Dedent).count();
        prop_assert_eq!(indents, dedents);
    }

    /// Any input, any dialect: no panic and the tree invariants hold.
    #[test]
    fn pipeline_is_total(
        source in prop_oneof![python_noise(), "\\PC{0,200}"],
        dialect in prop::sample::select(Dialect::ALL.to_vec()),
    ) {
        let result = distill_source(&source, dialect, &DistillOptions::default());
        check_tree_invariants(&result);
        for binding in &result.imports {
            prop_assert_eq!(binding.is_conditional, binding.guard.is_some());
        }
    }

    /// Each malformed definition costs one diagnostic and no symbols; the
    /// well-formed ones all survive.
    #[test]
    fn recovery_keeps_well_formed_definitions(items in mixed_file()) {
        let source: String = items.iter().map(|(_, s)| s.as_str()).collect();
        let good = items.iter().filter(|(ok, _)| *ok).count();
        let bad = items.len() - good;

        let result = distill_source(&source, Dialect::Python, &DistillOptions::default());
        prop_assert_eq!(result.root.children.len(), good);
        prop_assert_eq!(result.diagnostics.len(), bad);
        prop_assert!(result.diagnostics.iter().all(|d| d.recovered));
        prop_assert!(result
            .root
            .children
            .iter()
            .all(|s| !s.name.starts_with("Broken") && !s.name.starts_with("broken_")));
    }

    /// Distilling the same text twice gives identical output.
    #[test]
    fn distill_is_idempotent(items in mixed_file()) {
        let source: String = items.iter().map(|(_, s)| s.as_str()).collect();
        let options = DistillOptions::default();
        let first = distill_source(&source, Dialect::Python, &options);
        let second = distill_source(&source, Dialect::Python, &options);
        prop_assert_eq!(first.to_json().ok(), second.to_json().ok());
    }

    /// An import is used exactly when its name is referenced.
    #[test]
    fn import_usage_follows_references(name in identifier(), referenced in any::<bool>()) {
        let body = if referenced {
            format!("    return {name}.value\n")
        } else {
            "    return None\n".to_string()
        };
        let source = format!("import {name}\n\ndef f():\n{body}");
        let result = distill_source(&source, Dialect::Python, &DistillOptions::default());
        prop_assert_eq!(result.imports.len(), 1);
        prop_assert_eq!(result.imports[0].is_used, referenced);
    }

    /// A wildcard is unused when every read resolves to a local binding.
    #[test]
    fn wildcard_unused_when_all_names_are_local(
        statements in prop::collection::vec(self_contained_statement(), 1..8),
    ) {
        let source = format!("from helpers import *\n{}", statements.concat());
        let result = distill_source(&source, Dialect::Python, &DistillOptions::default());
        prop_assert_eq!(result.imports.len(), 1);
        prop_assert!(!result.imports[0].is_used, "{}", source);
    }

    /// The naming convention decides visibility for undeclared Python names.
    #[test]
    fn visibility_follows_naming(base in identifier(), prefix in 0usize..3, dunder in any::<bool>()) {
        let name = if dunder {
            format!("__{base}__")
        } else {
            format!("{}{base}", "_".repeat(prefix))
        };
        let source = format!("def {name}():\n    pass\n");
        let result = distill_source(&source, Dialect::Python, &DistillOptions::default());
        let expected = match (dunder, prefix) {
            (true, _) | (false, 0) => Visibility::Public,
            (false, 1) => Visibility::Protected,
            _ => Visibility::Private,
        };
        prop_assert_eq!(result.root.children[0].visibility, Some(expected));
    }
}
