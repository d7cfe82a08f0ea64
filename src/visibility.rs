//! Visibility resolution.
//!
//! Declared visibility (Rust `pub`, TypeScript modifiers, `export`) is
//! recorded by the parser. Everything left undeclared falls back to the
//! underscore naming convention.

use crate::types::{Symbol, Visibility};

/// Fill in visibility for every symbol below `root`. Declared values are
/// kept. The root module is left without a visibility.
pub fn resolve(root: &mut Symbol) {
    let mut stack: Vec<&mut Symbol> = root.children.iter_mut().collect();
    while let Some(symbol) = stack.pop() {
        if symbol.visibility.is_none() {
            symbol.visibility = Some(from_name(&symbol.name));
        }
        stack.extend(symbol.children.iter_mut());
    }
}

/// Convention-based visibility:
/// - `__dunder__` is public
/// - `__mangled` is private
/// - `_internal` is protected
/// - anything else is public
pub fn from_name(name: &str) -> Visibility {
    if is_dunder(name) {
        Visibility::Public
    } else if name.starts_with("__") {
        Visibility::Private
    } else if name.starts_with('_') {
        Visibility::Protected
    } else {
        Visibility::Public
    }
}

fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Span, SymbolKind};

    #[test]
    fn test_from_name() {
        assert_eq!(from_name("__init__"), Visibility::Public);
        assert_eq!(from_name("__secret"), Visibility::Private);
        assert_eq!(from_name("_helper"), Visibility::Protected);
        assert_eq!(from_name("run"), Visibility::Public);
        // Too short to be a dunder
        assert_eq!(from_name("____"), Visibility::Private);
        assert_eq!(from_name("_"), Visibility::Protected);
    }

    #[test]
    fn test_resolve_keeps_declared() {
        let span = Span::default();
        let mut root = Symbol::new(SymbolKind::Module, "", span);
        let mut class = Symbol::new(SymbolKind::Class, "Widget", span);
        let mut declared = Symbol::new(SymbolKind::Method, "render", span);
        declared.visibility = Some(Visibility::Private);
        class.children.push(declared);
        class
            .children
            .push(Symbol::new(SymbolKind::Method, "_layout", span));
        root.children.push(class);

        resolve(&mut root);

        assert_eq!(root.visibility, None);
        let class = &root.children[0];
        assert_eq!(class.visibility, Some(Visibility::Public));
        assert_eq!(class.children[0].visibility, Some(Visibility::Private));
        assert_eq!(class.children[1].visibility, Some(Visibility::Protected));
    }
}
