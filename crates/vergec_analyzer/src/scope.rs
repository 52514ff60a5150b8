//! The lexical scope stack used during name resolution.
//!
//! Grounded on `original_source/floral/src/Scope.hpp`'s `Scope` class (a
//! flat vector of name/type pairs with a back-pointer to the enclosing
//! function), generalized into a stack of scopes per spec.md §4.4.

use std::collections::HashMap;

use vergec_parser::Type;

/// One binding's recorded shape: its type, and whether it is mutable
/// (`var`) or not (`let`/parameter) — stored alongside the type's own
/// `const` flag because parameters bound by value are mutable local slots
/// even when their static type is `const`.
#[derive(Debug, Clone)]
pub struct Binding {
    /// The binding's resolved type.
    pub ty: Type,
}

/// A single lexical scope: function body, block, or a `for` loop's init
/// clause.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    bindings: HashMap<String, Binding>,
    /// The return type of the nearest enclosing function, used to check
    /// `return` statements without threading it through every recursive
    /// call.
    pub function_return_type: Option<Type>,
}

/// A stack of scopes, innermost last. Lookup walks from the top down to
/// the file-global scope at index 0.
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
}

impl ScopeStack {
    /// Creates a stack with just the file-global scope.
    #[must_use]
    pub fn new() -> Self {
        Self { scopes: vec![Scope::default()] }
    }

    /// Pushes a new scope, inheriting the enclosing function's return type
    /// unless `function_return_type` overrides it.
    pub fn push(&mut self, function_return_type: Option<Type>) {
        let inherited = function_return_type.or_else(|| self.current_function_return_type());
        self.scopes.push(Scope { bindings: HashMap::new(), function_return_type: inherited });
    }

    /// Pops the innermost scope. Panics if called with only the
    /// file-global scope remaining, since that would indicate a caller
    /// bug (every `push` must be matched by a `pop`).
    pub fn pop(&mut self) {
        assert!(self.scopes.len() > 1, "cannot pop the file-global scope");
        self.scopes.pop();
    }

    /// Declares `name` in the innermost scope. Returns `false` (and
    /// leaves the scope unchanged) if `name` is already declared in this
    /// exact scope — the analyzer turns that into an
    /// `InvalidRedeclaration` diagnostic.
    pub fn declare(&mut self, name: impl Into<String>, ty: Type) -> bool {
        let scope = self.scopes.last_mut().expect("scope stack is never empty");
        let name = name.into();
        if scope.bindings.contains_key(&name) {
            false
        } else {
            scope.bindings.insert(name, Binding { ty });
            true
        }
    }

    /// Looks up `name` from innermost to outermost scope.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Type> {
        self.scopes.iter().rev().find_map(|s| s.bindings.get(name)).map(|b| &b.ty)
    }

    /// The nearest enclosing function's declared return type.
    #[must_use]
    pub fn current_function_return_type(&self) -> Option<Type> {
        self.scopes.iter().rev().find_map(|s| s.function_return_type.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vergec_parser::TypeShape;

    #[test]
    fn lookup_finds_innermost_binding_first() {
        let mut stack = ScopeStack::new();
        stack.declare("x", Type::new(TypeShape::Bool));
        stack.push(None);
        stack.declare("x", Type::new(TypeShape::Void));
        assert!(stack.lookup("x").unwrap().is_void());
        stack.pop();
        assert!(stack.lookup("x").unwrap().is_bool());
    }

    #[test]
    fn redeclaration_in_same_scope_is_rejected() {
        let mut stack = ScopeStack::new();
        assert!(stack.declare("x", Type::new(TypeShape::Bool)));
        assert!(!stack.declare("x", Type::new(TypeShape::Void)));
    }

    #[test]
    fn function_return_type_is_inherited_by_nested_blocks() {
        let mut stack = ScopeStack::new();
        stack.push(Some(Type::new(TypeShape::Bool)));
        stack.push(None);
        assert!(stack.current_function_return_type().unwrap().is_bool());
    }
}
