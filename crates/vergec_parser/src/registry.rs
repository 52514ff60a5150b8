//! Global-for-a-translation-unit struct and alias registries.
//!
//! Grounded on `original_source/floral/src/Type.hpp`'s static
//! `Type::structs`/`Type::typealiases` maps, but owned by the parser
//! instance instead of process-global state, per spec.md §9's "Global
//! mutable state" design note.

use std::collections::HashMap;

use crate::types::Type;

/// A struct declaration's shape, as needed for parser lookahead and later
/// layout computation: just its member list, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct StructInfo {
    /// `(member name, member type)` pairs, in declaration order.
    pub members: Vec<(String, Type)>,
}

/// Tracks every struct and type alias declared so far in a translation
/// unit, so the parser can disambiguate `NAME(...)` between a call and a
/// struct construction by lookahead (spec.md §4.3).
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    structs: HashMap<String, StructInfo>,
    aliases: HashMap<String, Type>,
}

impl TypeRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a struct declaration's member list.
    pub fn declare_struct(&mut self, name: impl Into<String>, members: Vec<(String, Type)>) {
        self.structs.insert(name.into(), StructInfo { members });
    }

    /// Registers a type alias.
    pub fn declare_alias(&mut self, name: impl Into<String>, aliased: Type) {
        self.aliases.insert(name.into(), aliased);
    }

    /// True if `name` directly names a declared struct, or is an alias
    /// that (possibly transitively) resolves to one.
    #[must_use]
    pub fn names_struct(&self, name: &str) -> bool {
        if self.structs.contains_key(name) {
            return true;
        }
        match self.aliases.get(name) {
            Some(ty) => matches!(ty.resolved().shape, crate::types::TypeShape::Struct(_)),
            None => false,
        }
    }

    /// Looks up a struct's member list by name.
    #[must_use]
    pub fn struct_info(&self, name: &str) -> Option<&StructInfo> {
        self.structs.get(name)
    }

    /// Looks up an alias's aliased type.
    #[must_use]
    pub fn alias(&self, name: &str) -> Option<&Type> {
        self.aliases.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeShape;

    #[test]
    fn declared_struct_is_recognized() {
        let mut reg = TypeRegistry::new();
        reg.declare_struct("Point", vec![("x".into(), Type::new(TypeShape::Bool))]);
        assert!(reg.names_struct("Point"));
        assert!(!reg.names_struct("Other"));
    }

    #[test]
    fn alias_to_struct_is_recognized_transitively() {
        let mut reg = TypeRegistry::new();
        reg.declare_struct("Point", Vec::new());
        reg.declare_alias("PointAlias", Type::new(TypeShape::Struct("Point".into())));
        assert!(reg.names_struct("PointAlias"));
    }

    #[test]
    fn alias_to_non_struct_is_not_a_struct_name() {
        let mut reg = TypeRegistry::new();
        reg.declare_alias("MyInt", Type::new(TypeShape::Bool));
        assert!(!reg.names_struct("MyInt"));
    }
}
